use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct WrapperMetrics {
    pub rpc_requests: IntCounter,
    pub rpc_failures: IntCounter,
    pub stream_messages: IntCounter,
    pub stream_drops: IntCounter,
    pub cycles: IntCounter,
    pub cycles_skipped: IntCounter,
    pub stream_backlog: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub wrapper: WrapperMetrics,
}

impl MetricsHub {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let wrapper = WrapperMetrics {
            rpc_requests: IntCounter::new("jr_rpc_requests", "RPC requests handled")?,
            rpc_failures: IntCounter::new("jr_rpc_failures", "RPC requests answered FAILED")?,
            stream_messages: IntCounter::new(
                "jr_stream_messages",
                "Streaming commands received",
            )?,
            stream_drops: IntCounter::new("jr_stream_drops", "Streaming commands dropped")?,
            cycles: IntCounter::new("jr_cycles", "Aggregation cycles published")?,
            cycles_skipped: IntCounter::new(
                "jr_cycles_skipped",
                "Aggregation cycles skipped with subdevices detached",
            )?,
            stream_backlog: IntGauge::new(
                "jr_stream_backlog",
                "Streaming commands waiting to be applied",
            )?,
        };
        registry.register(Box::new(wrapper.rpc_requests.clone()))?;
        registry.register(Box::new(wrapper.rpc_failures.clone()))?;
        registry.register(Box::new(wrapper.stream_messages.clone()))?;
        registry.register(Box::new(wrapper.stream_drops.clone()))?;
        registry.register(Box::new(wrapper.cycles.clone()))?;
        registry.register(Box::new(wrapper.cycles_skipped.clone()))?;
        registry.register(Box::new(wrapper.stream_backlog.clone()))?;
        Ok(Self { registry, wrapper })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
