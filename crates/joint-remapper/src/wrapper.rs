//! The wrapper facade.
//!
//! [`JointRemapper`] owns the registry, both batch engines, the dispatcher,
//! the aggregation cycle and the periodic runner. The registry can only be
//! changed while the runner is stopped.

use crate::aggregation::{AggregationCycle, CycleOutcome, StatePublisher, StateSnapshot};
use crate::batch::BatchEngine;
use crate::board::BoardView;
use crate::bridge::JointStateBridge;
use crate::capabilities::{CapabilitySet, RemoteCalibrator};
use crate::config::WrapperConfig;
use crate::error::WrapperError;
use crate::metrics::MetricsHub;
use crate::protocol::{Dispatcher, Response, Value};
use crate::registry::{SubDeviceLayout, SubDeviceRegistry};
use crate::scheduler::PeriodicRunner;
use crate::streaming::{StreamingCommand, StreamingIngestor};
use crate::types::Stamp;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;
use tracing::{debug, info};

struct Shared {
    registry: RwLock<SubDeviceRegistry>,
    rpc_batch: BatchEngine,
    stream: StreamingIngestor,
    calibrator: RwLock<Option<Arc<dyn RemoteCalibrator>>>,
    dispatcher: Dispatcher,
    cycle: Mutex<AggregationCycle>,
    metrics: MetricsHub,
    backlog: AtomicUsize,
}

impl Shared {
    fn registry(&self) -> RwLockReadGuard<'_, SubDeviceRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn cycle(&self) -> MutexGuard<'_, AggregationCycle> {
        self.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn calibrator(&self) -> Option<Arc<dyn RemoteCalibrator>> {
        self.calibrator
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn tick(&self) -> CycleOutcome {
        let registry = self.registry();
        let view = BoardView::new(&registry, &self.rpc_batch, None);
        let outcome = self
            .cycle()
            .run(&view, self.backlog.load(Ordering::Relaxed));
        match outcome {
            CycleOutcome::Published(_) => self.metrics.wrapper.cycles.inc(),
            CycleOutcome::Skipped => self.metrics.wrapper.cycles_skipped.inc(),
        }
        outcome
    }
}

pub struct JointRemapper {
    name: String,
    period: Duration,
    shared: Arc<Shared>,
    runner: Mutex<Option<PeriodicRunner>>,
}

impl JointRemapper {
    /// Build an instance with its registry configured from `config`. No
    /// subdevice is attached yet.
    pub fn new(config: &WrapperConfig) -> Result<Self, WrapperError> {
        let registry = SubDeviceRegistry::configure(config.joints, config.to_layout()?)?;
        let shared = Shared {
            rpc_batch: BatchEngine::for_registry(&registry),
            stream: StreamingIngestor::new(&registry),
            cycle: Mutex::new(AggregationCycle::new(
                registry.joints(),
                config.extended_output,
                config.backlog_warning,
            )),
            registry: RwLock::new(registry),
            calibrator: RwLock::new(None),
            dispatcher: Dispatcher::new(),
            metrics: MetricsHub::new()?,
            backlog: AtomicUsize::new(0),
        };
        info!(
            name = %config.name,
            joints = config.joints,
            period_ms = config.period_ms,
            "wrapper configured"
        );
        Ok(Self {
            name: config.name.clone(),
            period: config.period(),
            shared: Arc::new(shared),
            runner: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joints(&self) -> usize {
        self.shared.registry().joints()
    }

    pub fn metrics(&self) -> &MetricsHub {
        &self.shared.metrics
    }

    pub fn is_running(&self) -> bool {
        self.runner().is_some()
    }

    fn runner(&self) -> MutexGuard<'_, Option<PeriodicRunner>> {
        self.runner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_stopped(&self) -> Result<(), WrapperError> {
        if self.is_running() {
            return Err(WrapperError::Running);
        }
        Ok(())
    }

    /// Replace the layout. Every subdevice is detached afterwards.
    pub fn configure(&self, joints: usize, layout: SubDeviceLayout) -> Result<(), WrapperError> {
        self.ensure_stopped()?;
        let registry = SubDeviceRegistry::configure(joints, layout)?;
        self.shared.rpc_batch.resize(&registry);
        self.shared.stream.resize(&registry);
        self.shared.cycle().resize(joints);
        *self
            .shared
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner) = registry;
        Ok(())
    }

    pub fn attach(&self, key: &str, caps: CapabilitySet) -> Result<(), WrapperError> {
        self.ensure_stopped()?;
        self.shared
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .attach(key, caps)?;
        Ok(())
    }

    pub fn detach(&self, key: &str) -> Result<(), WrapperError> {
        self.ensure_stopped()?;
        self.shared
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .detach(key)?;
        Ok(())
    }

    pub fn set_calibrator(&self, calibrator: Option<Arc<dyn RemoteCalibrator>>) {
        debug!(bound = calibrator.is_some(), "remote calibrator changed");
        *self
            .shared
            .calibrator
            .write()
            .unwrap_or_else(PoisonError::into_inner) = calibrator;
    }

    pub fn set_publisher(&self, publisher: Arc<dyn StatePublisher>) {
        self.shared.cycle().set_publisher(publisher);
    }

    pub fn set_bridge(&self, bridge: Box<dyn JointStateBridge>) {
        self.shared.cycle().set_bridge(bridge);
    }

    pub fn handle_request(&self, request: &[Value]) -> Response {
        let calibrator = self.shared.calibrator();
        let registry = self.shared.registry();
        let view = BoardView::new(&registry, &self.shared.rpc_batch, calibrator.as_deref());
        let response = self.shared.dispatcher.handle(&view, request);
        self.shared.metrics.wrapper.rpc_requests.inc();
        if !response.is_ok() {
            self.shared.metrics.wrapper.rpc_failures.inc();
        }
        response
    }

    /// Apply one streaming command. Returns whether it was applied; nothing
    /// is ever sent back to the sender.
    pub fn handle_streaming_message(&self, command: &StreamingCommand) -> bool {
        let registry = self.shared.registry();
        let applied = self.shared.stream.ingest(&registry, command);
        self.shared.metrics.wrapper.stream_messages.inc();
        if !applied {
            self.shared.metrics.wrapper.stream_drops.inc();
        }
        applied
    }

    /// Number of streaming messages queued by the transport.
    pub fn report_stream_backlog(&self, pending: usize) {
        self.shared.backlog.store(pending, Ordering::Relaxed);
        self.shared
            .metrics
            .wrapper
            .stream_backlog
            .set(i64::try_from(pending).unwrap_or(i64::MAX));
    }

    /// Run one aggregation cycle on the caller's thread.
    pub fn tick(&self) -> CycleOutcome {
        self.shared.tick()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.shared.cycle().snapshot().clone()
    }

    pub fn last_rpc_stamp(&self) -> Stamp {
        self.shared.dispatcher.last_stamp()
    }

    pub fn start(&self) -> Result<(), WrapperError> {
        let mut runner = self.runner();
        if runner.is_some() {
            return Err(WrapperError::Running);
        }
        let shared = self.shared.clone();
        *runner = Some(PeriodicRunner::spawn(
            &format!("{}-cycle", self.name),
            self.period,
            move || {
                shared.tick();
            },
        )?);
        info!(name = %self.name, period = ?self.period, "periodic task started");
        Ok(())
    }

    pub fn stop(&self) -> Result<(), WrapperError> {
        let mut runner = self.runner().take().ok_or(WrapperError::NotRunning)?;
        runner.stop();
        info!(name = %self.name, "periodic task stopped");
        Ok(())
    }
}

impl Drop for JointRemapper {
    fn drop(&mut self) {
        if let Some(mut runner) = self.runner().take() {
            runner.stop();
        }
    }
}
