//! Runs a joint remapper over JSON lines on stdin/stdout.
//!
//! Each input line is one message:
//!   {"rpc": [{"tag": "get"}, {"tag": "axes"}]}          -> one response line
//!   {"stream": {"action": "velocity", "selector": "all", "values": [..]}}
//!   {"metrics": null}                                   -> prometheus text

use anyhow::{Context, Result};
use clap::Parser;
use joint_remapper::{
    load_config_file, BridgeConfig, CapabilitySet, JointRemapper, JointStateBridge,
    JointStateRecord, MockCalibrator, MockController, RadianBridge, Response, Stamp,
    StatePublisher, StateSnapshot, StreamingCommand, SubDeviceLayout, Value, WrapperConfig,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

const QUEUE_DEPTH: usize = 256;

#[derive(Parser)]
#[command(name = "remapper-daemon")]
#[command(about = "Joint remapper over JSON lines on stdin/stdout")]
struct Args {
    /// YAML wrapper configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the aggregation period
    #[arg(long)]
    period_ms: Option<u64>,

    /// Attach in-memory mock controllers to every subdevice
    #[arg(long)]
    mock: bool,

    /// Print the core state line every cycle
    #[arg(long)]
    print_state: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum Message {
    Rpc(Vec<Value>),
    Stream(StreamingCommand),
    /// `{"metrics": null}` or `"metrics"`.
    Metrics,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Reply<'a> {
    Rpc(&'a Response),
    Error(String),
}

struct PrintState;

impl StatePublisher for PrintState {
    fn publish_state(&self, positions: &[f64], stamp: Stamp) {
        let line = serde_json::json!({ "state": { "position": positions, "stamp": stamp } });
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{line}");
    }

    fn publish_snapshot(&self, snapshot: &StateSnapshot) {
        trace!(sequence = snapshot.stamp.sequence, "extended snapshot");
    }
}

/// Bridge sink that only traces; stands in for the external topic.
struct TraceSink {
    topic: String,
}

impl JointStateBridge for TraceSink {
    fn publish(&mut self, record: &JointStateRecord) {
        trace!(topic = %self.topic, joints = record.names.len(), stamp = record.stamp, "joint state");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config_file(path)?,
        None => default_config(),
    };
    if let Some(period_ms) = args.period_ms {
        config.period_ms = period_ms;
    }

    let remapper = JointRemapper::new(&config).context("building remapper")?;
    if args.mock {
        attach_mocks(&remapper, &config)?;
    } else {
        warn!("no hardware backend selected; subdevices stay detached (use --mock)");
    }
    if args.print_state {
        remapper.set_publisher(Arc::new(PrintState));
    }
    if let Some(bridge) = config.bridge.clone() {
        install_bridge(&remapper, bridge);
    }
    remapper.start()?;
    info!(name = remapper.name(), joints = remapper.joints(), "remapper-daemon running");

    let (tx, mut rx) = mpsc::channel::<String>(QUEUE_DEPTH);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("stdin read failed: {e}");
                    break;
                }
            }
        }
    });

    let mut stdout = tokio::io::stdout();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received");
                break;
            }
            line = rx.recv() => {
                let Some(line) = line else {
                    debug!("stdin closed");
                    break;
                };
                remapper.report_stream_backlog(rx.len());
                if let Some(out) = handle_line(&remapper, &line) {
                    stdout.write_all(out.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                }
            }
        }
    }

    remapper.stop()?;
    info!("remapper-daemon stopped");
    Ok(())
}

fn handle_line(remapper: &JointRemapper, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let message: Message = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            warn!("bad input line: {e}");
            return encode(&Reply::Error(e.to_string()));
        }
    };
    match message {
        Message::Rpc(request) => encode(&Reply::Rpc(&remapper.handle_request(&request))),
        Message::Stream(command) => {
            remapper.handle_streaming_message(&command);
            None
        }
        Message::Metrics => Some(remapper.metrics().encode_text()),
    }
}

fn encode(reply: &Reply<'_>) -> Option<String> {
    match serde_json::to_string(reply) {
        Ok(line) => Some(line),
        Err(e) => {
            warn!("failed to encode reply: {e}");
            None
        }
    }
}

fn default_config() -> WrapperConfig {
    let mut config = WrapperConfig::new("mock-arm", 6);
    config.subdevices = Some(vec![
        joint_remapper::config::SubDeviceEntry {
            key: "shoulder".into(),
            wrapper: [0, 2],
            device: [0, 2],
        },
        joint_remapper::config::SubDeviceEntry {
            key: "wrist".into(),
            wrapper: [3, 5],
            device: [0, 2],
        },
    ]);
    config
}

fn attach_mocks(remapper: &JointRemapper, config: &WrapperConfig) -> Result<()> {
    let axes: Vec<(String, usize)> = match config.to_layout()? {
        SubDeviceLayout::Explicit(ranges) => ranges
            .into_iter()
            .map(|r| (r.key, r.device_top + 1))
            .collect(),
        SubDeviceLayout::FullSpan { key } => vec![(key, config.joints)],
    };
    for (key, count) in axes {
        let device = Arc::new(MockController::new(count));
        remapper
            .attach(&key, CapabilitySet::from_device(device))
            .with_context(|| format!("attaching mock subdevice {key}"))?;
    }
    remapper.set_calibrator(Some(Arc::new(MockCalibrator::new())));
    Ok(())
}

fn install_bridge(remapper: &JointRemapper, config: BridgeConfig) {
    info!(node = %config.node, topic = %config.topic, "joint state bridge enabled");
    let sink = TraceSink {
        topic: config.topic.clone(),
    };
    remapper.set_bridge(Box::new(RadianBridge::new(config, sink)));
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_message_forms() {
        assert!(matches!(
            serde_json::from_str::<Message>(r#"{"metrics": null}"#),
            Ok(Message::Metrics)
        ));
        assert!(matches!(
            serde_json::from_str::<Message>(r#""metrics""#),
            Ok(Message::Metrics)
        ));
    }

    #[test]
    fn test_metrics_line_returns_text() {
        let remapper = JointRemapper::new(&default_config()).unwrap();
        let out = handle_line(&remapper, r#"{"metrics": null}"#).unwrap();
        assert!(!out.starts_with('{'));
    }
}
