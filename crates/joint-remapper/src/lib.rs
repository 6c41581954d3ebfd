//! joint-remapper: one logical joint space over several motor controllers
//!
//! Clients address joints `0..joints`; the wrapper maps every joint onto the
//! subdevice that owns it, splits multi-joint calls into per-subdevice
//! batches, answers the request/response control protocol, applies the
//! streaming command channel and publishes a state snapshot every period.
//! The default build enables a `mock` controller so the daemon and the tests
//! run without hardware.

mod tag;
pub use tag::Tag;

pub mod types;
pub use types::{ControlMode, InteractionMode, Stamp};

pub mod error;
pub use error::{
    AttachError, CallError, CapabilityUnavailable, ConfigError, DeviceError, JointOutOfRange,
    ProtocolError, WrapperError,
};

pub mod capabilities;
pub use capabilities::{Capability, CapabilitySet};

pub mod registry;
pub use registry::{RangeSpec, SubDeviceLayout, SubDeviceRegistry};

pub mod batch;
pub use batch::BatchEngine;

pub mod board;
pub use board::{BoardView, JointSelector};

pub mod protocol;
pub use protocol::{Dispatcher, Response, Status, Value};

pub mod streaming;
pub use streaming::{StreamAction, StreamingCommand, StreamingIngestor};

pub mod aggregation;
pub use aggregation::{AggregationCycle, CycleOutcome, LatestState, StatePublisher, StateSnapshot};

pub mod bridge;
pub use bridge::{BridgeConfig, JointStateBridge, JointStateRecord, RadianBridge};

mod scheduler;
pub use scheduler::PeriodicRunner;

pub mod config;
pub use config::{load_config_file, WrapperConfig};

mod metrics;
pub use metrics::{MetricsHub, WrapperMetrics};

mod wrapper;
pub use wrapper::JointRemapper;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockCalibrator, MockController};
