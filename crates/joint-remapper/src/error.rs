use crate::capabilities::Capability;
use crate::Tag;
use thiserror::Error;

pub type DeviceResult<T> = core::result::Result<T, DeviceError>;
pub type CallResult<T> = core::result::Result<T, CallError>;

/// Failure reported by a capability implementation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeviceError {
    #[error("device call failed: {0}")]
    Failed(String),
    #[error("axis {axis} out of range for device with {axes} axes")]
    BadAxis { axis: usize, axes: usize },
    #[error("operation not supported by this device: {0}")]
    Unsupported(&'static str),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing mandatory parameter: {0}")]
    MissingParameter(&'static str),
    #[error("subdevice {key}: {reason}")]
    InvalidRange { key: String, reason: String },
    #[error("subdevice {0} listed twice")]
    DuplicateKey(String),
    #[error("joint {joint} claimed by both {first} and {second}")]
    OverlappingRanges {
        joint: usize,
        first: String,
        second: String,
    },
    #[error("subdevices cover {covered} joints but the device controls {expected}")]
    JointCountMismatch { covered: usize, expected: usize },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AttachError {
    #[error("no subdevice configured under key {0}")]
    UnknownSubDevice(String),
    #[error("subdevice {0} is already attached")]
    AlreadyAttached(String),
    #[error("subdevice {key} lacks required capability {capability}")]
    MissingCapability { key: String, capability: Capability },
    #[error("subdevice {key}: {capability} reports {reported} axes, {required} required")]
    AxisCount {
        key: String,
        capability: Capability,
        reported: usize,
        required: usize,
    },
    #[error("subdevice {key}: {source}")]
    Device { key: String, source: DeviceError },
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("joint {joint} out of range [0, {joints})")]
pub struct JointOutOfRange {
    pub joint: i64,
    pub joints: usize,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("capability {0} not available")]
pub struct CapabilityUnavailable(pub Capability);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty request")]
    Empty,
    #[error("unknown opcode {0}")]
    UnknownOpcode(Tag),
    #[error("unknown action {action} for {scope}")]
    UnknownAction { scope: Tag, action: Tag },
    #[error("malformed request: expected {expected} at position {position}")]
    Shape {
        position: usize,
        expected: &'static str,
    },
}

impl ProtocolError {
    pub fn shape(position: usize, expected: &'static str) -> Self {
        ProtocolError::Shape { position, expected }
    }

    /// Whether the request named something this wrapper does not know, as
    /// opposed to a known command with a malformed argument list.
    pub fn is_unrecognized(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnknownOpcode(_) | ProtocolError::UnknownAction { .. }
        )
    }
}

/// Failure of one joint-level operation, from lookup to device call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CallError {
    #[error(transparent)]
    OutOfRange(#[from] JointOutOfRange),
    #[error(transparent)]
    Unavailable(#[from] CapabilityUnavailable),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("{len} joints requested, at most {max} allowed")]
    TooManyJoints { len: usize, max: usize },
    #[error("{joints} joints paired with {values} values")]
    LengthMismatch { joints: usize, values: usize },
    #[error("subdevice {0} is not attached")]
    NotAttached(String),
    #[error("no remote calibrator bound")]
    NoCalibrator,
}

#[derive(Debug, Error)]
pub enum WrapperError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Attach(#[from] AttachError),
    #[error("periodic task is running; stop it before changing the registry")]
    Running,
    #[error("periodic task is not running")]
    NotRunning,
    #[error("failed to spawn periodic thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("metrics init error: {0}")]
    Metrics(#[from] prometheus::Error),
}
