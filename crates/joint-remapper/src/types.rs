use crate::Tag;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Sequence number plus time in seconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Stamp {
    pub sequence: u64,
    pub time: f64,
}

impl Stamp {
    pub fn new(sequence: u64, time: f64) -> Self {
        Self { sequence, time }
    }

    /// Bump the sequence and record `time`.
    pub fn advance(&mut self, time: f64) -> Stamp {
        self.sequence = self.sequence.wrapping_add(1);
        self.time = time;
        *self
    }
}

/// Wall-clock seconds since the UNIX epoch.
pub fn now_seconds() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
}

/// Control mode of a joint. Carried as an opaque tag, never remapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlMode(pub Tag);

impl ControlMode {
    pub const IDLE: ControlMode = ControlMode(Tag::new("idl"));
    pub const FORCE_IDLE: ControlMode = ControlMode(Tag::new("fidl"));
    pub const POSITION: ControlMode = ControlMode(Tag::new("pos"));
    pub const POSITION_DIRECT: ControlMode = ControlMode(Tag::new("posd"));
    pub const VELOCITY: ControlMode = ControlMode(Tag::new("vel"));
    pub const MIXED: ControlMode = ControlMode(Tag::new("mixd"));
    pub const TORQUE: ControlMode = ControlMode(Tag::new("torq"));
    pub const PWM: ControlMode = ControlMode(Tag::new("pwm"));
    pub const CURRENT: ControlMode = ControlMode(Tag::new("curr"));
    pub const HW_FAULT: ControlMode = ControlMode(Tag::new("hwf"));
    pub const CALIBRATING: ControlMode = ControlMode(Tag::new("calb"));
    pub const NOT_CONFIGURED: ControlMode = ControlMode(Tag::new("cfgn"));
    pub const UNKNOWN: ControlMode = ControlMode(Tag::new("unkw"));
}

/// Interaction mode of a joint. Opaque like [`ControlMode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionMode(pub Tag);

impl InteractionMode {
    pub const STIFF: InteractionMode = InteractionMode(Tag::new("stif"));
    pub const COMPLIANT: InteractionMode = InteractionMode(Tag::new("comp"));
    pub const UNKNOWN: InteractionMode = InteractionMode(Tag::new("unkn"));
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointType {
    Revolute,
    Prismatic,
    Unknown,
}

impl JointType {
    pub fn tag(self) -> Tag {
        match self {
            JointType::Revolute => Tag::new("atrv"),
            JointType::Prismatic => Tag::new("atpr"),
            JointType::Unknown => Tag::new("unkn"),
        }
    }
}

/// Which control loop a PID request addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PidKind {
    Position,
    Velocity,
    Torque,
    Current,
}

impl PidKind {
    pub const ALL: [PidKind; 4] = [
        PidKind::Position,
        PidKind::Velocity,
        PidKind::Torque,
        PidKind::Current,
    ];

    pub fn tag(self) -> Tag {
        match self {
            PidKind::Position => Tag::new("pidp"),
            PidKind::Velocity => Tag::new("pidv"),
            PidKind::Torque => Tag::new("pidt"),
            PidKind::Current => Tag::new("pidc"),
        }
    }

    pub fn from_tag(tag: Tag) -> Option<Self> {
        PidKind::ALL.into_iter().find(|k| k.tag() == tag)
    }
}

/// Fixed ten-field PID parameter record.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Pid {
    pub kp: f64,
    pub kd: f64,
    pub ki: f64,
    pub max_int: f64,
    pub scale: f64,
    pub max_output: f64,
    pub offset: f64,
    pub stiction_up: f64,
    pub stiction_down: f64,
    pub kff: f64,
}

impl Pid {
    pub const FIELDS: usize = 10;

    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.len() != Self::FIELDS {
            return None;
        }
        Some(Self {
            kp: values[0],
            kd: values[1],
            ki: values[2],
            max_int: values[3],
            scale: values[4],
            max_output: values[5],
            offset: values[6],
            stiction_up: values[7],
            stiction_down: values[8],
            kff: values[9],
        })
    }

    pub fn to_values(&self) -> [f64; Self::FIELDS] {
        [
            self.kp,
            self.kd,
            self.ki,
            self.max_int,
            self.scale,
            self.max_output,
            self.offset,
            self.stiction_up,
            self.stiction_down,
            self.kff,
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct MotorTorqueParams {
    pub bemf: f64,
    pub bemf_scale: f64,
    pub ktau: f64,
    pub ktau_scale: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationParameters {
    pub kind: i64,
    pub params: [f64; 5],
    pub param_zero: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct ImpedanceParams {
    pub stiffness: f64,
    pub damping: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct ImpedanceRange {
    pub min_stiffness: f64,
    pub max_stiffness: f64,
    pub min_damping: f64,
    pub max_damping: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_record_is_ten_fields() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let pid = Pid::from_values(&values).unwrap();
        assert_eq!(pid.kff, 10.0);
        assert_eq!(pid.to_values(), values);
        assert!(Pid::from_values(&values[..9]).is_none());
    }

    #[test]
    fn test_stamp_advance_is_monotonic() {
        let mut stamp = Stamp::default();
        let a = stamp.advance(1.5);
        let b = stamp.advance(1.2);
        assert!(b.sequence > a.sequence);
        assert_eq!(b.time, 1.2);
    }

    #[test]
    fn test_pid_kind_tags() {
        for kind in PidKind::ALL {
            assert_eq!(PidKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(PidKind::from_tag(Tag::new("nope")), None);
    }
}
