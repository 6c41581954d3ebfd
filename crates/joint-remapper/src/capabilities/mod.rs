//! Per-subdevice capability table.
//!
//! A [`CapabilitySet`] holds one optional handle per interface kind. Callers
//! ask the table for an interface and get [`CapabilityUnavailable`] when the
//! subdevice does not expose it.

mod traits;
pub use traits::{
    AmplifierControl, AxisInfo, ControlCalibration, ControlLimits, ControlModes, CurrentControl,
    ImpedanceControl, InteractionModes, MotorEncoders, PidControl, PositionControl,
    PositionDirect, PreciselyTimed, PwmControl, RemoteCalibrator, RemoteVariables, TimedEncoders,
    TorqueControl, VelocityControl,
};

use crate::error::CapabilityUnavailable;
use core::fmt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Position,
    PositionDirect,
    Velocity,
    Torque,
    Current,
    Pwm,
    Encoders,
    MotorEncoders,
    Limits,
    Calibration,
    Impedance,
    ControlMode,
    InteractionMode,
    AxisInfo,
    Amplifier,
    Pid,
    RemoteVariables,
    PreciselyTimed,
}

impl Capability {
    pub const ALL: [Capability; 18] = [
        Capability::Position,
        Capability::PositionDirect,
        Capability::Velocity,
        Capability::Torque,
        Capability::Current,
        Capability::Pwm,
        Capability::Encoders,
        Capability::MotorEncoders,
        Capability::Limits,
        Capability::Calibration,
        Capability::Impedance,
        Capability::ControlMode,
        Capability::InteractionMode,
        Capability::AxisInfo,
        Capability::Amplifier,
        Capability::Pid,
        Capability::RemoteVariables,
        Capability::PreciselyTimed,
    ];

    /// Capabilities every attached subdevice must expose.
    pub const REQUIRED: [Capability; 3] = [
        Capability::Position,
        Capability::Velocity,
        Capability::Encoders,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Capability::Position => "position",
            Capability::PositionDirect => "position_direct",
            Capability::Velocity => "velocity",
            Capability::Torque => "torque",
            Capability::Current => "current",
            Capability::Pwm => "pwm",
            Capability::Encoders => "encoders_timed",
            Capability::MotorEncoders => "motor_encoders",
            Capability::Limits => "limits",
            Capability::Calibration => "calibration",
            Capability::Impedance => "impedance",
            Capability::ControlMode => "control_mode",
            Capability::InteractionMode => "interaction_mode",
            Capability::AxisInfo => "axis_info",
            Capability::Amplifier => "amplifier",
            Capability::Pid => "pid",
            Capability::RemoteVariables => "remote_variables",
            Capability::PreciselyTimed => "precisely_timed",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! capability_table {
    ($( $field:ident, $with:ident: $kind:ident => $iface:ident ),* $(,)?) => {
        /// Optional interface handles of one subdevice.
        #[derive(Clone, Default)]
        pub struct CapabilitySet {
            $( $field: Option<Arc<dyn $iface>>, )*
        }

        impl CapabilitySet {
            $(
                pub fn $field(&self) -> Result<&dyn $iface, CapabilityUnavailable> {
                    self.$field
                        .as_deref()
                        .ok_or(CapabilityUnavailable(Capability::$kind))
                }

                pub fn $with(mut self, handle: Arc<dyn $iface>) -> Self {
                    self.$field = Some(handle);
                    self
                }
            )*

            pub fn supports(&self, capability: Capability) -> bool {
                match capability {
                    $( Capability::$kind => self.$field.is_some(), )*
                }
            }

            /// Drop one interface from the table.
            pub fn without(mut self, capability: Capability) -> Self {
                match capability {
                    $( Capability::$kind => self.$field = None, )*
                }
                self
            }
        }
    };
}

capability_table! {
    position, with_position: Position => PositionControl,
    position_direct, with_position_direct: PositionDirect => PositionDirect,
    velocity, with_velocity: Velocity => VelocityControl,
    torque, with_torque: Torque => TorqueControl,
    current, with_current: Current => CurrentControl,
    pwm, with_pwm: Pwm => PwmControl,
    encoders, with_encoders: Encoders => TimedEncoders,
    motor_encoders, with_motor_encoders: MotorEncoders => MotorEncoders,
    limits, with_limits: Limits => ControlLimits,
    calibration, with_calibration: Calibration => ControlCalibration,
    impedance, with_impedance: Impedance => ImpedanceControl,
    control_mode, with_control_mode: ControlMode => ControlModes,
    interaction_mode, with_interaction_mode: InteractionMode => InteractionModes,
    axis_info, with_axis_info: AxisInfo => AxisInfo,
    amplifier, with_amplifier: Amplifier => AmplifierControl,
    pid, with_pid: Pid => PidControl,
    remote_variables, with_remote_variables: RemoteVariables => RemoteVariables,
    precisely_timed, with_precisely_timed: PreciselyTimed => PreciselyTimed,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every interface of a device that implements all of them.
    pub fn from_device<D>(device: Arc<D>) -> Self
    where
        D: PositionControl
            + PositionDirect
            + VelocityControl
            + TorqueControl
            + CurrentControl
            + PwmControl
            + TimedEncoders
            + MotorEncoders
            + ControlLimits
            + ControlCalibration
            + ImpedanceControl
            + ControlModes
            + InteractionModes
            + AxisInfo
            + AmplifierControl
            + PidControl
            + RemoteVariables
            + PreciselyTimed
            + 'static,
    {
        Self::new()
            .with_position(device.clone())
            .with_position_direct(device.clone())
            .with_velocity(device.clone())
            .with_torque(device.clone())
            .with_current(device.clone())
            .with_pwm(device.clone())
            .with_encoders(device.clone())
            .with_motor_encoders(device.clone())
            .with_limits(device.clone())
            .with_calibration(device.clone())
            .with_impedance(device.clone())
            .with_control_mode(device.clone())
            .with_interaction_mode(device.clone())
            .with_axis_info(device.clone())
            .with_amplifier(device.clone())
            .with_pid(device.clone())
            .with_remote_variables(device.clone())
            .with_precisely_timed(device)
    }

    pub fn supported(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| self.supports(*c))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.supported().is_empty()
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.supported()).finish()
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::mock::MockController;

    #[test]
    fn test_full_device_supports_everything() {
        let caps = CapabilitySet::from_device(Arc::new(MockController::new(3)));
        for c in Capability::ALL {
            assert!(caps.supports(c), "{c} missing");
        }
    }

    #[test]
    fn test_without_clears_one_slot() {
        let caps = CapabilitySet::from_device(Arc::new(MockController::new(3)))
            .without(Capability::MotorEncoders);
        assert!(!caps.supports(Capability::MotorEncoders));
        assert_eq!(
            caps.motor_encoders().err(),
            Some(CapabilityUnavailable(Capability::MotorEncoders))
        );
        assert!(caps.position().is_ok());
    }

    #[test]
    fn test_empty_table() {
        let caps = CapabilitySet::new();
        assert!(caps.is_empty());
        assert!(caps.torque().is_err());
    }
}
