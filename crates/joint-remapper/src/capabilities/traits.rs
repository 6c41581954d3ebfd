//! One trait per control/sensing interface a subdevice may expose.
//!
//! Axis indices are device-local. Group methods receive parallel slices of
//! axes and values; their default bodies loop over the single-axis methods so
//! backends only override them when the hardware has a native batch call.

use crate::error::DeviceResult;
use crate::protocol::Value;
use crate::types::{
    CalibrationParameters, ControlMode, ImpedanceParams, ImpedanceRange, InteractionMode,
    JointType, MotorTorqueParams, Pid, PidKind, Stamp,
};

fn set_each(
    axes: &[usize],
    values: &[f64],
    mut f: impl FnMut(usize, f64) -> DeviceResult<()>,
) -> DeviceResult<()> {
    for (axis, value) in axes.iter().zip(values) {
        f(*axis, *value)?;
    }
    Ok(())
}

fn get_each<T>(
    axes: &[usize],
    out: &mut [T],
    mut f: impl FnMut(usize) -> DeviceResult<T>,
) -> DeviceResult<()> {
    for (axis, slot) in axes.iter().zip(out.iter_mut()) {
        *slot = f(*axis)?;
    }
    Ok(())
}

pub trait PositionControl: Send + Sync {
    fn axes(&self) -> DeviceResult<usize>;
    fn position_move(&self, axis: usize, target: f64) -> DeviceResult<()>;
    fn relative_move(&self, axis: usize, delta: f64) -> DeviceResult<()>;
    fn motion_done(&self, axis: usize) -> DeviceResult<bool>;
    fn set_ref_speed(&self, axis: usize, speed: f64) -> DeviceResult<()>;
    fn ref_speed(&self, axis: usize) -> DeviceResult<f64>;
    fn set_ref_acceleration(&self, axis: usize, acceleration: f64) -> DeviceResult<()>;
    fn ref_acceleration(&self, axis: usize) -> DeviceResult<f64>;
    fn stop(&self, axis: usize) -> DeviceResult<()>;
    fn target_position(&self, axis: usize) -> DeviceResult<f64>;

    fn position_move_group(&self, axes: &[usize], targets: &[f64]) -> DeviceResult<()> {
        set_each(axes, targets, |a, v| self.position_move(a, v))
    }
    fn relative_move_group(&self, axes: &[usize], deltas: &[f64]) -> DeviceResult<()> {
        set_each(axes, deltas, |a, v| self.relative_move(a, v))
    }
    fn motion_done_group(&self, axes: &[usize]) -> DeviceResult<bool> {
        let mut done = true;
        for axis in axes {
            done &= self.motion_done(*axis)?;
        }
        Ok(done)
    }
    fn set_ref_speed_group(&self, axes: &[usize], speeds: &[f64]) -> DeviceResult<()> {
        set_each(axes, speeds, |a, v| self.set_ref_speed(a, v))
    }
    fn ref_speed_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.ref_speed(a))
    }
    fn set_ref_acceleration_group(&self, axes: &[usize], values: &[f64]) -> DeviceResult<()> {
        set_each(axes, values, |a, v| self.set_ref_acceleration(a, v))
    }
    fn ref_acceleration_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.ref_acceleration(a))
    }
    fn stop_group(&self, axes: &[usize]) -> DeviceResult<()> {
        for axis in axes {
            self.stop(*axis)?;
        }
        Ok(())
    }
    fn target_position_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.target_position(a))
    }
}

pub trait PositionDirect: Send + Sync {
    fn set_position(&self, axis: usize, position: f64) -> DeviceResult<()>;
    fn ref_position(&self, axis: usize) -> DeviceResult<f64>;

    fn set_position_group(&self, axes: &[usize], positions: &[f64]) -> DeviceResult<()> {
        set_each(axes, positions, |a, v| self.set_position(a, v))
    }
    fn ref_position_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.ref_position(a))
    }
}

pub trait VelocityControl: Send + Sync {
    fn axes(&self) -> DeviceResult<usize>;
    fn velocity_move(&self, axis: usize, velocity: f64) -> DeviceResult<()>;
    fn ref_velocity(&self, axis: usize) -> DeviceResult<f64>;

    fn velocity_move_group(&self, axes: &[usize], velocities: &[f64]) -> DeviceResult<()> {
        set_each(axes, velocities, |a, v| self.velocity_move(a, v))
    }
    fn ref_velocity_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.ref_velocity(a))
    }
}

pub trait TorqueControl: Send + Sync {
    fn ref_torque(&self, axis: usize) -> DeviceResult<f64>;
    fn set_ref_torque(&self, axis: usize, torque: f64) -> DeviceResult<()>;
    fn torque(&self, axis: usize) -> DeviceResult<f64>;
    fn torque_range(&self, axis: usize) -> DeviceResult<(f64, f64)>;
    fn motor_torque_params(&self, axis: usize) -> DeviceResult<MotorTorqueParams>;
    fn set_motor_torque_params(&self, axis: usize, params: MotorTorqueParams) -> DeviceResult<()>;

    fn ref_torque_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.ref_torque(a))
    }
    fn set_ref_torque_group(&self, axes: &[usize], torques: &[f64]) -> DeviceResult<()> {
        set_each(axes, torques, |a, v| self.set_ref_torque(a, v))
    }
    fn torque_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.torque(a))
    }
}

pub trait CurrentControl: Send + Sync {
    fn ref_current(&self, axis: usize) -> DeviceResult<f64>;
    fn set_ref_current(&self, axis: usize, current: f64) -> DeviceResult<()>;
    fn current(&self, axis: usize) -> DeviceResult<f64>;
    fn current_range(&self, axis: usize) -> DeviceResult<(f64, f64)>;

    fn ref_current_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.ref_current(a))
    }
    fn set_ref_current_group(&self, axes: &[usize], currents: &[f64]) -> DeviceResult<()> {
        set_each(axes, currents, |a, v| self.set_ref_current(a, v))
    }
    fn current_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.current(a))
    }
}

pub trait PwmControl: Send + Sync {
    fn ref_duty_cycle(&self, axis: usize) -> DeviceResult<f64>;
    fn set_ref_duty_cycle(&self, axis: usize, duty: f64) -> DeviceResult<()>;
    fn duty_cycle(&self, axis: usize) -> DeviceResult<f64>;

    fn ref_duty_cycle_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.ref_duty_cycle(a))
    }
    fn set_ref_duty_cycle_group(&self, axes: &[usize], duties: &[f64]) -> DeviceResult<()> {
        set_each(axes, duties, |a, v| self.set_ref_duty_cycle(a, v))
    }
    fn duty_cycle_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.duty_cycle(a))
    }
}

/// Joint encoders that report a sensing timestamp with every reading.
pub trait TimedEncoders: Send + Sync {
    fn axes(&self) -> DeviceResult<usize>;
    fn encoder_timed(&self, axis: usize) -> DeviceResult<(f64, f64)>;
    fn encoder_speed(&self, axis: usize) -> DeviceResult<f64>;
    fn encoder_acceleration(&self, axis: usize) -> DeviceResult<f64>;
    fn set_encoder(&self, axis: usize, value: f64) -> DeviceResult<()>;
    fn reset_encoder(&self, axis: usize) -> DeviceResult<()>;

    fn encoder(&self, axis: usize) -> DeviceResult<f64> {
        self.encoder_timed(axis).map(|(value, _)| value)
    }
    fn encoder_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.encoder(a))
    }
    fn encoders_timed_group(
        &self,
        axes: &[usize],
        values: &mut [f64],
        stamps: &mut [f64],
    ) -> DeviceResult<()> {
        for ((axis, value), stamp) in axes.iter().zip(values.iter_mut()).zip(stamps.iter_mut()) {
            let (v, t) = self.encoder_timed(*axis)?;
            *value = v;
            *stamp = t;
        }
        Ok(())
    }
    fn encoder_speed_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.encoder_speed(a))
    }
    fn encoder_acceleration_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.encoder_acceleration(a))
    }
}

pub trait MotorEncoders: Send + Sync {
    fn count(&self) -> DeviceResult<usize>;
    fn motor_encoder(&self, axis: usize) -> DeviceResult<f64>;
    fn motor_encoder_speed(&self, axis: usize) -> DeviceResult<f64>;
    fn motor_encoder_acceleration(&self, axis: usize) -> DeviceResult<f64>;
    fn set_motor_encoder(&self, axis: usize, value: f64) -> DeviceResult<()>;
    fn reset_motor_encoder(&self, axis: usize) -> DeviceResult<()>;
    fn counts_per_revolution(&self, axis: usize) -> DeviceResult<f64>;
    fn set_counts_per_revolution(&self, axis: usize, cpr: f64) -> DeviceResult<()>;

    fn motor_encoder_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.motor_encoder(a))
    }
    fn motor_encoder_speed_group(&self, axes: &[usize], out: &mut [f64]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.motor_encoder_speed(a))
    }
    fn motor_encoder_acceleration_group(
        &self,
        axes: &[usize],
        out: &mut [f64],
    ) -> DeviceResult<()> {
        get_each(axes, out, |a| self.motor_encoder_acceleration(a))
    }
}

pub trait ControlLimits: Send + Sync {
    fn limits(&self, axis: usize) -> DeviceResult<(f64, f64)>;
    fn set_limits(&self, axis: usize, min: f64, max: f64) -> DeviceResult<()>;
    fn velocity_limits(&self, axis: usize) -> DeviceResult<(f64, f64)>;
    fn set_velocity_limits(&self, axis: usize, min: f64, max: f64) -> DeviceResult<()>;
}

pub trait ControlCalibration: Send + Sync {
    fn calibrate_axis(&self, axis: usize, kind: i64, p1: f64, p2: f64, p3: f64) -> DeviceResult<()>;
    fn set_calibration_parameters(
        &self,
        axis: usize,
        params: CalibrationParameters,
    ) -> DeviceResult<()>;
    fn calibration_done(&self, axis: usize) -> DeviceResult<bool>;
}

/// Part-level calibration/homing/park sequencer. Not bound per subdevice:
/// joints are logical indices.
pub trait RemoteCalibrator: Send + Sync {
    fn is_available(&self) -> bool;
    fn calibrate_joint(&self, joint: usize) -> DeviceResult<()>;
    fn calibrate_whole_part(&self) -> DeviceResult<()>;
    fn homing_joint(&self, joint: usize) -> DeviceResult<()>;
    fn homing_whole_part(&self) -> DeviceResult<()>;
    fn park_joint(&self, joint: usize, wait: bool) -> DeviceResult<()>;
    fn park_whole_part(&self) -> DeviceResult<()>;
    fn quit_calibrate(&self) -> DeviceResult<()>;
    fn quit_park(&self) -> DeviceResult<()>;
}

pub trait ImpedanceControl: Send + Sync {
    fn impedance(&self, axis: usize) -> DeviceResult<ImpedanceParams>;
    fn set_impedance(&self, axis: usize, params: ImpedanceParams) -> DeviceResult<()>;
    fn impedance_offset(&self, axis: usize) -> DeviceResult<f64>;
    fn set_impedance_offset(&self, axis: usize, offset: f64) -> DeviceResult<()>;
    fn impedance_range(&self, axis: usize) -> DeviceResult<ImpedanceRange>;
}

pub trait ControlModes: Send + Sync {
    fn control_mode(&self, axis: usize) -> DeviceResult<ControlMode>;
    fn set_control_mode(&self, axis: usize, mode: ControlMode) -> DeviceResult<()>;

    fn control_mode_group(&self, axes: &[usize], out: &mut [ControlMode]) -> DeviceResult<()> {
        get_each(axes, out, |a| self.control_mode(a))
    }
    fn set_control_mode_group(&self, axes: &[usize], modes: &[ControlMode]) -> DeviceResult<()> {
        for (axis, mode) in axes.iter().zip(modes) {
            self.set_control_mode(*axis, *mode)?;
        }
        Ok(())
    }
}

pub trait InteractionModes: Send + Sync {
    fn interaction_mode(&self, axis: usize) -> DeviceResult<InteractionMode>;
    fn set_interaction_mode(&self, axis: usize, mode: InteractionMode) -> DeviceResult<()>;

    fn interaction_mode_group(
        &self,
        axes: &[usize],
        out: &mut [InteractionMode],
    ) -> DeviceResult<()> {
        get_each(axes, out, |a| self.interaction_mode(a))
    }
    fn set_interaction_mode_group(
        &self,
        axes: &[usize],
        modes: &[InteractionMode],
    ) -> DeviceResult<()> {
        for (axis, mode) in axes.iter().zip(modes) {
            self.set_interaction_mode(*axis, *mode)?;
        }
        Ok(())
    }
}

pub trait AxisInfo: Send + Sync {
    fn axis_name(&self, axis: usize) -> DeviceResult<String>;
    fn joint_type(&self, axis: usize) -> DeviceResult<JointType>;
}

pub trait AmplifierControl: Send + Sync {
    fn enable(&self, axis: usize) -> DeviceResult<()>;
    fn disable(&self, axis: usize) -> DeviceResult<()>;
    fn status(&self, axis: usize) -> DeviceResult<i32>;
    fn max_current(&self, axis: usize) -> DeviceResult<f64>;
    fn set_max_current(&self, axis: usize, value: f64) -> DeviceResult<()>;
    fn nominal_current(&self, axis: usize) -> DeviceResult<f64>;
    fn set_nominal_current(&self, axis: usize, value: f64) -> DeviceResult<()>;
    fn peak_current(&self, axis: usize) -> DeviceResult<f64>;
    fn set_peak_current(&self, axis: usize, value: f64) -> DeviceResult<()>;
    fn pwm_limit(&self, axis: usize) -> DeviceResult<f64>;
    fn set_pwm_limit(&self, axis: usize, value: f64) -> DeviceResult<()>;
    fn supply_voltage(&self, axis: usize) -> DeviceResult<f64>;
}

pub trait PidControl: Send + Sync {
    fn pid(&self, kind: PidKind, axis: usize) -> DeviceResult<Pid>;
    fn set_pid(&self, kind: PidKind, axis: usize, pid: Pid) -> DeviceResult<()>;
    fn reference(&self, kind: PidKind, axis: usize) -> DeviceResult<f64>;
    fn set_reference(&self, kind: PidKind, axis: usize, value: f64) -> DeviceResult<()>;
    fn error_limit(&self, kind: PidKind, axis: usize) -> DeviceResult<f64>;
    fn set_error_limit(&self, kind: PidKind, axis: usize, value: f64) -> DeviceResult<()>;
    fn error(&self, kind: PidKind, axis: usize) -> DeviceResult<f64>;
    fn output(&self, kind: PidKind, axis: usize) -> DeviceResult<f64>;
    fn set_offset(&self, kind: PidKind, axis: usize, value: f64) -> DeviceResult<()>;
    fn enable_pid(&self, kind: PidKind, axis: usize) -> DeviceResult<()>;
    fn disable_pid(&self, kind: PidKind, axis: usize) -> DeviceResult<()>;
    fn reset_pid(&self, kind: PidKind, axis: usize) -> DeviceResult<()>;
    fn is_pid_enabled(&self, kind: PidKind, axis: usize) -> DeviceResult<bool>;
}

pub trait RemoteVariables: Send + Sync {
    fn keys(&self) -> DeviceResult<Vec<String>>;
    fn variable(&self, key: &str) -> DeviceResult<Vec<Value>>;
    fn set_variable(&self, key: &str, value: &[Value]) -> DeviceResult<()>;
}

pub trait PreciselyTimed: Send + Sync {
    fn last_input_stamp(&self) -> Stamp;
}
