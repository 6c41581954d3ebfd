//! In-memory subdevice for tests and dry runs.

use crate::capabilities::{
    AmplifierControl, AxisInfo, Capability, ControlCalibration, ControlLimits, ControlModes,
    CurrentControl, ImpedanceControl, InteractionModes, MotorEncoders, PidControl,
    PositionControl, PositionDirect, PreciselyTimed, PwmControl, RemoteCalibrator,
    RemoteVariables, TimedEncoders, TorqueControl, VelocityControl,
};
use crate::error::{DeviceError, DeviceResult};
use crate::protocol::Value;
use crate::types::{
    now_seconds, CalibrationParameters, ControlMode, ImpedanceParams, ImpedanceRange,
    InteractionMode, JointType, MotorTorqueParams, Pid, PidKind, Stamp,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, Default)]
pub struct PidState {
    pub params: Pid,
    pub reference: f64,
    pub error_limit: f64,
    pub offset: f64,
    pub enabled: bool,
}

/// Observable state of one mock axis.
#[derive(Debug, Clone)]
pub struct AxisState {
    pub name: String,
    pub encoder: f64,
    pub encoder_speed: f64,
    pub encoder_acceleration: f64,
    pub target: f64,
    pub moving: bool,
    pub ref_speed: f64,
    pub ref_acceleration: f64,
    pub ref_velocity: f64,
    pub ref_position: f64,
    pub ref_torque: f64,
    pub torque: f64,
    pub motor_params: MotorTorqueParams,
    pub ref_current: f64,
    pub current: f64,
    pub ref_duty: f64,
    pub duty: f64,
    pub motor_encoder: f64,
    pub counts_per_revolution: f64,
    pub limits: (f64, f64),
    pub velocity_limits: (f64, f64),
    pub calibration: Option<CalibrationParameters>,
    pub impedance: ImpedanceParams,
    pub impedance_offset: f64,
    pub control_mode: ControlMode,
    pub interaction_mode: InteractionMode,
    pub amp_enabled: bool,
    pub max_current: f64,
    pub nominal_current: f64,
    pub peak_current: f64,
    pub pwm_limit: f64,
    pub pid: [PidState; 4],
}

impl AxisState {
    fn new(axis: usize) -> Self {
        Self {
            name: format!("axis{axis}"),
            encoder: 0.0,
            encoder_speed: 0.0,
            encoder_acceleration: 0.0,
            target: 0.0,
            moving: false,
            ref_speed: 10.0,
            ref_acceleration: 50.0,
            ref_velocity: 0.0,
            ref_position: 0.0,
            ref_torque: 0.0,
            torque: 0.0,
            motor_params: MotorTorqueParams::default(),
            ref_current: 0.0,
            current: 0.0,
            ref_duty: 0.0,
            duty: 0.0,
            motor_encoder: 0.0,
            counts_per_revolution: 4096.0,
            limits: (-180.0, 180.0),
            velocity_limits: (0.0, 100.0),
            calibration: None,
            impedance: ImpedanceParams::default(),
            impedance_offset: 0.0,
            control_mode: ControlMode::POSITION,
            interaction_mode: InteractionMode::STIFF,
            amp_enabled: false,
            max_current: 2.0,
            nominal_current: 1.0,
            peak_current: 3.0,
            pwm_limit: 100.0,
            pid: [PidState::default(); 4],
        }
    }

    fn pid(&mut self, kind: PidKind) -> &mut PidState {
        let index = PidKind::ALL.iter().position(|k| *k == kind).unwrap_or(0);
        &mut self.pid[index]
    }
}

#[derive(Debug)]
struct MockState {
    axes: Vec<AxisState>,
    stamp: Option<f64>,
    input_stamp: Stamp,
    variables: BTreeMap<String, Vec<Value>>,
    failing: HashSet<Capability>,
}

/// Controller exposing every capability over an in-memory axis table.
///
/// Position moves complete instantly: the encoder jumps to the target. Every
/// interface call bumps [`MockController::calls`].
#[derive(Debug)]
pub struct MockController {
    state: Mutex<MockState>,
    calls: AtomicUsize,
}

impl MockController {
    pub fn new(axes: usize) -> Self {
        Self {
            state: Mutex::new(MockState {
                axes: (0..axes).map(AxisState::new).collect(),
                stamp: None,
                input_stamp: Stamp::default(),
                variables: BTreeMap::new(),
                failing: HashSet::new(),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and check the capability has not been told to fail.
    fn enter(&self, capability: Capability) -> DeviceResult<MutexGuard<'_, MockState>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let state = self.lock();
        if state.failing.contains(&capability) {
            return Err(DeviceError::Failed(format!("{capability} failure injected")));
        }
        Ok(state)
    }

    fn with_axis<T>(
        &self,
        capability: Capability,
        axis: usize,
        f: impl FnOnce(&mut AxisState) -> T,
    ) -> DeviceResult<T> {
        let mut state = self.enter(capability)?;
        let axes = state.axes.len();
        let slot = state
            .axes
            .get_mut(axis)
            .ok_or(DeviceError::BadAxis { axis, axes })?;
        Ok(f(slot))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn axis(&self, axis: usize) -> AxisState {
        self.lock().axes[axis].clone()
    }

    pub fn target(&self, axis: usize) -> f64 {
        self.lock().axes[axis].target
    }

    pub fn set_encoder_values(&self, values: &[f64]) {
        let mut state = self.lock();
        for (slot, value) in state.axes.iter_mut().zip(values) {
            slot.encoder = *value;
        }
    }

    /// Fix the sensing time reported with encoder readings.
    pub fn set_encoder_stamp(&self, time: f64) {
        self.lock().stamp = Some(time);
    }

    pub fn set_moving(&self, axis: usize, moving: bool) {
        self.lock().axes[axis].moving = moving;
    }

    pub fn set_axis_name(&self, axis: usize, name: &str) {
        self.lock().axes[axis].name = name.to_string();
    }

    /// Make every call through `capability` fail until [`Self::recover`].
    pub fn fail(&self, capability: Capability) {
        self.lock().failing.insert(capability);
    }

    pub fn recover(&self, capability: Capability) {
        self.lock().failing.remove(&capability);
    }

    fn axis_count(&self, capability: Capability) -> DeviceResult<usize> {
        Ok(self.enter(capability)?.axes.len())
    }
}

impl PositionControl for MockController {
    fn axes(&self) -> DeviceResult<usize> {
        self.axis_count(Capability::Position)
    }
    fn position_move(&self, axis: usize, target: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Position, axis, |s| {
            s.target = target;
            s.encoder = target;
        })
    }
    fn relative_move(&self, axis: usize, delta: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Position, axis, |s| {
            s.target += delta;
            s.encoder = s.target;
        })
    }
    fn motion_done(&self, axis: usize) -> DeviceResult<bool> {
        self.with_axis(Capability::Position, axis, |s| !s.moving)
    }
    fn set_ref_speed(&self, axis: usize, speed: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Position, axis, |s| s.ref_speed = speed)
    }
    fn ref_speed(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Position, axis, |s| s.ref_speed)
    }
    fn set_ref_acceleration(&self, axis: usize, acceleration: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Position, axis, |s| {
            s.ref_acceleration = acceleration
        })
    }
    fn ref_acceleration(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Position, axis, |s| s.ref_acceleration)
    }
    fn stop(&self, axis: usize) -> DeviceResult<()> {
        self.with_axis(Capability::Position, axis, |s| {
            s.moving = false;
            s.target = s.encoder;
        })
    }
    fn target_position(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Position, axis, |s| s.target)
    }
}

impl PositionDirect for MockController {
    fn set_position(&self, axis: usize, position: f64) -> DeviceResult<()> {
        self.with_axis(Capability::PositionDirect, axis, |s| {
            s.ref_position = position;
            s.encoder = position;
        })
    }
    fn ref_position(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::PositionDirect, axis, |s| s.ref_position)
    }
}

impl VelocityControl for MockController {
    fn axes(&self) -> DeviceResult<usize> {
        self.axis_count(Capability::Velocity)
    }
    fn velocity_move(&self, axis: usize, velocity: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Velocity, axis, |s| {
            s.ref_velocity = velocity;
            s.encoder_speed = velocity;
        })
    }
    fn ref_velocity(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Velocity, axis, |s| s.ref_velocity)
    }
}

impl TorqueControl for MockController {
    fn ref_torque(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Torque, axis, |s| s.ref_torque)
    }
    fn set_ref_torque(&self, axis: usize, torque: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Torque, axis, |s| {
            s.ref_torque = torque;
            s.torque = torque;
        })
    }
    fn torque(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Torque, axis, |s| s.torque)
    }
    fn torque_range(&self, axis: usize) -> DeviceResult<(f64, f64)> {
        self.with_axis(Capability::Torque, axis, |_| (-5.0, 5.0))
    }
    fn motor_torque_params(&self, axis: usize) -> DeviceResult<MotorTorqueParams> {
        self.with_axis(Capability::Torque, axis, |s| s.motor_params)
    }
    fn set_motor_torque_params(&self, axis: usize, params: MotorTorqueParams) -> DeviceResult<()> {
        self.with_axis(Capability::Torque, axis, |s| s.motor_params = params)
    }
}

impl CurrentControl for MockController {
    fn ref_current(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Current, axis, |s| s.ref_current)
    }
    fn set_ref_current(&self, axis: usize, current: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Current, axis, |s| {
            s.ref_current = current;
            s.current = current;
        })
    }
    fn current(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Current, axis, |s| s.current)
    }
    fn current_range(&self, axis: usize) -> DeviceResult<(f64, f64)> {
        self.with_axis(Capability::Current, axis, |s| (-s.peak_current, s.peak_current))
    }
}

impl PwmControl for MockController {
    fn ref_duty_cycle(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Pwm, axis, |s| s.ref_duty)
    }
    fn set_ref_duty_cycle(&self, axis: usize, duty: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Pwm, axis, |s| {
            s.ref_duty = duty;
            s.duty = duty;
        })
    }
    fn duty_cycle(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Pwm, axis, |s| s.duty)
    }
}

impl TimedEncoders for MockController {
    fn axes(&self) -> DeviceResult<usize> {
        self.axis_count(Capability::Encoders)
    }
    fn encoder_timed(&self, axis: usize) -> DeviceResult<(f64, f64)> {
        let stamp = self.lock().stamp;
        self.with_axis(Capability::Encoders, axis, |s| {
            (s.encoder, stamp.unwrap_or_else(now_seconds))
        })
    }
    fn encoder_speed(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Encoders, axis, |s| s.encoder_speed)
    }
    fn encoder_acceleration(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Encoders, axis, |s| s.encoder_acceleration)
    }
    fn set_encoder(&self, axis: usize, value: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Encoders, axis, |s| s.encoder = value)
    }
    fn reset_encoder(&self, axis: usize) -> DeviceResult<()> {
        self.with_axis(Capability::Encoders, axis, |s| s.encoder = 0.0)
    }
}

impl MotorEncoders for MockController {
    fn count(&self) -> DeviceResult<usize> {
        self.axis_count(Capability::MotorEncoders)
    }
    fn motor_encoder(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::MotorEncoders, axis, |s| s.motor_encoder)
    }
    fn motor_encoder_speed(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::MotorEncoders, axis, |s| s.encoder_speed)
    }
    fn motor_encoder_acceleration(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::MotorEncoders, axis, |s| s.encoder_acceleration)
    }
    fn set_motor_encoder(&self, axis: usize, value: f64) -> DeviceResult<()> {
        self.with_axis(Capability::MotorEncoders, axis, |s| s.motor_encoder = value)
    }
    fn reset_motor_encoder(&self, axis: usize) -> DeviceResult<()> {
        self.with_axis(Capability::MotorEncoders, axis, |s| s.motor_encoder = 0.0)
    }
    fn counts_per_revolution(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::MotorEncoders, axis, |s| s.counts_per_revolution)
    }
    fn set_counts_per_revolution(&self, axis: usize, cpr: f64) -> DeviceResult<()> {
        self.with_axis(Capability::MotorEncoders, axis, |s| {
            s.counts_per_revolution = cpr
        })
    }
}

impl ControlLimits for MockController {
    fn limits(&self, axis: usize) -> DeviceResult<(f64, f64)> {
        self.with_axis(Capability::Limits, axis, |s| s.limits)
    }
    fn set_limits(&self, axis: usize, min: f64, max: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Limits, axis, |s| s.limits = (min, max))
    }
    fn velocity_limits(&self, axis: usize) -> DeviceResult<(f64, f64)> {
        self.with_axis(Capability::Limits, axis, |s| s.velocity_limits)
    }
    fn set_velocity_limits(&self, axis: usize, min: f64, max: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Limits, axis, |s| s.velocity_limits = (min, max))
    }
}

impl ControlCalibration for MockController {
    fn calibrate_axis(&self, axis: usize, kind: i64, p1: f64, p2: f64, p3: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Calibration, axis, |s| {
            s.calibration = Some(CalibrationParameters {
                kind,
                params: [p1, p2, p3, 0.0, 0.0],
                param_zero: 0.0,
            })
        })
    }
    fn set_calibration_parameters(
        &self,
        axis: usize,
        params: CalibrationParameters,
    ) -> DeviceResult<()> {
        self.with_axis(Capability::Calibration, axis, |s| {
            s.calibration = Some(params)
        })
    }
    fn calibration_done(&self, axis: usize) -> DeviceResult<bool> {
        self.with_axis(Capability::Calibration, axis, |s| s.calibration.is_some())
    }
}

impl ImpedanceControl for MockController {
    fn impedance(&self, axis: usize) -> DeviceResult<ImpedanceParams> {
        self.with_axis(Capability::Impedance, axis, |s| s.impedance)
    }
    fn set_impedance(&self, axis: usize, params: ImpedanceParams) -> DeviceResult<()> {
        self.with_axis(Capability::Impedance, axis, |s| s.impedance = params)
    }
    fn impedance_offset(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Impedance, axis, |s| s.impedance_offset)
    }
    fn set_impedance_offset(&self, axis: usize, offset: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Impedance, axis, |s| s.impedance_offset = offset)
    }
    fn impedance_range(&self, axis: usize) -> DeviceResult<ImpedanceRange> {
        self.with_axis(Capability::Impedance, axis, |_| ImpedanceRange {
            min_stiffness: 0.0,
            max_stiffness: 10.0,
            min_damping: 0.0,
            max_damping: 1.0,
        })
    }
}

impl ControlModes for MockController {
    fn control_mode(&self, axis: usize) -> DeviceResult<ControlMode> {
        self.with_axis(Capability::ControlMode, axis, |s| s.control_mode)
    }
    fn set_control_mode(&self, axis: usize, mode: ControlMode) -> DeviceResult<()> {
        self.with_axis(Capability::ControlMode, axis, |s| s.control_mode = mode)
    }
}

impl InteractionModes for MockController {
    fn interaction_mode(&self, axis: usize) -> DeviceResult<InteractionMode> {
        self.with_axis(Capability::InteractionMode, axis, |s| s.interaction_mode)
    }
    fn set_interaction_mode(&self, axis: usize, mode: InteractionMode) -> DeviceResult<()> {
        self.with_axis(Capability::InteractionMode, axis, |s| {
            s.interaction_mode = mode
        })
    }
}

impl AxisInfo for MockController {
    fn axis_name(&self, axis: usize) -> DeviceResult<String> {
        self.with_axis(Capability::AxisInfo, axis, |s| s.name.clone())
    }
    fn joint_type(&self, axis: usize) -> DeviceResult<JointType> {
        self.with_axis(Capability::AxisInfo, axis, |_| JointType::Revolute)
    }
}

impl AmplifierControl for MockController {
    fn enable(&self, axis: usize) -> DeviceResult<()> {
        self.with_axis(Capability::Amplifier, axis, |s| s.amp_enabled = true)
    }
    fn disable(&self, axis: usize) -> DeviceResult<()> {
        self.with_axis(Capability::Amplifier, axis, |s| s.amp_enabled = false)
    }
    fn status(&self, axis: usize) -> DeviceResult<i32> {
        self.with_axis(Capability::Amplifier, axis, |s| i32::from(s.amp_enabled))
    }
    fn max_current(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Amplifier, axis, |s| s.max_current)
    }
    fn set_max_current(&self, axis: usize, value: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Amplifier, axis, |s| s.max_current = value)
    }
    fn nominal_current(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Amplifier, axis, |s| s.nominal_current)
    }
    fn set_nominal_current(&self, axis: usize, value: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Amplifier, axis, |s| s.nominal_current = value)
    }
    fn peak_current(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Amplifier, axis, |s| s.peak_current)
    }
    fn set_peak_current(&self, axis: usize, value: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Amplifier, axis, |s| s.peak_current = value)
    }
    fn pwm_limit(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Amplifier, axis, |s| s.pwm_limit)
    }
    fn set_pwm_limit(&self, axis: usize, value: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Amplifier, axis, |s| s.pwm_limit = value)
    }
    fn supply_voltage(&self, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Amplifier, axis, |_| 48.0)
    }
}

impl PidControl for MockController {
    fn pid(&self, kind: PidKind, axis: usize) -> DeviceResult<Pid> {
        self.with_axis(Capability::Pid, axis, |s| s.pid(kind).params)
    }
    fn set_pid(&self, kind: PidKind, axis: usize, pid: Pid) -> DeviceResult<()> {
        self.with_axis(Capability::Pid, axis, |s| s.pid(kind).params = pid)
    }
    fn reference(&self, kind: PidKind, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Pid, axis, |s| s.pid(kind).reference)
    }
    fn set_reference(&self, kind: PidKind, axis: usize, value: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Pid, axis, |s| s.pid(kind).reference = value)
    }
    fn error_limit(&self, kind: PidKind, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Pid, axis, |s| s.pid(kind).error_limit)
    }
    fn set_error_limit(&self, kind: PidKind, axis: usize, value: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Pid, axis, |s| s.pid(kind).error_limit = value)
    }
    fn error(&self, kind: PidKind, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Pid, axis, |s| {
            let encoder = s.encoder;
            s.pid(kind).reference - encoder
        })
    }
    fn output(&self, kind: PidKind, axis: usize) -> DeviceResult<f64> {
        self.with_axis(Capability::Pid, axis, |s| {
            let encoder = s.encoder;
            let pid = s.pid(kind);
            if pid.enabled {
                pid.params.kp * (pid.reference - encoder) + pid.offset
            } else {
                0.0
            }
        })
    }
    fn set_offset(&self, kind: PidKind, axis: usize, value: f64) -> DeviceResult<()> {
        self.with_axis(Capability::Pid, axis, |s| s.pid(kind).offset = value)
    }
    fn enable_pid(&self, kind: PidKind, axis: usize) -> DeviceResult<()> {
        self.with_axis(Capability::Pid, axis, |s| s.pid(kind).enabled = true)
    }
    fn disable_pid(&self, kind: PidKind, axis: usize) -> DeviceResult<()> {
        self.with_axis(Capability::Pid, axis, |s| s.pid(kind).enabled = false)
    }
    fn reset_pid(&self, kind: PidKind, axis: usize) -> DeviceResult<()> {
        self.with_axis(Capability::Pid, axis, |s| {
            let pid = s.pid(kind);
            pid.reference = 0.0;
            pid.offset = 0.0;
        })
    }
    fn is_pid_enabled(&self, kind: PidKind, axis: usize) -> DeviceResult<bool> {
        self.with_axis(Capability::Pid, axis, |s| s.pid(kind).enabled)
    }
}

impl RemoteVariables for MockController {
    fn keys(&self) -> DeviceResult<Vec<String>> {
        Ok(self
            .enter(Capability::RemoteVariables)?
            .variables
            .keys()
            .cloned()
            .collect())
    }
    fn variable(&self, key: &str) -> DeviceResult<Vec<Value>> {
        self.enter(Capability::RemoteVariables)?
            .variables
            .get(key)
            .cloned()
            .ok_or_else(|| DeviceError::Failed(format!("unknown variable {key}")))
    }
    fn set_variable(&self, key: &str, value: &[Value]) -> DeviceResult<()> {
        self.enter(Capability::RemoteVariables)?
            .variables
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

impl PreciselyTimed for MockController {
    fn last_input_stamp(&self) -> Stamp {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.lock().input_stamp
    }
}

/// Calibrator that records the sequence of requests it receives.
#[derive(Debug, Default)]
pub struct MockCalibrator {
    log: Mutex<Vec<String>>,
}

impl MockCalibrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, entry: String) -> DeviceResult<()> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        Ok(())
    }
}

impl RemoteCalibrator for MockCalibrator {
    fn is_available(&self) -> bool {
        true
    }
    fn calibrate_joint(&self, joint: usize) -> DeviceResult<()> {
        self.record(format!("calibrate {joint}"))
    }
    fn calibrate_whole_part(&self) -> DeviceResult<()> {
        self.record("calibrate all".into())
    }
    fn homing_joint(&self, joint: usize) -> DeviceResult<()> {
        self.record(format!("home {joint}"))
    }
    fn homing_whole_part(&self) -> DeviceResult<()> {
        self.record("home all".into())
    }
    fn park_joint(&self, joint: usize, wait: bool) -> DeviceResult<()> {
        self.record(format!("park {joint} wait={wait}"))
    }
    fn park_whole_part(&self) -> DeviceResult<()> {
        self.record("park all".into())
    }
    fn quit_calibrate(&self) -> DeviceResult<()> {
        self.record("quit calibrate".into())
    }
    fn quit_park(&self) -> DeviceResult<()> {
        self.record("quit park".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_completes_instantly() {
        let dev = MockController::new(2);
        PositionControl::position_move(&dev, 1, 30.0).unwrap();
        assert_eq!(dev.target(1), 30.0);
        assert_eq!(TimedEncoders::encoder(&dev, 1).unwrap(), 30.0);
        assert_eq!(dev.calls(), 2);
    }

    #[test]
    fn test_bad_axis_and_injected_failure() {
        let dev = MockController::new(2);
        assert_eq!(
            TorqueControl::torque(&dev, 5),
            Err(DeviceError::BadAxis { axis: 5, axes: 2 })
        );
        dev.fail(Capability::Torque);
        assert!(TorqueControl::torque(&dev, 0).is_err());
        dev.recover(Capability::Torque);
        assert!(TorqueControl::torque(&dev, 0).is_ok());
    }
}
