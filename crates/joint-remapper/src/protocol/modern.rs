//! Modern framing: `[opcode, interface, action, args..]`.

use super::grammar::{self, reply, selector, Encoding, JointCall, ScalarOp};
use super::pid::{self, PidCommand};
use super::tags::{self, Scope, GET, SET};
use super::{Args, Value};
use crate::board::{BoardView, JointSelector};
use crate::capabilities::RemoteVariables;
use crate::error::{CallResult, ProtocolError};
use crate::types::{ControlMode, ImpedanceParams, InteractionMode, MotorTorqueParams};
use crate::Tag;

/// First argument after the action tag.
const ARGS: usize = 3;

static TORQUE_SCALARS: &[ScalarOp] = &[
    ScalarOp {
        family: tags::REFERENCE,
        read: Some(|c, a, o| Ok(c.torque()?.ref_torque_group(a, o)?)),
        write: Some(|c, a, v| Ok(c.torque()?.set_ref_torque_group(a, v)?)),
        encoding: Encoding::Float,
    },
    ScalarOp {
        family: tags::MEASURED_TORQUE,
        read: Some(|c, a, o| Ok(c.torque()?.torque_group(a, o)?)),
        write: None,
        encoding: Encoding::Float,
    },
];

static CURRENT_SCALARS: &[ScalarOp] = &[
    ScalarOp {
        family: tags::REFERENCE,
        read: Some(|c, a, o| Ok(c.current()?.ref_current_group(a, o)?)),
        write: Some(|c, a, v| Ok(c.current()?.set_ref_current_group(a, v)?)),
        encoding: Encoding::Float,
    },
    ScalarOp {
        family: tags::MEASURED_CURRENT,
        read: Some(|c, a, o| Ok(c.current()?.current_group(a, o)?)),
        write: None,
        encoding: Encoding::Float,
    },
];

static PWM_SCALARS: &[ScalarOp] = &[
    ScalarOp {
        family: tags::REFERENCE,
        read: Some(|c, a, o| Ok(c.pwm()?.ref_duty_cycle_group(a, o)?)),
        write: Some(|c, a, v| Ok(c.pwm()?.set_ref_duty_cycle_group(a, v)?)),
        encoding: Encoding::Float,
    },
    ScalarOp {
        family: tags::MEASURED_DUTY,
        read: Some(|c, a, o| Ok(c.pwm()?.duty_cycle_group(a, o)?)),
        write: None,
        encoding: Encoding::Float,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    Torque,
    Current,
    Impedance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    Control,
    Interaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibratorCommand {
    Available,
    Calibrate(JointSelector),
    Homing(JointSelector),
    Park { target: JointSelector, wait: bool },
    QuitCalibrate,
    QuitPark,
}

#[derive(Clone)]
pub enum ModernCommand {
    Joint(JointCall),
    Range(RangeKind, i64),
    GetMotorTorqueParams(i64),
    SetMotorTorqueParams(i64, MotorTorqueParams),
    GetModes(ModeKind, JointSelector),
    SetModes(ModeKind, JointSelector, Vec<Tag>),
    GetImpedance(i64),
    SetImpedance(i64, ImpedanceParams),
    GetImpedanceOffset(i64),
    SetImpedanceOffset(i64, f64),
    ProtocolVersion,
    Calibrator(CalibratorCommand),
    VariableKeys,
    GetVariable(String),
    SetVariable(String, Vec<Value>),
    Pid(PidCommand),
}

fn unknown(opcode: Tag, action: Tag) -> ProtocolError {
    ProtocolError::UnknownAction {
        scope: opcode,
        action,
    }
}

pub fn parse(opcode: Tag, interface: Tag, args: &Args<'_>) -> Result<ModernCommand, ProtocolError> {
    if opcode != SET && opcode != GET {
        return Err(ProtocolError::UnknownOpcode(opcode));
    }
    if interface == tags::PROTOCOL_VERSION {
        return if opcode == GET {
            Ok(ModernCommand::ProtocolVersion)
        } else {
            Err(unknown(opcode, interface))
        };
    }
    let action = args.tag(2)?;
    match interface {
        i if i == tags::TORQUE => parse_torque(opcode, action, args),
        i if i == tags::CURRENT => parse_current(opcode, action, args),
        i if i == tags::PWM => scalar(PWM_SCALARS, opcode, action, args),
        i if i == tags::CONTROL_MODE => parse_modes(ModeKind::Control, opcode, action, args),
        i if i == tags::INTERACTION_MODE => {
            parse_modes(ModeKind::Interaction, opcode, action, args)
        }
        i if i == tags::IMPEDANCE => parse_impedance(opcode, action, args),
        i if i == tags::REMOTE_CALIBRATOR => {
            parse_calibrator(opcode, action, args).map(ModernCommand::Calibrator)
        }
        i if i == tags::REMOTE_VARIABLES => parse_variables(opcode, action, args),
        i if i == tags::PID => pid::parse(opcode, action, args, ARGS).map(ModernCommand::Pid),
        _ => Err(unknown(opcode, interface)),
    }
}

fn scalar(
    table: &'static [ScalarOp],
    opcode: Tag,
    action: Tag,
    args: &Args<'_>,
) -> Result<ModernCommand, ProtocolError> {
    let (op, scope) = ScalarOp::find(table, action).ok_or(unknown(opcode, action))?;
    op.parse(scope, opcode, action, args, ARGS)
        .map(ModernCommand::Joint)
}

fn parse_torque(opcode: Tag, action: Tag, args: &Args<'_>) -> Result<ModernCommand, ProtocolError> {
    match action {
        a if a == tags::RANGE && opcode == GET => {
            Ok(ModernCommand::Range(RangeKind::Torque, args.joint(ARGS)?))
        }
        a if a == tags::MOTOR_TORQUE_PARAMS && opcode == GET => {
            Ok(ModernCommand::GetMotorTorqueParams(args.joint(ARGS)?))
        }
        a if a == tags::MOTOR_TORQUE_PARAMS => Ok(ModernCommand::SetMotorTorqueParams(
            args.joint(ARGS)?,
            MotorTorqueParams {
                bemf: args.float(ARGS + 1)?,
                bemf_scale: args.float(ARGS + 2)?,
                ktau: args.float(ARGS + 3)?,
                ktau_scale: args.float(ARGS + 4)?,
            },
        )),
        _ => scalar(TORQUE_SCALARS, opcode, action, args),
    }
}

fn parse_current(opcode: Tag, action: Tag, args: &Args<'_>) -> Result<ModernCommand, ProtocolError> {
    if action == tags::RANGE && opcode == GET {
        return Ok(ModernCommand::Range(RangeKind::Current, args.joint(ARGS)?));
    }
    scalar(CURRENT_SCALARS, opcode, action, args)
}

fn parse_modes(
    kind: ModeKind,
    opcode: Tag,
    action: Tag,
    args: &Args<'_>,
) -> Result<ModernCommand, ProtocolError> {
    let scope = tags::MODE.scope(action).ok_or(unknown(opcode, action))?;
    let (target, next) = selector(scope, args, ARGS)?;
    if opcode == GET {
        Ok(ModernCommand::GetModes(kind, target))
    } else {
        let modes = grammar::tags(scope, args, next)?;
        Ok(ModernCommand::SetModes(kind, target, modes))
    }
}

fn parse_impedance(
    opcode: Tag,
    action: Tag,
    args: &Args<'_>,
) -> Result<ModernCommand, ProtocolError> {
    let joint = args.joint(ARGS)?;
    match (action, opcode == GET) {
        (a, true) if a == tags::IMPEDANCE_PARAMS => Ok(ModernCommand::GetImpedance(joint)),
        (a, false) if a == tags::IMPEDANCE_PARAMS => Ok(ModernCommand::SetImpedance(
            joint,
            ImpedanceParams {
                stiffness: args.float(ARGS + 1)?,
                damping: args.float(ARGS + 2)?,
            },
        )),
        (a, true) if a == tags::IMPEDANCE_OFFSET => Ok(ModernCommand::GetImpedanceOffset(joint)),
        (a, false) if a == tags::IMPEDANCE_OFFSET => Ok(ModernCommand::SetImpedanceOffset(
            joint,
            args.float(ARGS + 1)?,
        )),
        (a, true) if a == tags::RANGE => Ok(ModernCommand::Range(RangeKind::Impedance, joint)),
        _ => Err(unknown(opcode, action)),
    }
}

fn parse_calibrator(
    opcode: Tag,
    action: Tag,
    args: &Args<'_>,
) -> Result<CalibratorCommand, ProtocolError> {
    if opcode == GET {
        return if action == tags::AVAILABLE {
            Ok(CalibratorCommand::Available)
        } else {
            Err(unknown(opcode, action))
        };
    }
    if action == tags::QUIT_CALIBRATE {
        return Ok(CalibratorCommand::QuitCalibrate);
    }
    if action == tags::QUIT_PARK {
        return Ok(CalibratorCommand::QuitPark);
    }
    if let Some(scope) = tags::CALIBRATE.scope(action) {
        return Ok(CalibratorCommand::Calibrate(selector(scope, args, ARGS)?.0));
    }
    if let Some(scope) = tags::HOMING.scope(action) {
        return Ok(CalibratorCommand::Homing(selector(scope, args, ARGS)?.0));
    }
    if let Some(scope) = tags::PARK.scope(action) {
        let (target, next) = selector(scope, args, ARGS)?;
        // Single-joint park carries a wait flag; whole-part and group parks wait.
        let wait = match scope {
            Scope::One => args.int(next)? != 0,
            Scope::All | Scope::Group => true,
        };
        return Ok(CalibratorCommand::Park { target, wait });
    }
    Err(unknown(opcode, action))
}

fn parse_variables(
    opcode: Tag,
    action: Tag,
    args: &Args<'_>,
) -> Result<ModernCommand, ProtocolError> {
    match (action, opcode == GET) {
        (a, true) if a == tags::VARIABLE_KEYS => Ok(ModernCommand::VariableKeys),
        (a, true) if a == tags::VARIABLE => {
            Ok(ModernCommand::GetVariable(args.text(ARGS)?.to_string()))
        }
        (a, false) if a == tags::VARIABLE => Ok(ModernCommand::SetVariable(
            args.text(ARGS)?.to_string(),
            args.list(ARGS + 1)?.to_vec(),
        )),
        _ => Err(unknown(opcode, action)),
    }
}

impl ModernCommand {
    pub fn execute(&self, view: &BoardView<'_>, out: &mut Vec<Value>) -> CallResult<()> {
        match self {
            ModernCommand::Joint(call) => call.execute(view, out)?,
            ModernCommand::Range(kind, joint) => {
                let values = view.on_joint(*joint, |caps, axis| {
                    Ok(match kind {
                        RangeKind::Torque => {
                            let (min, max) = caps.torque()?.torque_range(axis)?;
                            vec![min, max]
                        }
                        RangeKind::Current => {
                            let (min, max) = caps.current()?.current_range(axis)?;
                            vec![min, max]
                        }
                        RangeKind::Impedance => {
                            let r = caps.impedance()?.impedance_range(axis)?;
                            vec![r.min_stiffness, r.max_stiffness, r.min_damping, r.max_damping]
                        }
                    })
                })?;
                out.extend(values.into_iter().map(Value::Float));
            }
            ModernCommand::GetMotorTorqueParams(joint) => {
                let p = view.on_joint(*joint, |caps, axis| {
                    Ok(caps.torque()?.motor_torque_params(axis)?)
                })?;
                out.extend([p.bemf, p.bemf_scale, p.ktau, p.ktau_scale].map(Value::Float));
            }
            ModernCommand::SetMotorTorqueParams(joint, params) => {
                view.on_joint(*joint, |caps, axis| {
                    Ok(caps.torque()?.set_motor_torque_params(axis, *params)?)
                })?
            }
            ModernCommand::GetModes(ModeKind::Control, target) => {
                let modes = view.read(target, |caps, axes, lane: &mut [ControlMode]| {
                    Ok(caps.control_mode()?.control_mode_group(axes, lane)?)
                })?;
                out.push(reply(target, modes, |m| Value::Tag(m.0)));
            }
            ModernCommand::GetModes(ModeKind::Interaction, target) => {
                let modes = view.read(target, |caps, axes, lane: &mut [InteractionMode]| {
                    Ok(caps.interaction_mode()?.interaction_mode_group(axes, lane)?)
                })?;
                out.push(reply(target, modes, |m| Value::Tag(m.0)));
            }
            ModernCommand::SetModes(ModeKind::Control, target, modes) => {
                let modes: Vec<ControlMode> = modes.iter().copied().map(ControlMode).collect();
                view.write(target, &modes, |caps, axes, lane| {
                    Ok(caps.control_mode()?.set_control_mode_group(axes, lane)?)
                })?
            }
            ModernCommand::SetModes(ModeKind::Interaction, target, modes) => {
                let modes: Vec<InteractionMode> =
                    modes.iter().copied().map(InteractionMode).collect();
                view.write(target, &modes, |caps, axes, lane| {
                    Ok(caps.interaction_mode()?.set_interaction_mode_group(axes, lane)?)
                })?
            }
            ModernCommand::GetImpedance(joint) => {
                let p = view.on_joint(*joint, |caps, axis| Ok(caps.impedance()?.impedance(axis)?))?;
                out.extend([Value::Float(p.stiffness), Value::Float(p.damping)]);
            }
            ModernCommand::SetImpedance(joint, params) => view.on_joint(*joint, |caps, axis| {
                Ok(caps.impedance()?.set_impedance(axis, *params)?)
            })?,
            ModernCommand::GetImpedanceOffset(joint) => {
                let offset = view.on_joint(*joint, |caps, axis| {
                    Ok(caps.impedance()?.impedance_offset(axis)?)
                })?;
                out.push(Value::Float(offset));
            }
            ModernCommand::SetImpedanceOffset(joint, offset) => {
                view.on_joint(*joint, |caps, axis| {
                    Ok(caps.impedance()?.set_impedance_offset(axis, *offset)?)
                })?
            }
            ModernCommand::ProtocolVersion => {
                let (major, minor, tweak) = tags::PROTOCOL_VERSION_NUMBER;
                out.extend([Value::Int(major), Value::Int(minor), Value::Int(tweak)]);
            }
            ModernCommand::Calibrator(command) => command.execute(view, out)?,
            ModernCommand::VariableKeys => {
                let keys = first_variables(view)?.keys()?;
                out.push(Value::List(keys.into_iter().map(Value::Text).collect()));
            }
            ModernCommand::GetVariable(key) => {
                out.push(Value::List(first_variables(view)?.variable(key)?));
            }
            ModernCommand::SetVariable(key, value) => {
                first_variables(view)?.set_variable(key, value)?
            }
            ModernCommand::Pid(command) => command.execute(view, out)?,
        }
        Ok(())
    }
}

/// Remote variables are not joint-indexed; they live on the first subdevice.
fn first_variables<'a>(view: &BoardView<'a>) -> CallResult<&'a dyn RemoteVariables> {
    view.on_joint(0, |caps, _| Ok(caps.remote_variables()?))
}

/// Validate logical joints through the registry before handing them to the
/// part-level calibrator.
fn logical_joints(view: &BoardView<'_>, target: &JointSelector) -> CallResult<Vec<usize>> {
    let joints: Vec<i64> = match target {
        JointSelector::One(joint) => vec![*joint],
        JointSelector::List(joints) => joints.clone(),
        JointSelector::All => (0..view.joints() as i64).collect(),
    };
    joints
        .into_iter()
        .map(|joint| -> CallResult<usize> {
            view.registry().lookup(joint)?;
            Ok(joint as usize)
        })
        .collect()
}

impl CalibratorCommand {
    fn execute(&self, view: &BoardView<'_>, out: &mut Vec<Value>) -> CallResult<()> {
        if *self == CalibratorCommand::Available {
            let available = view
                .calibrator()
                .map(|c| c.is_available())
                .unwrap_or(false);
            out.push(Value::from(available));
            return Ok(());
        }
        let calibrator = view.calibrator()?;
        match self {
            CalibratorCommand::Available => {}
            CalibratorCommand::Calibrate(JointSelector::All) => calibrator.calibrate_whole_part()?,
            CalibratorCommand::Calibrate(target) => {
                for joint in logical_joints(view, target)? {
                    calibrator.calibrate_joint(joint)?;
                }
            }
            CalibratorCommand::Homing(JointSelector::All) => calibrator.homing_whole_part()?,
            CalibratorCommand::Homing(target) => {
                for joint in logical_joints(view, target)? {
                    calibrator.homing_joint(joint)?;
                }
            }
            CalibratorCommand::Park {
                target: JointSelector::All,
                ..
            } => calibrator.park_whole_part()?,
            CalibratorCommand::Park { target, wait } => {
                for joint in logical_joints(view, target)? {
                    calibrator.park_joint(joint, *wait)?;
                }
            }
            CalibratorCommand::QuitCalibrate => calibrator.quit_calibrate()?,
            CalibratorCommand::QuitPark => calibrator.quit_park()?,
        }
        Ok(())
    }
}
