//! Legacy framing: `[opcode, action, args..]` with no interface tag.
//!
//! `set`/`get` select a joint-level action at position 1; the calibration
//! opcodes take their arguments directly.

use super::grammar::{each_axis, each_get, each_set, selector, Action, Encoding, JointCall, ScalarOp};
use super::tags::{self, Family, GET, SET};
use super::{Args, Value};
use crate::board::BoardView;
use crate::capabilities::Capability;
use crate::error::{CallResult, CapabilityUnavailable, ProtocolError};
use crate::types::CalibrationParameters;
use crate::Tag;

const FLOAT: Encoding = Encoding::Float;

static SCALARS: &[ScalarOp] = &[
    ScalarOp {
        family: tags::POSITION,
        read: Some(|c, a, o| Ok(c.position()?.target_position_group(a, o)?)),
        write: Some(|c, a, v| Ok(c.position()?.position_move_group(a, v)?)),
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::RELATIVE,
        read: None,
        write: Some(|c, a, v| Ok(c.position()?.relative_move_group(a, v)?)),
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::POSITION_DIRECT,
        read: Some(|c, a, o| Ok(c.position_direct()?.ref_position_group(a, o)?)),
        write: Some(|c, a, v| Ok(c.position_direct()?.set_position_group(a, v)?)),
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::VELOCITY_MOVE,
        read: Some(|c, a, o| Ok(c.velocity()?.ref_velocity_group(a, o)?)),
        write: Some(|c, a, v| Ok(c.velocity()?.velocity_move_group(a, v)?)),
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::REF_SPEED,
        read: Some(|c, a, o| Ok(c.position()?.ref_speed_group(a, o)?)),
        write: Some(|c, a, v| Ok(c.position()?.set_ref_speed_group(a, v)?)),
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::REF_ACCELERATION,
        read: Some(|c, a, o| Ok(c.position()?.ref_acceleration_group(a, o)?)),
        write: Some(|c, a, v| Ok(c.position()?.set_ref_acceleration_group(a, v)?)),
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::ENCODER,
        read: Some(|c, a, o| Ok(c.encoders()?.encoder_group(a, o)?)),
        write: Some(|c, a, v| {
            let enc = c.encoders()?;
            each_set(a, v, |axis, value| enc.set_encoder(axis, value))
        }),
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::ENCODER_SPEED,
        read: Some(|c, a, o| Ok(c.encoders()?.encoder_speed_group(a, o)?)),
        write: None,
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::ENCODER_ACCELERATION,
        read: Some(|c, a, o| Ok(c.encoders()?.encoder_acceleration_group(a, o)?)),
        write: None,
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::MOTOR_ENCODER,
        read: Some(|c, a, o| Ok(c.motor_encoders()?.motor_encoder_group(a, o)?)),
        write: Some(|c, a, v| {
            let enc = c.motor_encoders()?;
            each_set(a, v, |axis, value| enc.set_motor_encoder(axis, value))
        }),
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::MOTOR_ENCODER_SPEED,
        read: Some(|c, a, o| Ok(c.motor_encoders()?.motor_encoder_speed_group(a, o)?)),
        write: None,
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::MOTOR_ENCODER_ACCELERATION,
        read: Some(|c, a, o| Ok(c.motor_encoders()?.motor_encoder_acceleration_group(a, o)?)),
        write: None,
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::COUNTS_PER_REVOLUTION,
        read: Some(|c, a, o| {
            let enc = c.motor_encoders()?;
            each_get(a, o, |axis| enc.counts_per_revolution(axis))
        }),
        write: Some(|c, a, v| {
            let enc = c.motor_encoders()?;
            each_set(a, v, |axis, value| enc.set_counts_per_revolution(axis, value))
        }),
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::AMP_STATUS,
        read: Some(|c, a, o| {
            let amp = c.amplifier()?;
            each_get(a, o, |axis| amp.status(axis).map(f64::from))
        }),
        write: None,
        encoding: Encoding::Int,
    },
    ScalarOp {
        family: tags::AMP_MAX_CURRENT,
        read: Some(|c, a, o| {
            let amp = c.amplifier()?;
            each_get(a, o, |axis| amp.max_current(axis))
        }),
        write: Some(|c, a, v| {
            let amp = c.amplifier()?;
            each_set(a, v, |axis, value| amp.set_max_current(axis, value))
        }),
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::AMP_NOMINAL_CURRENT,
        read: Some(|c, a, o| {
            let amp = c.amplifier()?;
            each_get(a, o, |axis| amp.nominal_current(axis))
        }),
        write: Some(|c, a, v| {
            let amp = c.amplifier()?;
            each_set(a, v, |axis, value| amp.set_nominal_current(axis, value))
        }),
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::AMP_PEAK_CURRENT,
        read: Some(|c, a, o| {
            let amp = c.amplifier()?;
            each_get(a, o, |axis| amp.peak_current(axis))
        }),
        write: Some(|c, a, v| {
            let amp = c.amplifier()?;
            each_set(a, v, |axis, value| amp.set_peak_current(axis, value))
        }),
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::AMP_PWM_LIMIT,
        read: Some(|c, a, o| {
            let amp = c.amplifier()?;
            each_get(a, o, |axis| amp.pwm_limit(axis))
        }),
        write: Some(|c, a, v| {
            let amp = c.amplifier()?;
            each_set(a, v, |axis, value| amp.set_pwm_limit(axis, value))
        }),
        encoding: FLOAT,
    },
    ScalarOp {
        family: tags::AMP_SUPPLY_VOLTAGE,
        read: Some(|c, a, o| {
            let amp = c.amplifier()?;
            each_get(a, o, |axis| amp.supply_voltage(axis))
        }),
        write: None,
        encoding: FLOAT,
    },
];

/// Value-less `set` actions.
struct ActionOp {
    family: Family,
    action: Action,
}

static ACTIONS: &[ActionOp] = &[
    ActionOp {
        family: tags::STOP,
        action: |c, a| Ok(c.position()?.stop_group(a)?),
    },
    ActionOp {
        family: tags::ENCODER_RESET,
        action: |c, a| {
            let enc = c.encoders()?;
            each_axis(a, |axis| enc.reset_encoder(axis))
        },
    },
    ActionOp {
        family: tags::MOTOR_ENCODER_RESET,
        action: |c, a| {
            let enc = c.motor_encoders()?;
            each_axis(a, |axis| enc.reset_motor_encoder(axis))
        },
    },
    ActionOp {
        family: tags::AMP_ENABLE,
        action: |c, a| {
            let amp = c.amplifier()?;
            each_axis(a, |axis| amp.enable(axis))
        },
    },
    ActionOp {
        family: tags::AMP_DISABLE,
        action: |c, a| {
            let amp = c.amplifier()?;
            each_axis(a, |axis| amp.disable(axis))
        },
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Position,
    Velocity,
}

#[derive(Clone)]
pub enum LegacyCommand {
    Joint(JointCall),
    SetLimits {
        kind: LimitKind,
        joint: i64,
        min: f64,
        max: f64,
    },
    GetLimits {
        kind: LimitKind,
        joint: i64,
    },
    AxisName(i64),
    JointType(i64),
    Axes,
    MotorEncoderCount,
    LastInputStamp,
    CalibrateAxis {
        joint: i64,
        kind: i64,
        params: [f64; 3],
    },
    CalibrationParameters {
        joint: i64,
        params: CalibrationParameters,
    },
    CalibrationDone(i64),
    QuitCalibrate,
    QuitPark,
}

pub fn parse(opcode: Tag, args: &Args<'_>) -> Result<LegacyCommand, ProtocolError> {
    match opcode {
        op if op == tags::CALIBRATE_AXIS => Ok(LegacyCommand::CalibrateAxis {
            joint: args.joint(1)?,
            kind: args.int(2)?,
            params: [args.float(3)?, args.float(4)?, args.float(5)?],
        }),
        op if op == tags::CALIBRATION_PARAMS => {
            let mut params = [0.0; 5];
            for (i, p) in params.iter_mut().enumerate() {
                *p = args.float(3 + i)?;
            }
            Ok(LegacyCommand::CalibrationParameters {
                joint: args.joint(1)?,
                params: CalibrationParameters {
                    kind: args.int(2)?,
                    params,
                    param_zero: args.float(8)?,
                },
            })
        }
        op if op == tags::CALIBRATION_DONE => Ok(LegacyCommand::CalibrationDone(args.joint(1)?)),
        op if op == tags::ABORT_CALIBRATION => Ok(LegacyCommand::QuitCalibrate),
        op if op == tags::ABORT_PARK => Ok(LegacyCommand::QuitPark),
        op if op == SET || op == GET => parse_access(opcode, args.tag(1)?, args),
        _ => Err(ProtocolError::UnknownOpcode(opcode)),
    }
}

fn parse_access(opcode: Tag, action: Tag, args: &Args<'_>) -> Result<LegacyCommand, ProtocolError> {
    if let Some((op, scope)) = ScalarOp::find(SCALARS, action) {
        return op.parse(scope, opcode, action, args, 2).map(LegacyCommand::Joint);
    }
    if opcode == SET {
        if let Some((op, scope)) = ACTIONS
            .iter()
            .find_map(|op| op.family.scope(action).map(|scope| (op, scope)))
        {
            let (target, _) = selector(scope, args, 2)?;
            return Ok(LegacyCommand::Joint(JointCall::Act {
                action: op.action,
                target,
            }));
        }
    }
    if opcode == GET {
        if let Some(scope) = tags::MOTION_DONE.scope(action) {
            let (target, _) = selector(scope, args, 2)?;
            return Ok(LegacyCommand::Joint(JointCall::Check {
                predicate: |c, a| Ok(c.position()?.motion_done_group(a)?),
                target,
            }));
        }
    }

    let limit_kind = match action {
        a if a == tags::LIMITS => Some(LimitKind::Position),
        a if a == tags::VELOCITY_LIMITS => Some(LimitKind::Velocity),
        _ => None,
    };
    match (opcode == SET, limit_kind) {
        (true, Some(kind)) => {
            return Ok(LegacyCommand::SetLimits {
                kind,
                joint: args.joint(2)?,
                min: args.float(3)?,
                max: args.float(4)?,
            })
        }
        (false, Some(kind)) => {
            return Ok(LegacyCommand::GetLimits {
                kind,
                joint: args.joint(2)?,
            })
        }
        _ => {}
    }

    if opcode == GET {
        match action {
            a if a == tags::AXIS_NAME => return Ok(LegacyCommand::AxisName(args.joint(2)?)),
            a if a == tags::JOINT_TYPE => return Ok(LegacyCommand::JointType(args.joint(2)?)),
            a if a == tags::AXES => return Ok(LegacyCommand::Axes),
            a if a == tags::MOTOR_ENCODER_COUNT => return Ok(LegacyCommand::MotorEncoderCount),
            a if a == tags::LAST_INPUT_STAMP => return Ok(LegacyCommand::LastInputStamp),
            _ => {}
        }
    }
    Err(ProtocolError::UnknownAction {
        scope: opcode,
        action,
    })
}

impl LegacyCommand {
    pub fn execute(&self, view: &BoardView<'_>, reply: &mut Vec<Value>) -> CallResult<()> {
        match self {
            LegacyCommand::Joint(call) => call.execute(view, reply)?,
            LegacyCommand::SetLimits {
                kind,
                joint,
                min,
                max,
            } => view.on_joint(*joint, |caps, axis| {
                let limits = caps.limits()?;
                match kind {
                    LimitKind::Position => limits.set_limits(axis, *min, *max)?,
                    LimitKind::Velocity => limits.set_velocity_limits(axis, *min, *max)?,
                }
                Ok(())
            })?,
            LegacyCommand::GetLimits { kind, joint } => {
                let (min, max) = view.on_joint(*joint, |caps, axis| {
                    let limits = caps.limits()?;
                    Ok(match kind {
                        LimitKind::Position => limits.limits(axis)?,
                        LimitKind::Velocity => limits.velocity_limits(axis)?,
                    })
                })?;
                reply.extend([Value::Float(min), Value::Float(max)]);
            }
            LegacyCommand::AxisName(joint) => {
                let name = view.on_joint(*joint, |caps, axis| Ok(caps.axis_info()?.axis_name(axis)?))?;
                reply.push(Value::Text(name));
            }
            LegacyCommand::JointType(joint) => {
                let kind = view.on_joint(*joint, |caps, axis| Ok(caps.axis_info()?.joint_type(axis)?))?;
                reply.push(Value::Tag(kind.tag()));
            }
            LegacyCommand::Axes => reply.push(Value::Int(view.joints() as i64)),
            LegacyCommand::MotorEncoderCount => {
                view.each_slot(|slot| {
                    slot.capabilities().motor_encoders()?;
                    Ok(())
                })?;
                reply.push(Value::Int(view.joints() as i64));
            }
            LegacyCommand::LastInputStamp => {
                let (sequence, time) = last_input_stamp(view)?;
                reply.extend([Value::Int(sequence as i64), Value::Float(time)]);
            }
            LegacyCommand::CalibrateAxis {
                joint,
                kind,
                params: [p1, p2, p3],
            } => view.on_joint(*joint, |caps, axis| {
                Ok(caps
                    .calibration()?
                    .calibrate_axis(axis, *kind, *p1, *p2, *p3)?)
            })?,
            LegacyCommand::CalibrationParameters { joint, params } => {
                view.on_joint(*joint, |caps, axis| {
                    Ok(caps
                        .calibration()?
                        .set_calibration_parameters(axis, *params)?)
                })?
            }
            LegacyCommand::CalibrationDone(joint) => {
                let done = view.on_joint(*joint, |caps, axis| {
                    Ok(caps.calibration()?.calibration_done(axis)?)
                })?;
                reply.push(Value::from(done));
            }
            LegacyCommand::QuitCalibrate => view.calibrator()?.quit_calibrate()?,
            LegacyCommand::QuitPark => view.calibrator()?.quit_park()?,
        }
        Ok(())
    }
}

/// Latest input stamp across the subdevices that report one: highest
/// sequence, mean time.
fn last_input_stamp(view: &BoardView<'_>) -> CallResult<(u64, f64)> {
    let mut sequence = 0;
    let mut total = 0.0;
    let mut count = 0usize;
    view.each_slot(|slot| {
        if let Ok(timed) = slot.capabilities().precisely_timed() {
            let stamp = timed.last_input_stamp();
            sequence = sequence.max(stamp.sequence);
            total += stamp.time;
            count += 1;
        }
        Ok(())
    })?;
    if count == 0 {
        return Err(CapabilityUnavailable(Capability::PreciselyTimed).into());
    }
    Ok((sequence, total / count as f64))
}
