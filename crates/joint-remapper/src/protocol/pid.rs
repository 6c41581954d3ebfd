//! PID interface: `[opcode, pid, action, kind, args..]`.

use super::grammar::{each_get, each_set, numbers, reply, selector};
use super::tags::{self, Family, Scope, GET};
use super::{Args, Value};
use crate::board::{BoardView, JointSelector};
use crate::error::{CallError, CallResult, ProtocolError};
use crate::types::{Pid, PidKind};
use crate::Tag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidQuantity {
    Reference,
    ErrorLimit,
    Error,
    Output,
}

const QUANTITIES: [(Family, PidQuantity, bool); 4] = [
    (tags::PID_REFERENCE, PidQuantity::Reference, true),
    (tags::PID_ERROR_LIMIT, PidQuantity::ErrorLimit, true),
    (tags::PID_ERROR, PidQuantity::Error, false),
    (tags::PID_OUTPUT, PidQuantity::Output, false),
];

#[derive(Debug, Clone, PartialEq)]
pub enum PidCall {
    GetParams(JointSelector),
    SetParams(JointSelector, Vec<Pid>),
    Read(PidQuantity, JointSelector),
    Write(PidQuantity, JointSelector, Vec<f64>),
    SetOffset(i64, f64),
    Enable(i64),
    Disable(i64),
    Reset(i64),
    IsEnabled(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PidCommand {
    pub kind: PidKind,
    pub call: PidCall,
}

pub fn parse(
    opcode: Tag,
    action: Tag,
    args: &Args<'_>,
    at: usize,
) -> Result<PidCommand, ProtocolError> {
    let kind = PidKind::from_tag(args.tag(at)?).ok_or(ProtocolError::shape(at, "a PID kind"))?;
    let call = parse_call(opcode, action, args, at + 1)?;
    Ok(PidCommand { kind, call })
}

fn parse_call(opcode: Tag, action: Tag, args: &Args<'_>, at: usize) -> Result<PidCall, ProtocolError> {
    let get = opcode == GET;
    if let Some(scope) = tags::PID_PARAMS.scope(action) {
        let (target, next) = selector(scope, args, at)?;
        return if get {
            Ok(PidCall::GetParams(target))
        } else {
            Ok(PidCall::SetParams(target, records(scope, args, next)?))
        };
    }
    for (family, quantity, writable) in QUANTITIES {
        if let Some(scope) = family.scope(action) {
            let (target, next) = selector(scope, args, at)?;
            if get {
                return Ok(PidCall::Read(quantity, target));
            }
            if writable {
                return Ok(PidCall::Write(quantity, target, numbers(scope, args, next)?));
            }
        }
    }
    match (action, get) {
        (a, false) if a == tags::PID_OFFSET => {
            Ok(PidCall::SetOffset(args.joint(at)?, args.float(at + 1)?))
        }
        (a, false) if a == tags::PID_ENABLE => Ok(PidCall::Enable(args.joint(at)?)),
        (a, false) if a == tags::PID_DISABLE => Ok(PidCall::Disable(args.joint(at)?)),
        (a, false) if a == tags::PID_RESET => Ok(PidCall::Reset(args.joint(at)?)),
        (a, true) if a == tags::PID_ENABLED => Ok(PidCall::IsEnabled(args.joint(at)?)),
        _ => Err(ProtocolError::UnknownAction {
            scope: opcode,
            action,
        }),
    }
}

fn record(items: &[Value], at: usize) -> Result<Pid, ProtocolError> {
    items
        .iter()
        .map(Value::as_float)
        .collect::<Option<Vec<f64>>>()
        .and_then(|values| Pid::from_values(&values))
        .ok_or(ProtocolError::shape(at, "a 10-field PID record"))
}

/// One record for a single joint, a list of records otherwise.
fn records(scope: Scope, args: &Args<'_>, at: usize) -> Result<Vec<Pid>, ProtocolError> {
    let items = args.list(at)?;
    match scope {
        Scope::One => Ok(vec![record(items, at)?]),
        Scope::All | Scope::Group => items
            .iter()
            .map(|item| {
                item.as_list()
                    .ok_or(ProtocolError::shape(at, "a list of PID records"))
                    .and_then(|fields| record(fields, at))
            })
            .collect(),
    }
}

/// Every joint of `target`, each resolved through the registry so a bad
/// index fails before any subdevice is touched.
fn joints_of(view: &BoardView<'_>, target: &JointSelector) -> CallResult<Vec<i64>> {
    let joints: Vec<i64> = match target {
        JointSelector::One(joint) => vec![*joint],
        JointSelector::List(joints) => joints.clone(),
        JointSelector::All => (0..view.joints() as i64).collect(),
    };
    for joint in &joints {
        view.registry().lookup(*joint)?;
    }
    Ok(joints)
}

impl PidCommand {
    pub fn execute(&self, view: &BoardView<'_>, out: &mut Vec<Value>) -> CallResult<()> {
        let kind = self.kind;
        match &self.call {
            PidCall::GetParams(target) => {
                let mut pids = Vec::new();
                for joint in joints_of(view, target)? {
                    pids.push(view.on_joint(joint, |caps, axis| Ok(caps.pid()?.pid(kind, axis)?))?);
                }
                out.push(reply(target, pids, |p| Value::floats(&p.to_values())));
            }
            PidCall::SetParams(target, pids) => {
                let joints = joints_of(view, target)?;
                if joints.len() != pids.len() {
                    return Err(CallError::LengthMismatch {
                        joints: joints.len(),
                        values: pids.len(),
                    });
                }
                for (joint, pid) in joints.into_iter().zip(pids) {
                    view.on_joint(joint, |caps, axis| Ok(caps.pid()?.set_pid(kind, axis, *pid)?))?;
                }
            }
            PidCall::Read(quantity, target) => {
                let quantity = *quantity;
                let values = view.read(target, |caps, axes, lane: &mut [f64]| {
                    let pid = caps.pid()?;
                    each_get(axes, lane, |axis| match quantity {
                        PidQuantity::Reference => pid.reference(kind, axis),
                        PidQuantity::ErrorLimit => pid.error_limit(kind, axis),
                        PidQuantity::Error => pid.error(kind, axis),
                        PidQuantity::Output => pid.output(kind, axis),
                    })
                })?;
                out.push(reply(target, values, Value::Float));
            }
            PidCall::Write(quantity, target, values) => {
                let quantity = *quantity;
                view.write(target, values, |caps, axes, lane| {
                    let pid = caps.pid()?;
                    each_set(axes, lane, |axis, value| match quantity {
                        PidQuantity::ErrorLimit => pid.set_error_limit(kind, axis, value),
                        _ => pid.set_reference(kind, axis, value),
                    })
                })?;
            }
            PidCall::SetOffset(joint, value) => view.on_joint(*joint, |caps, axis| {
                Ok(caps.pid()?.set_offset(kind, axis, *value)?)
            })?,
            PidCall::Enable(joint) => {
                view.on_joint(*joint, |caps, axis| Ok(caps.pid()?.enable_pid(kind, axis)?))?
            }
            PidCall::Disable(joint) => {
                view.on_joint(*joint, |caps, axis| Ok(caps.pid()?.disable_pid(kind, axis)?))?
            }
            PidCall::Reset(joint) => {
                view.on_joint(*joint, |caps, axis| Ok(caps.pid()?.reset_pid(kind, axis)?))?
            }
            PidCall::IsEnabled(joint) => {
                let enabled = view.on_joint(*joint, |caps, axis| {
                    Ok(caps.pid()?.is_pid_enabled(kind, axis)?)
                })?;
                out.push(Value::from(enabled));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(items: Vec<Value>) -> Vec<Value> {
        let mut full = vec![
            Value::Tag(tags::SET),
            Value::Tag(tags::PID),
            Value::Tag(Tag::new("pid")),
        ];
        full.extend(items);
        full
    }

    #[test]
    fn test_record_must_have_ten_fields() {
        let nine = Value::floats(&[1.0; 9]);
        let items = request(vec![Value::Tag(Tag::new("pidp")), Value::Int(0), nine]);
        let err = parse(tags::SET, Tag::new("pid"), &Args::new(&items), 3).unwrap_err();
        assert!(matches!(err, ProtocolError::Shape { position: 5, .. }));

        let ten = Value::floats(&[1.0; 10]);
        let items = request(vec![Value::Tag(Tag::new("pidv")), Value::Int(2), ten]);
        let cmd = parse(tags::SET, Tag::new("pid"), &Args::new(&items), 3).unwrap();
        assert_eq!(cmd.kind, PidKind::Velocity);
        assert!(matches!(cmd.call, PidCall::SetParams(JointSelector::One(2), ref p) if p.len() == 1));
    }

    #[test]
    fn test_unknown_kind_is_shape_error() {
        let items = request(vec![Value::Tag(Tag::new("pidx")), Value::Int(0)]);
        assert!(matches!(
            parse(tags::GET, Tag::new("pid"), &Args::new(&items), 3),
            Err(ProtocolError::Shape { position: 3, .. })
        ));
    }

    #[test]
    fn test_measured_quantities_are_read_only() {
        let items = request(vec![Value::Tag(Tag::new("pidp")), Value::Int(0), Value::Float(1.0)]);
        assert!(matches!(
            parse(tags::SET, Tag::new("out"), &Args::new(&items), 3),
            Err(ProtocolError::UnknownAction { .. })
        ));
    }
}
