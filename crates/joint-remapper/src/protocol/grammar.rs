//! Argument grammar shared by both framings.
//!
//! Parsing produces a fully shape-checked call before anything touches a
//! subdevice; execution then only fails on lookup or device errors.

use super::tags::{Family, Scope, GET, SET};
use super::{Args, Value};
use crate::board::{BoardView, JointSelector};
use crate::capabilities::CapabilitySet;
use crate::error::{CallResult, DeviceError, ProtocolError};
use crate::Tag;

pub type Reader = fn(&CapabilitySet, &[usize], &mut [f64]) -> CallResult<()>;
pub type Writer = fn(&CapabilitySet, &[usize], &[f64]) -> CallResult<()>;
pub type Action = fn(&CapabilitySet, &[usize]) -> CallResult<()>;
pub type Predicate = fn(&CapabilitySet, &[usize]) -> CallResult<bool>;

/// Parse the joints addressed by `scope` starting at `at`. Returns the
/// selector and the position of the first argument after it.
pub fn selector(
    scope: Scope,
    args: &Args<'_>,
    at: usize,
) -> Result<(JointSelector, usize), ProtocolError> {
    match scope {
        Scope::One => Ok((JointSelector::One(args.joint(at)?), at + 1)),
        Scope::All => Ok((JointSelector::All, at)),
        Scope::Group => Ok((JointSelector::List(args.joint_group(at)?), at + 2)),
    }
}

/// One number for a single joint, a list otherwise.
pub fn numbers(scope: Scope, args: &Args<'_>, at: usize) -> Result<Vec<f64>, ProtocolError> {
    match scope {
        Scope::One => Ok(vec![args.float(at)?]),
        Scope::All | Scope::Group => args.floats(at),
    }
}

/// Tag-valued counterpart of [`numbers`].
pub fn tags(scope: Scope, args: &Args<'_>, at: usize) -> Result<Vec<Tag>, ProtocolError> {
    match scope {
        Scope::One => Ok(vec![args.tag(at)?]),
        Scope::All | Scope::Group => args.tags(at),
    }
}

/// A single-joint read answers with a bare value, the others with a list.
pub fn reply<T>(target: &JointSelector, values: Vec<T>, encode: impl Fn(T) -> Value) -> Value {
    let mut items: Vec<Value> = values.into_iter().map(encode).collect();
    match (target, items.len()) {
        (JointSelector::One(_), 1) => items.remove(0),
        _ => Value::List(items),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Float,
    Int,
}

impl Encoding {
    fn encode(self, value: f64) -> Value {
        match self {
            Encoding::Float => Value::Float(value),
            Encoding::Int => Value::Int(value as i64),
        }
    }
}

/// One numeric per-joint quantity and how to read and write it.
pub struct ScalarOp {
    pub family: Family,
    pub read: Option<Reader>,
    pub write: Option<Writer>,
    pub encoding: Encoding,
}

impl ScalarOp {
    pub fn find(table: &'static [ScalarOp], action: Tag) -> Option<(&'static ScalarOp, Scope)> {
        table
            .iter()
            .find_map(|op| op.family.scope(action).map(|scope| (op, scope)))
    }

    /// Parse `opcode` applied to this quantity; arguments start at `at`.
    pub fn parse(
        &self,
        scope: Scope,
        opcode: Tag,
        action: Tag,
        args: &Args<'_>,
        at: usize,
    ) -> Result<JointCall, ProtocolError> {
        let (target, next) = selector(scope, args, at)?;
        match (opcode, self.read, self.write) {
            (op, Some(read), _) if op == GET => Ok(JointCall::Read {
                read,
                encoding: self.encoding,
                target,
            }),
            (op, _, Some(write)) if op == SET => Ok(JointCall::Write {
                write,
                values: numbers(scope, args, next)?,
                target,
            }),
            _ => Err(ProtocolError::UnknownAction {
                scope: opcode,
                action,
            }),
        }
    }
}

/// A parsed per-joint call.
#[derive(Clone)]
pub enum JointCall {
    Read {
        read: Reader,
        encoding: Encoding,
        target: JointSelector,
    },
    Write {
        write: Writer,
        target: JointSelector,
        values: Vec<f64>,
    },
    Act {
        action: Action,
        target: JointSelector,
    },
    Check {
        predicate: Predicate,
        target: JointSelector,
    },
}

impl JointCall {
    pub fn execute(&self, view: &BoardView<'_>, reply_to: &mut Vec<Value>) -> CallResult<()> {
        match self {
            JointCall::Read {
                read,
                encoding,
                target,
            } => {
                let values = view.read(target, *read)?;
                reply_to.push(reply(target, values, |v| encoding.encode(v)));
            }
            JointCall::Write {
                write,
                target,
                values,
            } => view.write(target, values, *write)?,
            JointCall::Act { action, target } => view.act(target, *action)?,
            JointCall::Check { predicate, target } => {
                reply_to.push(Value::from(view.check(target, *predicate)?));
            }
        }
        Ok(())
    }
}

/// Apply `f` to each `(axis, value)` pair.
pub fn each_set(
    axes: &[usize],
    values: &[f64],
    mut f: impl FnMut(usize, f64) -> Result<(), DeviceError>,
) -> CallResult<()> {
    for (axis, value) in axes.iter().zip(values) {
        f(*axis, *value)?;
    }
    Ok(())
}

pub fn each_axis(
    axes: &[usize],
    mut f: impl FnMut(usize) -> Result<(), DeviceError>,
) -> CallResult<()> {
    for axis in axes {
        f(*axis)?;
    }
    Ok(())
}

/// Fill `out` with `f(axis)` per axis.
pub fn each_get(
    axes: &[usize],
    out: &mut [f64],
    mut f: impl FnMut(usize) -> Result<f64, DeviceError>,
) -> CallResult<()> {
    for (axis, slot) in axes.iter().zip(out.iter_mut()) {
        *slot = f(*axis)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_positions() {
        let items = vec![
            Value::Int(2),
            Value::List(vec![Value::Int(3), Value::Int(0)]),
            Value::List(vec![Value::Float(1.0), Value::Float(2.0)]),
        ];
        let args = Args::new(&items);
        let (sel, next) = selector(Scope::Group, &args, 0).unwrap();
        assert_eq!(sel, JointSelector::List(vec![3, 0]));
        assert_eq!(numbers(Scope::Group, &args, next).unwrap(), vec![1.0, 2.0]);

        let (sel, next) = selector(Scope::One, &args, 0).unwrap();
        assert_eq!((sel, next), (JointSelector::One(2), 1));
        assert!(numbers(Scope::One, &args, next).is_err());
    }

    #[test]
    fn test_single_joint_reply_is_bare() {
        let one = reply(&JointSelector::One(0), vec![1.5], Value::Float);
        assert_eq!(one, Value::Float(1.5));
        let all = reply(&JointSelector::All, vec![1.5], Value::Float);
        assert_eq!(all, Value::List(vec![Value::Float(1.5)]));
    }
}
