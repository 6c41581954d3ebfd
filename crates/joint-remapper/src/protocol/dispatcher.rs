use super::legacy::{self, LegacyCommand};
use super::modern::{self, ModernCommand};
use super::tags::{self, GET};
use super::{Args, Value};
use crate::board::BoardView;
use crate::error::{CallError, CallResult, ProtocolError};
use crate::types::{now_seconds, Stamp};
use crate::Tag;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Failed,
}

impl Status {
    pub fn tag(self) -> Tag {
        match self {
            Status::Ok => tags::OK,
            Status::Failed => tags::FAIL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub payload: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stamp: Option<Stamp>,
}

impl Response {
    pub fn ok(payload: Vec<Value>, stamp: Option<Stamp>) -> Self {
        Self {
            status: Status::Ok,
            payload,
            stamp,
        }
    }

    /// Bare failure: diagnostics only go to the log.
    pub fn failed() -> Self {
        Self {
            status: Status::Failed,
            payload: Vec::new(),
            stamp: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Status tag followed by the payload, as sent on the wire.
    pub fn to_values(&self) -> Vec<Value> {
        let mut values = Vec::with_capacity(self.payload.len() + 1);
        values.push(Value::Tag(self.status.tag()));
        values.extend(self.payload.iter().cloned());
        values
    }
}

/// A request after framing detection and shape validation.
#[derive(Clone)]
pub enum Command {
    Legacy(LegacyCommand),
    Modern(ModernCommand),
}

impl Command {
    /// Modern framing wins when position 1 names a known interface;
    /// everything else is parsed as legacy.
    pub fn parse(request: &[Value]) -> Result<(Tag, Command), ProtocolError> {
        let args = Args::new(request);
        if args.is_empty() {
            return Err(ProtocolError::Empty);
        }
        let opcode = args.tag(0)?;
        let interface = args
            .value(1)
            .ok()
            .and_then(Value::as_tag)
            .filter(|tag| tags::is_interface(*tag));
        let command = match interface {
            Some(interface) => Command::Modern(modern::parse(opcode, interface, &args)?),
            None => Command::Legacy(legacy::parse(opcode, &args)?),
        };
        Ok((opcode, command))
    }

    pub fn execute(&self, view: &BoardView<'_>, payload: &mut Vec<Value>) -> CallResult<()> {
        match self {
            Command::Legacy(command) => command.execute(view, payload),
            Command::Modern(command) => command.execute(view, payload),
        }
    }
}

/// Request/response handler. One request at a time per instance; the RPC
/// stamp is separate from the periodic publication stamp.
#[derive(Debug, Default)]
pub struct Dispatcher {
    stamp: Mutex<Stamp>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, view: &BoardView<'_>, request: &[Value]) -> Response {
        match self.try_handle(view, request) {
            Ok((opcode, payload)) => {
                let stamp = (opcode == GET).then(|| self.next_stamp());
                Response::ok(payload, stamp)
            }
            Err(err) => {
                log_failure(request, &err);
                Response::failed()
            }
        }
    }

    fn try_handle(&self, view: &BoardView<'_>, request: &[Value]) -> CallResult<(Tag, Vec<Value>)> {
        let (opcode, command) = Command::parse(request)?;
        let mut payload = Vec::new();
        command.execute(view, &mut payload)?;
        Ok((opcode, payload))
    }

    fn next_stamp(&self) -> Stamp {
        self.stamp
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .advance(now_seconds())
    }

    /// Last stamp handed out with a `get` reply.
    pub fn last_stamp(&self) -> Stamp {
        *self.stamp.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_failure(request: &[Value], err: &CallError) {
    let opcode = request.first().and_then(Value::as_tag);
    match err {
        CallError::Unavailable(e) => debug!(?opcode, "rpc rejected: {e}"),
        CallError::Protocol(e) if e.is_unrecognized() => {
            warn!(?opcode, "unrecognized rpc: {e}")
        }
        CallError::Protocol(e) => warn!(?opcode, "malformed rpc: {e}"),
        other => warn!(?opcode, "rpc failed: {other}"),
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::batch::BatchEngine;
    use crate::capabilities::{Capability, CapabilitySet};
    use crate::mock::{MockCalibrator, MockController};
    use crate::registry::{RangeSpec, SubDeviceLayout, SubDeviceRegistry};
    use crate::types::ControlMode;
    use std::sync::Arc;

    struct Rig {
        registry: SubDeviceRegistry,
        batch: BatchEngine,
        calibrator: MockCalibrator,
        dispatcher: Dispatcher,
        a: Arc<MockController>,
        b: Arc<MockController>,
    }

    impl Rig {
        fn new() -> Self {
            let mut registry = SubDeviceRegistry::configure(
                6,
                SubDeviceLayout::Explicit(vec![
                    RangeSpec::new("A", (0, 2), (0, 2)),
                    RangeSpec::new("B", (3, 5), (0, 2)),
                ]),
            )
            .unwrap();
            let a = Arc::new(MockController::new(3));
            let b = Arc::new(MockController::new(3));
            registry
                .attach("A", CapabilitySet::from_device(a.clone()))
                .unwrap();
            registry
                .attach(
                    "B",
                    CapabilitySet::from_device(b.clone()).without(Capability::MotorEncoders),
                )
                .unwrap();
            let batch = BatchEngine::for_registry(&registry);
            Self {
                registry,
                batch,
                calibrator: MockCalibrator::new(),
                dispatcher: Dispatcher::new(),
                a,
                b,
            }
        }

        fn call(&self, request: Vec<Value>) -> Response {
            let view = BoardView::new(&self.registry, &self.batch, Some(&self.calibrator));
            self.dispatcher.handle(&view, &request)
        }
    }

    fn tag(text: &str) -> Value {
        Value::Tag(Tag::new(text))
    }

    fn ints(values: &[i64]) -> Value {
        Value::List(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_group_set_then_get_round_trip() {
        let rig = Rig::new();
        let joints = ints(&[4, 1, 5, 0]);
        let set = rig.call(vec![
            tag("set"),
            tag("posg"),
            Value::Int(4),
            joints.clone(),
            Value::floats(&[40.0, 10.0, 50.0, 0.5]),
        ]);
        assert!(set.is_ok());
        assert_eq!(set.stamp, None);

        let get = rig.call(vec![tag("get"), tag("encg"), Value::Int(4), joints]);
        assert!(get.is_ok());
        assert_eq!(get.payload, vec![Value::floats(&[40.0, 10.0, 50.0, 0.5])]);
        assert_eq!(rig.b.target(1), 40.0);
        assert_eq!(rig.a.target(0), 0.5);
    }

    #[test]
    fn test_get_stamps_increase() {
        let rig = Rig::new();
        let first = rig.call(vec![tag("get"), tag("axes")]);
        let second = rig.call(vec![tag("get"), tag("axes")]);
        assert_eq!(first.payload, vec![Value::Int(6)]);
        let (s1, s2) = (first.stamp.unwrap(), second.stamp.unwrap());
        assert!(s2.sequence > s1.sequence);
        assert_eq!(rig.dispatcher.last_stamp(), s2);
    }

    #[test]
    fn test_failures_are_bare() {
        let rig = Rig::new();
        let before = rig.a.calls() + rig.b.calls();
        for request in [
            vec![],
            vec![Value::Int(3)],
            vec![tag("zzz"), Value::Int(0)],
            vec![tag("get"), tag("nope"), Value::Int(0)],
            vec![tag("set"), tag("pos"), Value::Int(-1), Value::Float(1.0)],
            vec![tag("set"), tag("pos"), Value::Int(6), Value::Float(1.0)],
            vec![tag("set"), tag("posg"), Value::Int(2), ints(&[0])],
            vec![tag("set"), tag("torq"), tag("ref")],
        ] {
            let response = rig.call(request);
            assert_eq!(response, Response::failed());
        }
        assert_eq!(rig.a.calls() + rig.b.calls(), before);
    }

    #[test]
    fn test_missing_capability_fails_only_where_touched() {
        let rig = Rig::new();
        let ok = rig.call(vec![tag("get"), tag("men"), Value::Int(1)]);
        assert!(ok.is_ok());
        let failed = rig.call(vec![tag("get"), tag("mens")]);
        assert_eq!(failed.status, Status::Failed);
    }

    #[test]
    fn test_modern_control_modes() {
        let rig = Rig::new();
        let set = rig.call(vec![
            tag("set"),
            tag("icmd"),
            tag("modg"),
            Value::Int(2),
            ints(&[5, 2]),
            Value::tags([ControlMode::TORQUE.0, ControlMode::VELOCITY.0]),
        ]);
        assert!(set.is_ok());
        let get = rig.call(vec![tag("get"), tag("icmd"), tag("mods")]);
        let Value::List(modes) = &get.payload[0] else {
            panic!("expected a list, got {get:?}");
        };
        assert_eq!(modes[2], Value::Tag(ControlMode::VELOCITY.0));
        assert_eq!(modes[5], Value::Tag(ControlMode::TORQUE.0));
        assert_eq!(modes[0], Value::Tag(ControlMode::POSITION.0));
    }

    #[test]
    fn test_protocol_version_and_calibrator() {
        let rig = Rig::new();
        let version = rig.call(vec![tag("get"), tag("prtv")]);
        assert_eq!(
            version.payload,
            vec![Value::Int(1), Value::Int(6), Value::Int(0)]
        );

        assert!(rig
            .call(vec![tag("set"), tag("reca"), tag("prk"), Value::Int(4), Value::Int(0)])
            .is_ok());
        assert!(rig.call(vec![tag("set"), tag("reca"), tag("homs")]).is_ok());
        assert_eq!(
            rig.call(vec![tag("set"), tag("reca"), tag("cal"), Value::Int(9)]),
            Response::failed()
        );
        assert_eq!(rig.calibrator.log(), vec!["park 4 wait=false", "home all"]);
    }

    #[test]
    fn test_pid_round_trip() {
        let rig = Rig::new();
        let record: Vec<f64> = (1..=10).map(f64::from).collect();
        let set = rig.call(vec![
            tag("set"),
            tag("pid"),
            tag("pid"),
            tag("pidt"),
            Value::Int(4),
            Value::floats(&record),
        ]);
        assert!(set.is_ok());
        let get = rig.call(vec![tag("get"), tag("pid"), tag("pid"), tag("pidt"), Value::Int(4)]);
        assert_eq!(get.payload, vec![Value::floats(&record)]);
        assert_eq!(rig.b.axis(1).pid[2].params.kp, 1.0);
    }

    #[test]
    fn test_pid_group_with_bad_joint_touches_nothing() {
        let rig = Rig::new();
        let record = Value::floats(&[7.0; 10]);
        let before = rig.a.calls() + rig.b.calls();
        let response = rig.call(vec![
            tag("set"),
            tag("pid"),
            tag("pidg"),
            tag("pidp"),
            Value::Int(2),
            ints(&[0, 6]),
            Value::List(vec![record.clone(), record]),
        ]);
        assert_eq!(response, Response::failed());
        assert_eq!(rig.a.calls() + rig.b.calls(), before);
        assert_ne!(rig.a.axis(0).pid[0].params.kp, 7.0);
    }

    #[test]
    fn test_single_position_round_trip() {
        let rig = Rig::new();
        assert!(rig
            .call(vec![tag("set"), tag("pos"), Value::Int(4), Value::Float(12.5)])
            .is_ok());
        let get = rig.call(vec![tag("get"), tag("pos"), Value::Int(4)]);
        assert!(get.is_ok());
        assert_eq!(get.payload, vec![Value::Float(12.5)]);
        assert_eq!(rig.b.target(1), 12.5);
    }

    #[test]
    fn test_legacy_calibration_opcodes() {
        let rig = Rig::new();
        let done = rig.call(vec![tag("cald"), Value::Int(3)]);
        assert_eq!(done.payload, vec![Value::Int(0)]);
        let calb = rig.call(vec![
            tag("calb"),
            Value::Int(3),
            Value::Int(2),
            Value::Float(1.0),
            Value::Float(2.0),
            Value::Float(3.0),
        ]);
        assert!(calb.is_ok());
        let done = rig.call(vec![tag("cald"), Value::Int(3)]);
        assert_eq!(done.payload, vec![Value::Int(1)]);
        assert!(rig.call(vec![tag("abc")]).is_ok());
        assert_eq!(rig.calibrator.log(), vec!["quit calibrate"]);
    }
}
