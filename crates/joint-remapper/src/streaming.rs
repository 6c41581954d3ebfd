//! Fire-and-forget command stream.
//!
//! Nothing is ever sent back: a rejected message is logged and dropped.
//! Joint lists go through a batch engine owned by the stream so they never
//! wait behind an RPC batch.

use crate::batch::BatchEngine;
use crate::board::{BoardView, JointSelector};
use crate::error::CallError;
use crate::protocol::grammar::Writer;
use crate::registry::SubDeviceRegistry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamAction {
    PositionMove,
    PositionDirect,
    Velocity,
    Torque,
    Pwm,
    Current,
}

impl StreamAction {
    fn writer(self) -> Writer {
        match self {
            StreamAction::PositionMove => |c, a, v| Ok(c.position()?.position_move_group(a, v)?),
            StreamAction::PositionDirect => {
                |c, a, v| Ok(c.position_direct()?.set_position_group(a, v)?)
            }
            StreamAction::Velocity => |c, a, v| Ok(c.velocity()?.velocity_move_group(a, v)?),
            StreamAction::Torque => |c, a, v| Ok(c.torque()?.set_ref_torque_group(a, v)?),
            StreamAction::Pwm => |c, a, v| Ok(c.pwm()?.set_ref_duty_cycle_group(a, v)?),
            StreamAction::Current => |c, a, v| Ok(c.current()?.set_ref_current_group(a, v)?),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingCommand {
    pub action: StreamAction,
    pub selector: JointSelector,
    pub values: Vec<f64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum StreamError {
    #[error("{values} values for a {joints}-joint device")]
    TooManyValues { values: usize, joints: usize },
    #[error("selector addresses {expected} joints but {values} values were sent")]
    CountMismatch { expected: usize, values: usize },
    #[error(transparent)]
    Call(#[from] CallError),
}

#[derive(Debug, Default)]
pub struct StreamingIngestor {
    batch: BatchEngine,
}

impl StreamingIngestor {
    pub fn new(registry: &SubDeviceRegistry) -> Self {
        Self {
            batch: BatchEngine::for_registry(registry),
        }
    }

    pub fn resize(&self, registry: &SubDeviceRegistry) {
        self.batch.resize(registry);
    }

    /// Validate and apply one message.
    pub fn apply(
        &self,
        registry: &SubDeviceRegistry,
        command: &StreamingCommand,
    ) -> Result<(), StreamError> {
        let joints = registry.joints();
        let values = command.values.len();
        if values > joints {
            return Err(StreamError::TooManyValues { values, joints });
        }
        let expected = command.selector.len(joints);
        if values != expected {
            return Err(StreamError::CountMismatch { expected, values });
        }
        let view = BoardView::new(registry, &self.batch, None);
        view.write(&command.selector, &command.values, command.action.writer())?;
        Ok(())
    }

    /// Apply `command`, logging and dropping it on failure. Returns whether
    /// it was applied.
    pub fn ingest(&self, registry: &SubDeviceRegistry, command: &StreamingCommand) -> bool {
        match self.apply(registry, command) {
            Ok(()) => true,
            Err(StreamError::Call(CallError::Unavailable(e))) => {
                debug!(action = ?command.action, "streaming command dropped: {e}");
                false
            }
            Err(e) => {
                warn!(action = ?command.action, "streaming command dropped: {e}");
                false
            }
        }
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::capabilities::{Capability, CapabilitySet};
    use crate::mock::MockController;
    use crate::registry::{RangeSpec, SubDeviceLayout};
    use std::sync::Arc;

    fn setup() -> (SubDeviceRegistry, Arc<MockController>, Arc<MockController>) {
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
                CapabilitySet::from_device(b.clone()).without(Capability::Pwm),
            )
            .unwrap();
        (registry, a, b)
    }

    #[test]
    fn test_too_many_values_dropped_without_calls() {
        let (registry, a, b) = setup();
        let ingestor = StreamingIngestor::new(&registry);
        let before = a.calls() + b.calls();
        let command = StreamingCommand {
            action: StreamAction::PositionMove,
            selector: JointSelector::All,
            values: vec![1.0; 7],
        };
        assert_eq!(
            ingestor.apply(&registry, &command),
            Err(StreamError::TooManyValues {
                values: 7,
                joints: 6
            })
        );
        assert!(!ingestor.ingest(&registry, &command));
        assert_eq!(a.calls() + b.calls(), before);
    }

    #[test]
    fn test_list_selector_routes_values() {
        let (registry, a, b) = setup();
        let ingestor = StreamingIngestor::new(&registry);
        let command = StreamingCommand {
            action: StreamAction::Velocity,
            selector: JointSelector::List(vec![5, 0]),
            values: vec![3.0, -1.0],
        };
        assert!(ingestor.ingest(&registry, &command));
        assert_eq!(b.axis(2).ref_velocity, 3.0);
        assert_eq!(a.axis(0).ref_velocity, -1.0);
    }

    #[test]
    fn test_count_mismatch_and_missing_capability() {
        let (registry, a, _) = setup();
        let ingestor = StreamingIngestor::new(&registry);
        let mismatch = StreamingCommand {
            action: StreamAction::Torque,
            selector: JointSelector::List(vec![0, 1]),
            values: vec![1.0],
        };
        assert_eq!(
            ingestor.apply(&registry, &mismatch),
            Err(StreamError::CountMismatch {
                expected: 2,
                values: 1
            })
        );

        let pwm_on_b = StreamingCommand {
            action: StreamAction::Pwm,
            selector: JointSelector::One(4),
            values: vec![0.5],
        };
        assert!(!ingestor.ingest(&registry, &pwm_on_b));

        let pwm_on_a = StreamingCommand {
            action: StreamAction::Pwm,
            selector: JointSelector::One(1),
            values: vec![0.5],
        };
        assert!(ingestor.ingest(&registry, &pwm_on_a));
        assert_eq!(a.axis(1).ref_duty, 0.5);
    }

    #[test]
    fn test_json_message_shape() {
        let json = r#"{"action":"position_direct","selector":{"one":2},"values":[12.5]}"#;
        let command: StreamingCommand = serde_json::from_str(json).unwrap();
        assert_eq!(command.selector, JointSelector::One(2));
        assert_eq!(command.action, StreamAction::PositionDirect);
    }
}
