//! Joint-addressed access to the attached subdevices.
//!
//! [`BoardView`] is what the protocol handlers, the streaming path and the
//! aggregation cycle see: a registry snapshot, one batch engine and the
//! optional calibrator. Single joints go straight to their slot, whole-board
//! calls walk the slots in wrapper order, and joint lists go through the
//! batch engine.

use crate::batch::{BatchEngine, LaneValue};
use crate::capabilities::{CapabilitySet, RemoteCalibrator};
use crate::error::{CallError, CallResult};
use crate::registry::{SubDeviceRegistry, SubDeviceSlot};
use serde::{Deserialize, Serialize};

/// Which joints an operation addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointSelector {
    One(i64),
    List(Vec<i64>),
    All,
}

impl JointSelector {
    /// Number of joints addressed on a board with `joints` joints.
    pub fn len(&self, joints: usize) -> usize {
        match self {
            JointSelector::One(_) => 1,
            JointSelector::List(list) => list.len(),
            JointSelector::All => joints,
        }
    }
}

#[derive(Clone, Copy)]
pub struct BoardView<'a> {
    registry: &'a SubDeviceRegistry,
    batch: &'a BatchEngine,
    calibrator: Option<&'a dyn RemoteCalibrator>,
}

impl<'a> BoardView<'a> {
    pub fn new(
        registry: &'a SubDeviceRegistry,
        batch: &'a BatchEngine,
        calibrator: Option<&'a dyn RemoteCalibrator>,
    ) -> Self {
        Self {
            registry,
            batch,
            calibrator,
        }
    }

    pub fn registry(&self) -> &'a SubDeviceRegistry {
        self.registry
    }

    pub fn joints(&self) -> usize {
        self.registry.joints()
    }

    pub fn calibrator(&self) -> CallResult<&'a dyn RemoteCalibrator> {
        self.calibrator.ok_or(CallError::NoCalibrator)
    }

    pub fn has_calibrator(&self) -> bool {
        self.calibrator.is_some()
    }

    /// Resolve `joint` and run `f` against its slot and device axis.
    pub fn on_joint<T>(
        &self,
        joint: i64,
        f: impl FnOnce(&'a CapabilitySet, usize) -> CallResult<T>,
    ) -> CallResult<T> {
        let loc = self.registry.lookup(joint)?;
        let slot = &self.registry.slots()[loc.subdevice];
        if !slot.is_attached() {
            return Err(CallError::NotAttached(slot.key().to_string()));
        }
        f(slot.capabilities(), loc.axis)
    }

    /// Run `f` for every slot in wrapper order. Fails on the first
    /// unattached slot before any call is made.
    pub fn each_slot(
        &self,
        mut f: impl FnMut(&'a SubDeviceSlot) -> CallResult<()>,
    ) -> CallResult<()> {
        if let Some(slot) = self.registry.slots().iter().find(|s| !s.is_attached()) {
            return Err(CallError::NotAttached(slot.key().to_string()));
        }
        self.registry.slots().iter().try_for_each(|slot| f(slot))
    }

    /// Read every joint into `out`, which must hold one value per joint.
    /// Values of slots read before a failure are left in place.
    pub fn read_into<T: LaneValue>(
        &self,
        out: &mut [T],
        mut read: impl FnMut(&CapabilitySet, &[usize], &mut [T]) -> CallResult<()>,
    ) -> CallResult<()> {
        if out.len() != self.joints() {
            return Err(CallError::LengthMismatch {
                joints: self.joints(),
                values: out.len(),
            });
        }
        self.each_slot(|slot| {
            read(
                slot.capabilities(),
                slot.device_axes(),
                &mut out[slot.wrapper_span()],
            )
        })
    }

    /// Read the selected joints, in selector order.
    pub fn read<T: LaneValue>(
        &self,
        target: &JointSelector,
        mut read: impl FnMut(&CapabilitySet, &[usize], &mut [T]) -> CallResult<()>,
    ) -> CallResult<Vec<T>> {
        match target {
            JointSelector::One(joint) => self.on_joint(*joint, |caps, axis| {
                let mut value = [T::default()];
                read(caps, &[axis], &mut value)?;
                Ok(vec![value[0]])
            }),
            JointSelector::All => {
                let mut out = vec![T::default(); self.joints()];
                self.read_into(&mut out, read)?;
                Ok(out)
            }
            JointSelector::List(joints) => {
                let mut out = vec![T::default(); joints.len()];
                self.batch.get(self.registry, joints, &mut out, read)?;
                Ok(out)
            }
        }
    }

    /// Write `values[i]` to the i-th selected joint.
    pub fn write<T: LaneValue>(
        &self,
        target: &JointSelector,
        values: &[T],
        mut write: impl FnMut(&CapabilitySet, &[usize], &[T]) -> CallResult<()>,
    ) -> CallResult<()> {
        let expected = target.len(self.joints());
        if values.len() != expected {
            return Err(CallError::LengthMismatch {
                joints: expected,
                values: values.len(),
            });
        }
        match target {
            JointSelector::One(joint) => {
                self.on_joint(*joint, |caps, axis| write(caps, &[axis], values))
            }
            JointSelector::All => self.each_slot(|slot| {
                write(
                    slot.capabilities(),
                    slot.device_axes(),
                    &values[slot.wrapper_span()],
                )
            }),
            JointSelector::List(joints) => self.batch.set(self.registry, joints, values, write),
        }
    }

    /// Run a value-less action on the selected joints.
    pub fn act(
        &self,
        target: &JointSelector,
        mut action: impl FnMut(&CapabilitySet, &[usize]) -> CallResult<()>,
    ) -> CallResult<()> {
        match target {
            JointSelector::One(joint) => self.on_joint(*joint, |caps, axis| action(caps, &[axis])),
            JointSelector::All => {
                self.each_slot(|slot| action(slot.capabilities(), slot.device_axes()))
            }
            JointSelector::List(joints) => self.batch.apply(self.registry, joints, action),
        }
    }

    /// AND of a boolean predicate over the selected joints.
    pub fn check(
        &self,
        target: &JointSelector,
        mut predicate: impl FnMut(&CapabilitySet, &[usize]) -> CallResult<bool>,
    ) -> CallResult<bool> {
        match target {
            JointSelector::List(joints) => self.batch.check(self.registry, joints, predicate),
            _ => {
                let mut all = true;
                self.act(target, |caps, axes| {
                    all &= predicate(caps, axes)?;
                    Ok(())
                })?;
                Ok(all)
            }
        }
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::error::JointOutOfRange;
    use crate::mock::MockController;
    use crate::registry::{RangeSpec, SubDeviceLayout};
    use std::sync::Arc;

    fn board() -> (SubDeviceRegistry, Arc<MockController>, Arc<MockController>) {
        let mut registry = SubDeviceRegistry::configure(
            5,
            SubDeviceLayout::Explicit(vec![
                RangeSpec::new("a", (0, 1), (0, 1)),
                RangeSpec::new("b", (2, 4), (1, 3)),
            ]),
        )
        .unwrap();
        let a = Arc::new(MockController::new(2));
        let b = Arc::new(MockController::new(4));
        registry
            .attach("a", CapabilitySet::from_device(a.clone()))
            .unwrap();
        registry
            .attach("b", CapabilitySet::from_device(b.clone()))
            .unwrap();
        (registry, a, b)
    }

    #[test]
    fn test_all_selector_respects_device_offset() {
        let (registry, a, b) = board();
        let batch = BatchEngine::for_registry(&registry);
        let view = BoardView::new(&registry, &batch, None);
        view.write(
            &JointSelector::All,
            &[1.0, 2.0, 3.0, 4.0, 5.0],
            |caps, axes, values| Ok(caps.velocity()?.velocity_move_group(axes, values)?),
        )
        .unwrap();
        assert_eq!(a.axis(1).ref_velocity, 2.0);
        // Logical joint 2 is device axis 1 of "b"; axis 0 is unmapped.
        assert_eq!(b.axis(0).ref_velocity, 0.0);
        assert_eq!(b.axis(1).ref_velocity, 3.0);
        assert_eq!(b.axis(3).ref_velocity, 5.0);

        let back = view
            .read(&JointSelector::All, |caps, axes, out| {
                Ok(caps.velocity()?.ref_velocity_group(axes, out)?)
            })
            .unwrap();
        assert_eq!(back, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_one_selector_bounds() {
        let (registry, a, b) = board();
        let batch = BatchEngine::for_registry(&registry);
        let view = BoardView::new(&registry, &batch, None);
        let before = a.calls() + b.calls();
        let err = view
            .write(&JointSelector::One(5), &[1.0], |caps, axes, v| {
                Ok(caps.position()?.position_move_group(axes, v)?)
            })
            .unwrap_err();
        assert_eq!(
            err,
            CallError::OutOfRange(JointOutOfRange { joint: 5, joints: 5 })
        );
        assert_eq!(a.calls() + b.calls(), before);
    }

    #[test]
    fn test_value_count_checked() {
        let (registry, _, _) = board();
        let batch = BatchEngine::for_registry(&registry);
        let view = BoardView::new(&registry, &batch, None);
        let err = view
            .write(&JointSelector::All, &[1.0, 2.0], |_, _, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, CallError::LengthMismatch { joints: 5, values: 2 }));
        assert_eq!(view.calibrator().err(), Some(CallError::NoCalibrator));
    }

    #[test]
    fn test_unattached_slot_fails_whole_board_call() {
        let (mut registry, _, b) = board();
        registry.detach("a").unwrap();
        let batch = BatchEngine::for_registry(&registry);
        let view = BoardView::new(&registry, &batch, None);
        let before = b.calls();
        let err = view
            .act(&JointSelector::All, |caps, axes| Ok(caps.position()?.stop_group(axes)?))
            .unwrap_err();
        assert_eq!(err, CallError::NotAttached("a".into()));
        assert_eq!(b.calls(), before);
    }
}
