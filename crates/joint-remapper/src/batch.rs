//! Batched multi-joint calls across subdevices.
//!
//! A batched call runs partition → dispatch → scatter under the engine lock.
//! `partition` records, for every input position, the `(subdevice, cursor)`
//! it was written to; `scatter` walks exactly that record, so results come
//! back in the caller's order whatever the joint permutation.

use crate::capabilities::CapabilitySet;
use crate::error::{CallError, CallResult};
use crate::registry::SubDeviceRegistry;
use crate::types::{ControlMode, InteractionMode};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Per-subdevice joint groups of the call in progress.
#[derive(Debug, Default)]
struct Groups {
    capacity: usize,
    fill: Vec<usize>,
    axes: Vec<Vec<usize>>,
    placements: Vec<(usize, usize)>,
}

impl Groups {
    fn reset(&mut self) {
        self.fill.iter_mut().for_each(|n| *n = 0);
        self.placements.clear();
    }

    fn group(&self, subdevice: usize) -> &[usize] {
        &self.axes[subdevice][..self.fill[subdevice]]
    }
}

/// Value lanes, one pre-sized row per subdevice.
#[derive(Debug, Default)]
pub struct Lanes {
    values: Vec<Vec<f64>>,
    control_modes: Vec<Vec<ControlMode>>,
    interaction_modes: Vec<Vec<InteractionMode>>,
}

/// Element types that have a scratch lane.
pub trait LaneValue: Copy + Default {
    fn lane(lanes: &mut Lanes) -> &mut Vec<Vec<Self>>;
}

impl LaneValue for f64 {
    fn lane(lanes: &mut Lanes) -> &mut Vec<Vec<Self>> {
        &mut lanes.values
    }
}

impl LaneValue for ControlMode {
    fn lane(lanes: &mut Lanes) -> &mut Vec<Vec<Self>> {
        &mut lanes.control_modes
    }
}

impl LaneValue for InteractionMode {
    fn lane(lanes: &mut Lanes) -> &mut Vec<Vec<Self>> {
        &mut lanes.interaction_modes
    }
}

#[derive(Debug, Default)]
pub struct BatchScratch {
    max_joints: usize,
    groups: Groups,
    lanes: Lanes,
}

impl BatchScratch {
    pub fn new(subdevices: usize, max_axes: usize, max_joints: usize) -> Self {
        Self {
            max_joints,
            groups: Groups {
                capacity: max_axes,
                fill: vec![0; subdevices],
                axes: vec![vec![0; max_axes]; subdevices],
                placements: Vec::with_capacity(max_joints),
            },
            lanes: Lanes {
                values: vec![vec![0.0; max_axes]; subdevices],
                control_modes: vec![vec![ControlMode::default(); max_axes]; subdevices],
                interaction_modes: vec![vec![InteractionMode::default(); max_axes]; subdevices],
            },
        }
    }

    fn fits(&self, registry: &SubDeviceRegistry) -> bool {
        self.groups.fill.len() == registry.slots().len()
            && self.groups.capacity >= registry.max_axes()
            && self.max_joints == registry.joints()
    }

    fn partition(&mut self, registry: &SubDeviceRegistry, joints: &[i64]) -> CallResult<()> {
        if !self.fits(registry) {
            debug!("resizing batch scratch to the current registry layout");
            *self = BatchScratch::new(
                registry.slots().len(),
                registry.max_axes(),
                registry.joints(),
            );
        }
        self.groups.reset();
        if joints.len() > self.max_joints {
            return Err(CallError::TooManyJoints {
                len: joints.len(),
                max: self.max_joints,
            });
        }
        let groups = &mut self.groups;
        for &joint in joints {
            let loc = registry.lookup(joint)?;
            let cursor = groups.fill[loc.subdevice];
            if cursor >= groups.capacity {
                return Err(CallError::TooManyJoints {
                    len: cursor + 1,
                    max: groups.capacity,
                });
            }
            groups.axes[loc.subdevice][cursor] = loc.axis;
            groups.placements.push((loc.subdevice, cursor));
            groups.fill[loc.subdevice] += 1;
        }
        Ok(())
    }

    fn load<T: LaneValue>(&mut self, values: &[T]) {
        let lane = T::lane(&mut self.lanes);
        for (value, &(sub, cursor)) in values.iter().zip(&self.groups.placements) {
            lane[sub][cursor] = *value;
        }
    }

    fn scatter<T: LaneValue>(&mut self, out: &mut [T]) {
        let lane = T::lane(&mut self.lanes);
        for (slot, &(sub, cursor)) in out.iter_mut().zip(&self.groups.placements) {
            *slot = lane[sub][cursor];
        }
    }

    /// Run `call` once per non-empty group, stopping at the first failure.
    fn dispatch<T: LaneValue>(
        &mut self,
        registry: &SubDeviceRegistry,
        mut call: impl FnMut(&CapabilitySet, &[usize], &mut [T]) -> CallResult<()>,
    ) -> CallResult<()> {
        let lane = T::lane(&mut self.lanes);
        for (sub, slot) in registry.slots().iter().enumerate() {
            let axes = self.groups.group(sub);
            if axes.is_empty() {
                continue;
            }
            if !slot.is_attached() {
                return Err(CallError::NotAttached(slot.key().to_string()));
            }
            call(slot.capabilities(), axes, &mut lane[sub][..axes.len()])?;
        }
        Ok(())
    }
}

/// Owner of one [`BatchScratch`] and the lock that serializes its use.
///
/// The lock is not re-entrant: a closure passed to any method here must not
/// start another batched call on the same engine.
#[derive(Debug, Default)]
pub struct BatchEngine {
    scratch: Mutex<BatchScratch>,
}

impl BatchEngine {
    pub fn new(subdevices: usize, max_axes: usize, max_joints: usize) -> Self {
        Self {
            scratch: Mutex::new(BatchScratch::new(subdevices, max_axes, max_joints)),
        }
    }

    pub fn for_registry(registry: &SubDeviceRegistry) -> Self {
        Self::new(
            registry.slots().len(),
            registry.max_axes(),
            registry.joints(),
        )
    }

    /// Reallocate for a new registry layout.
    pub fn resize(&self, registry: &SubDeviceRegistry) {
        *self.lock() = BatchScratch::new(
            registry.slots().len(),
            registry.max_axes(),
            registry.joints(),
        );
    }

    fn lock(&self) -> MutexGuard<'_, BatchScratch> {
        self.scratch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read one value per joint into `out`, in `joints` order. On failure
    /// `out` is zero/default filled.
    pub fn get<T: LaneValue>(
        &self,
        registry: &SubDeviceRegistry,
        joints: &[i64],
        out: &mut [T],
        read: impl FnMut(&CapabilitySet, &[usize], &mut [T]) -> CallResult<()>,
    ) -> CallResult<()> {
        let result = self.get_inner(registry, joints, out, read);
        if result.is_err() {
            out.iter_mut().for_each(|v| *v = T::default());
        }
        result
    }

    fn get_inner<T: LaneValue>(
        &self,
        registry: &SubDeviceRegistry,
        joints: &[i64],
        out: &mut [T],
        read: impl FnMut(&CapabilitySet, &[usize], &mut [T]) -> CallResult<()>,
    ) -> CallResult<()> {
        if out.len() != joints.len() {
            return Err(CallError::LengthMismatch {
                joints: joints.len(),
                values: out.len(),
            });
        }
        let mut scratch = self.lock();
        scratch.partition(registry, joints)?;
        scratch.dispatch(registry, read)?;
        scratch.scatter(out);
        Ok(())
    }

    /// Write `values[i]` to `joints[i]` for every `i`.
    pub fn set<T: LaneValue>(
        &self,
        registry: &SubDeviceRegistry,
        joints: &[i64],
        values: &[T],
        mut write: impl FnMut(&CapabilitySet, &[usize], &[T]) -> CallResult<()>,
    ) -> CallResult<()> {
        if values.len() != joints.len() {
            return Err(CallError::LengthMismatch {
                joints: joints.len(),
                values: values.len(),
            });
        }
        let mut scratch = self.lock();
        scratch.partition(registry, joints)?;
        scratch.load(values);
        scratch.dispatch::<T>(registry, |caps, axes, lane| write(caps, axes, lane))
    }

    /// Run an action per group with no values (stop, enable, ...).
    pub fn apply(
        &self,
        registry: &SubDeviceRegistry,
        joints: &[i64],
        mut action: impl FnMut(&CapabilitySet, &[usize]) -> CallResult<()>,
    ) -> CallResult<()> {
        let mut scratch = self.lock();
        scratch.partition(registry, joints)?;
        scratch.dispatch::<f64>(registry, |caps, axes, _| action(caps, axes))
    }

    /// AND of a boolean predicate over every group.
    pub fn check(
        &self,
        registry: &SubDeviceRegistry,
        joints: &[i64],
        mut predicate: impl FnMut(&CapabilitySet, &[usize]) -> CallResult<bool>,
    ) -> CallResult<bool> {
        let mut all = true;
        self.apply(registry, joints, |caps, axes| {
            all &= predicate(caps, axes)?;
            Ok(())
        })?;
        Ok(all)
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::capabilities::Capability;
    use crate::error::{CapabilityUnavailable, JointOutOfRange};
    use crate::mock::MockController;
    use crate::registry::{RangeSpec, SubDeviceLayout};
    use std::sync::Arc;

    struct Rig {
        registry: SubDeviceRegistry,
        engine: BatchEngine,
        a: Arc<MockController>,
        b: Arc<MockController>,
    }

    fn rig(b_caps: impl FnOnce(CapabilitySet) -> CapabilitySet) -> Rig {
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
            .attach("B", b_caps(CapabilitySet::from_device(b.clone())))
            .unwrap();
        let engine = BatchEngine::for_registry(&registry);
        Rig {
            registry,
            engine,
            a,
            b,
        }
    }

    #[test]
    fn test_scatter_preserves_request_order() {
        let r = rig(|c| c);
        r.a.set_encoder_values(&[10.0, 11.0, 12.0]);
        r.b.set_encoder_values(&[20.0, 21.0, 22.0]);
        let mut out = [0.0; 4];
        r.engine
            .get(&r.registry, &[4, 1, 5, 0], &mut out, |caps, axes, lane| {
                Ok(caps.encoders()?.encoder_group(axes, lane)?)
            })
            .unwrap();
        assert_eq!(out, [21.0, 11.0, 22.0, 10.0]);
    }

    #[test]
    fn test_set_lands_on_owning_subdevice() {
        let r = rig(|c| c);
        r.engine
            .set(&r.registry, &[5, 0, 3], &[1.5, 2.5, 3.5], |caps, axes, lane| {
                Ok(caps.position()?.position_move_group(axes, lane)?)
            })
            .unwrap();
        assert_eq!(r.b.target(2), 1.5);
        assert_eq!(r.a.target(0), 2.5);
        assert_eq!(r.b.target(0), 3.5);
    }

    #[test]
    fn test_missing_capability_on_touched_subdevice_fails() {
        let r = rig(|c| c.without(Capability::Torque));
        let mut out = [7.0; 2];
        let err = r
            .engine
            .get(&r.registry, &[0, 4], &mut out, |caps, axes, lane| {
                Ok(caps.torque()?.torque_group(axes, lane)?)
            })
            .unwrap_err();
        assert_eq!(
            err,
            CallError::Unavailable(CapabilityUnavailable(Capability::Torque))
        );
        assert_eq!(out, [0.0, 0.0]);

        // Joints that stay on A are unaffected.
        let mut only_a = [0.0; 2];
        r.engine
            .get(&r.registry, &[2, 1], &mut only_a, |caps, axes, lane| {
                Ok(caps.torque()?.torque_group(axes, lane)?)
            })
            .unwrap();
    }

    #[test]
    fn test_out_of_range_makes_no_call() {
        let r = rig(|c| c);
        let before = r.a.calls() + r.b.calls();
        for bad in [-1, 6] {
            let mut out = [0.0; 2];
            let err = r
                .engine
                .get(&r.registry, &[0, bad], &mut out, |caps, axes, lane| {
                    Ok(caps.encoders()?.encoder_group(axes, lane)?)
                })
                .unwrap_err();
            assert_eq!(
                err,
                CallError::OutOfRange(JointOutOfRange {
                    joint: bad,
                    joints: 6
                })
            );
        }
        assert_eq!(r.a.calls() + r.b.calls(), before);
    }

    #[test]
    fn test_too_many_joints() {
        let r = rig(|c| c);
        let joints = [0, 1, 2, 3, 4, 5, 0];
        let err = r
            .engine
            .apply(&r.registry, &joints, |caps, axes| {
                Ok(caps.position()?.stop_group(axes)?)
            })
            .unwrap_err();
        assert!(matches!(err, CallError::TooManyJoints { len: 7, max: 6 }));
    }

    #[test]
    fn test_mode_lane_round_trip() {
        let r = rig(|c| c);
        let modes = [ControlMode::VELOCITY, ControlMode::TORQUE];
        r.engine
            .set(&r.registry, &[3, 1], &modes, |caps, axes, lane| {
                Ok(caps.control_mode()?.set_control_mode_group(axes, lane)?)
            })
            .unwrap();
        let mut out = [ControlMode::default(); 2];
        r.engine
            .get(&r.registry, &[1, 3], &mut out, |caps, axes, lane| {
                Ok(caps.control_mode()?.control_mode_group(axes, lane)?)
            })
            .unwrap();
        assert_eq!(out, [ControlMode::TORQUE, ControlMode::VELOCITY]);
    }

    #[test]
    fn test_check_is_and_across_groups() {
        let r = rig(|c| c);
        r.b.set_moving(1, true);
        let done = r
            .engine
            .check(&r.registry, &[0, 4], |caps, axes| {
                Ok(caps.position()?.motion_done_group(axes)?)
            })
            .unwrap();
        assert!(!done);
        let done = r
            .engine
            .check(&r.registry, &[0, 3], |caps, axes| {
                Ok(caps.position()?.motion_done_group(axes)?)
            })
            .unwrap();
        assert!(done);
    }
}
