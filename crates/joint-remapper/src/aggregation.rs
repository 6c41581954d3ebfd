//! Periodic state aggregation.
//!
//! One cycle reads every joint through the attached subdevices and publishes
//! the result. Each field of [`StateSnapshot`] carries its own validity: a
//! missing capability or a failed read clears that flag and keeps the
//! previous values, and never aborts the cycle.

use crate::batch::LaneValue;
use crate::board::BoardView;
use crate::bridge::{fallback_joint_name, JointStateBridge, JointStateRecord};
use crate::capabilities::CapabilitySet;
use crate::error::{CallError, CallResult};
use crate::types::{now_seconds, ControlMode, InteractionMode, Stamp};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

pub const DEFAULT_BACKLOG_WARNING: usize = 20;

/// Per-joint values plus whether the last read succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field<T> {
    pub values: Vec<T>,
    pub valid: bool,
}

impl<T: Clone + Default> Field<T> {
    pub fn new(joints: usize) -> Self {
        Self {
            values: vec![T::default(); joints],
            valid: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub position: Field<f64>,
    pub velocity: Field<f64>,
    pub acceleration: Field<f64>,
    pub motor_position: Field<f64>,
    pub motor_velocity: Field<f64>,
    pub motor_acceleration: Field<f64>,
    pub torque: Field<f64>,
    pub pwm_duty: Field<f64>,
    pub current: Field<f64>,
    pub control_mode: Field<ControlMode>,
    pub interaction_mode: Field<InteractionMode>,
    pub stamp: Stamp,
}

impl StateSnapshot {
    pub fn new(joints: usize) -> Self {
        Self {
            position: Field::new(joints),
            velocity: Field::new(joints),
            acceleration: Field::new(joints),
            motor_position: Field::new(joints),
            motor_velocity: Field::new(joints),
            motor_acceleration: Field::new(joints),
            torque: Field::new(joints),
            pwm_duty: Field::new(joints),
            current: Field::new(joints),
            control_mode: Field::new(joints),
            interaction_mode: Field::new(joints),
            stamp: Stamp::default(),
        }
    }

    pub fn joints(&self) -> usize {
        self.position.values.len()
    }
}

/// Receiver of the per-cycle output.
pub trait StatePublisher: Send + Sync {
    /// Core output: joint positions and the cycle stamp.
    fn publish_state(&self, positions: &[f64], stamp: Stamp);
    /// Extended output: the full snapshot.
    fn publish_snapshot(&self, snapshot: &StateSnapshot);
}

/// Publisher that keeps only the latest output.
#[derive(Debug, Default)]
pub struct LatestState {
    state: Mutex<Option<(Vec<f64>, Stamp)>>,
    snapshot: Mutex<Option<StateSnapshot>>,
}

impl LatestState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Option<(Vec<f64>, Stamp)> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn snapshot(&self) -> Option<StateSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StatePublisher for LatestState {
    fn publish_state(&self, positions: &[f64], stamp: Stamp) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((positions.to_vec(), stamp));
    }

    fn publish_snapshot(&self, snapshot: &StateSnapshot) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
    }
}

/// Warns while the streaming backlog stays above a threshold.
#[derive(Debug)]
pub struct BacklogWatchdog {
    threshold: usize,
    consecutive: u32,
}

impl BacklogWatchdog {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            consecutive: 0,
        }
    }

    /// Returns whether `pending` is over the threshold.
    pub fn check(&mut self, pending: usize) -> bool {
        if pending > self.threshold {
            self.consecutive += 1;
            warn!(
                pending,
                threshold = self.threshold,
                cycles = self.consecutive,
                "streaming backlog above threshold"
            );
            true
        } else {
            self.consecutive = 0;
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// At least one subdevice is not attached.
    Skipped,
    Published(Stamp),
}

pub struct AggregationCycle {
    extended: bool,
    watchdog: BacklogWatchdog,
    stamp: Stamp,
    snapshot: StateSnapshot,
    encoder_stamps: Vec<f64>,
    staging: Vec<f64>,
    staging_stamps: Vec<f64>,
    staging_control: Vec<ControlMode>,
    staging_interaction: Vec<InteractionMode>,
    names: Option<Vec<String>>,
    publisher: Option<Arc<dyn StatePublisher>>,
    bridge: Option<Box<dyn JointStateBridge>>,
    record: JointStateRecord,
}

impl AggregationCycle {
    pub fn new(joints: usize, extended: bool, backlog_warning: usize) -> Self {
        Self {
            extended,
            watchdog: BacklogWatchdog::new(backlog_warning),
            stamp: Stamp::default(),
            snapshot: StateSnapshot::new(joints),
            encoder_stamps: vec![0.0; joints],
            staging: vec![0.0; joints],
            staging_stamps: vec![0.0; joints],
            staging_control: vec![ControlMode::default(); joints],
            staging_interaction: vec![InteractionMode::default(); joints],
            names: None,
            publisher: None,
            bridge: None,
            record: JointStateRecord::default(),
        }
    }

    /// Rebuild the buffers for a new joint count, keeping the outputs.
    pub fn resize(&mut self, joints: usize) {
        let mut fresh = Self::new(joints, self.extended, self.watchdog.threshold);
        fresh.stamp = self.stamp;
        fresh.publisher = self.publisher.take();
        fresh.bridge = self.bridge.take();
        *self = fresh;
    }

    pub fn set_publisher(&mut self, publisher: Arc<dyn StatePublisher>) {
        self.publisher = Some(publisher);
    }

    pub fn set_bridge(&mut self, bridge: Box<dyn JointStateBridge>) {
        self.bridge = Some(bridge);
    }

    pub fn snapshot(&self) -> &StateSnapshot {
        &self.snapshot
    }

    /// One cycle. `backlog` is the number of streaming messages waiting.
    pub fn run(&mut self, view: &BoardView<'_>, backlog: usize) -> CycleOutcome {
        self.watchdog.check(backlog);
        if !view.registry().all_attached() {
            debug!("aggregation skipped: not every subdevice is attached");
            return CycleOutcome::Skipped;
        }

        let time = self.collect_core(view);
        if self.extended {
            self.collect_extended(view);
        }
        let stamp = self.stamp.advance(time);
        self.snapshot.stamp = stamp;

        if let Some(publisher) = &self.publisher {
            publisher.publish_state(&self.snapshot.position.values, stamp);
            if self.extended {
                publisher.publish_snapshot(&self.snapshot);
            }
        }
        if self.bridge.is_some() {
            self.export(view);
        }
        CycleOutcome::Published(stamp)
    }

    /// Positions with their stamps, speeds and torques. Returns the cycle
    /// time: the mean encoder stamp, or the wall clock if none was read.
    fn collect_core(&mut self, view: &BoardView<'_>) -> f64 {
        let staging = &mut self.staging;
        let stamps = &mut self.staging_stamps;
        let timed = view.each_slot(|slot| {
            let span = slot.wrapper_span();
            Ok(slot.capabilities().encoders()?.encoders_timed_group(
                slot.device_axes(),
                &mut staging[span.clone()],
                &mut stamps[span],
            )?)
        });
        let field = &mut self.snapshot.position;
        let time = match timed {
            Ok(()) => {
                field.values.copy_from_slice(&self.staging);
                self.encoder_stamps.copy_from_slice(&self.staging_stamps);
                field.valid = true;
                mean(&self.encoder_stamps)
            }
            Err(err) => {
                field.valid = false;
                log_field("position", &err);
                None
            }
        };

        refresh(view, "velocity", &mut self.snapshot.velocity, &mut self.staging[..], |c, a, o| {
            Ok(c.encoders()?.encoder_speed_group(a, o)?)
        });
        refresh(view, "torque", &mut self.snapshot.torque, &mut self.staging[..], |c, a, o| {
            Ok(c.torque()?.torque_group(a, o)?)
        });

        time.unwrap_or_else(|| {
            warn!("no encoder stamps this cycle, using wall clock");
            now_seconds()
        })
    }

    fn collect_extended(&mut self, view: &BoardView<'_>) {
        let s = &mut self.snapshot;
        let staging = &mut self.staging[..];
        refresh(view, "acceleration", &mut s.acceleration, staging, |c, a, o| {
            Ok(c.encoders()?.encoder_acceleration_group(a, o)?)
        });
        refresh(view, "motor_position", &mut s.motor_position, staging, |c, a, o| {
            Ok(c.motor_encoders()?.motor_encoder_group(a, o)?)
        });
        refresh(view, "motor_velocity", &mut s.motor_velocity, staging, |c, a, o| {
            Ok(c.motor_encoders()?.motor_encoder_speed_group(a, o)?)
        });
        refresh(view, "motor_acceleration", &mut s.motor_acceleration, staging, |c, a, o| {
            Ok(c.motor_encoders()?.motor_encoder_acceleration_group(a, o)?)
        });
        refresh(view, "pwm_duty", &mut s.pwm_duty, staging, |c, a, o| {
            Ok(c.pwm()?.duty_cycle_group(a, o)?)
        });
        refresh(view, "current", &mut s.current, staging, |c, a, o| {
            Ok(c.current()?.current_group(a, o)?)
        });
        refresh(view, "control_mode", &mut s.control_mode, &mut self.staging_control[..], |c, a, o| {
            Ok(c.control_mode()?.control_mode_group(a, o)?)
        });
        refresh(
            view,
            "interaction_mode",
            &mut s.interaction_mode,
            &mut self.staging_interaction[..],
            |c, a, o| Ok(c.interaction_mode()?.interaction_mode_group(a, o)?),
        );
    }

    fn export(&mut self, view: &BoardView<'_>) {
        let names = self.names.get_or_insert_with(|| joint_names(view));
        let record = &mut self.record;
        record.names.clone_from(names);
        record.position.clone_from(&self.snapshot.position.values);
        record.velocity.clone_from(&self.snapshot.velocity.values);
        record.torque.clone_from(&self.snapshot.torque.values);
        record.stamp = self.snapshot.stamp.time;
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.publish(record);
        }
    }
}

/// Read one field for every joint; on success replace the stored values.
fn refresh<T: LaneValue>(
    view: &BoardView<'_>,
    name: &'static str,
    field: &mut Field<T>,
    staging: &mut [T],
    read: impl FnMut(&CapabilitySet, &[usize], &mut [T]) -> CallResult<()>,
) {
    match view.read_into(staging, read) {
        Ok(()) => {
            field.values.copy_from_slice(staging);
            field.valid = true;
        }
        Err(err) => {
            field.valid = false;
            log_field(name, &err);
        }
    }
}

fn log_field(field: &'static str, err: &CallError) {
    match err {
        CallError::Unavailable(e) => debug!(field, "state field not collected: {e}"),
        other => warn!(field, "state field read failed: {other}"),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Joint names from axis info, `joint<N>` where a subdevice has none.
fn joint_names(view: &BoardView<'_>) -> Vec<String> {
    (0..view.joints())
        .map(|joint| {
            view.on_joint(joint as i64, |caps, axis| Ok(caps.axis_info()?.axis_name(axis)?))
                .unwrap_or_else(|_| fallback_joint_name(joint))
        })
        .collect()
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::batch::BatchEngine;
    use crate::capabilities::Capability;
    use crate::mock::MockController;
    use crate::registry::{RangeSpec, SubDeviceLayout, SubDeviceRegistry};

    fn registry(b_caps: impl FnOnce(CapabilitySet) -> CapabilitySet) -> (
        SubDeviceRegistry,
        Arc<MockController>,
        Arc<MockController>,
    ) {
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
        a.set_encoder_stamp(10.0);
        b.set_encoder_stamp(20.0);
        registry
            .attach("A", CapabilitySet::from_device(a.clone()))
            .unwrap();
        registry
            .attach("B", b_caps(CapabilitySet::from_device(b.clone())))
            .unwrap();
        (registry, a, b)
    }

    #[test]
    fn test_publishes_core_and_extended() {
        let (registry, a, b) = registry(|c| c);
        a.set_encoder_values(&[1.0, 2.0, 3.0]);
        b.set_encoder_values(&[4.0, 5.0, 6.0]);
        let batch = BatchEngine::for_registry(&registry);
        let view = BoardView::new(&registry, &batch, None);
        let latest = Arc::new(LatestState::new());
        let mut cycle = AggregationCycle::new(6, true, DEFAULT_BACKLOG_WARNING);
        cycle.set_publisher(latest.clone());

        let CycleOutcome::Published(stamp) = cycle.run(&view, 0) else {
            panic!("cycle skipped");
        };
        assert_eq!(stamp.sequence, 1);
        assert_eq!(stamp.time, 15.0);
        let (positions, core_stamp) = latest.state().unwrap();
        assert_eq!(positions, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(core_stamp, stamp);
        let snapshot = latest.snapshot().unwrap();
        assert!(snapshot.control_mode.valid);
        assert_eq!(snapshot.control_mode.values[4], ControlMode::POSITION);
    }

    #[test]
    fn test_missing_motor_encoders_only_clears_that_field() {
        let (registry, _, _) = registry(|c| c.without(Capability::MotorEncoders));
        let batch = BatchEngine::for_registry(&registry);
        let view = BoardView::new(&registry, &batch, None);
        let latest = Arc::new(LatestState::new());
        let mut cycle = AggregationCycle::new(6, true, DEFAULT_BACKLOG_WARNING);
        cycle.set_publisher(latest.clone());
        assert!(matches!(cycle.run(&view, 0), CycleOutcome::Published(_)));

        let snapshot = latest.snapshot().unwrap();
        assert!(!snapshot.motor_position.valid);
        assert!(!snapshot.motor_velocity.valid);
        assert!(snapshot.position.valid);
        assert!(snapshot.velocity.valid);
        assert!(snapshot.torque.valid);
        assert!(snapshot.current.valid);
    }

    #[test]
    fn test_failed_read_keeps_previous_values() {
        let (registry, a, _) = registry(|c| c);
        let batch = BatchEngine::for_registry(&registry);
        let view = BoardView::new(&registry, &batch, None);
        let mut cycle = AggregationCycle::new(6, true, DEFAULT_BACKLOG_WARNING);
        a.set_encoder_values(&[7.0, 8.0, 9.0]);
        cycle.run(&view, 0);
        a.fail(Capability::Encoders);
        a.set_encoder_values(&[0.0, 0.0, 0.0]);
        cycle.run(&view, 0);
        let position = &cycle.snapshot().position;
        assert!(!position.valid);
        assert_eq!(&position.values[..3], &[7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_idempotent_without_change() {
        let (registry, _, _) = registry(|c| c);
        let batch = BatchEngine::for_registry(&registry);
        let view = BoardView::new(&registry, &batch, None);
        let mut cycle = AggregationCycle::new(6, true, DEFAULT_BACKLOG_WARNING);
        cycle.run(&view, 0);
        let first = cycle.snapshot().clone();
        cycle.run(&view, 0);
        let second = cycle.snapshot().clone();
        assert_eq!(second.stamp.sequence, first.stamp.sequence + 1);
        assert_eq!(
            StateSnapshot {
                stamp: Stamp::default(),
                ..first
            },
            StateSnapshot {
                stamp: Stamp::default(),
                ..second
            }
        );
    }

    #[test]
    fn test_skipped_until_attached() {
        let (mut registry, _, _) = registry(|c| c);
        registry.detach("B").unwrap();
        let batch = BatchEngine::for_registry(&registry);
        let view = BoardView::new(&registry, &batch, None);
        let latest = Arc::new(LatestState::new());
        let mut cycle = AggregationCycle::new(6, false, DEFAULT_BACKLOG_WARNING);
        cycle.set_publisher(latest.clone());
        assert_eq!(cycle.run(&view, 0), CycleOutcome::Skipped);
        assert!(latest.state().is_none());
    }

    #[test]
    fn test_watchdog_counts_consecutive_overruns() {
        let mut dog = BacklogWatchdog::new(20);
        assert!(!dog.check(20));
        assert!(dog.check(21));
        assert!(dog.check(30));
        assert_eq!(dog.consecutive, 2);
        assert!(!dog.check(0));
        assert_eq!(dog.consecutive, 0);
    }

    #[test]
    fn test_bridge_gets_names_from_axis_info() {
        struct Capture(Arc<Mutex<Vec<JointStateRecord>>>);
        impl JointStateBridge for Capture {
            fn publish(&mut self, record: &JointStateRecord) {
                self.0.lock().unwrap().push(record.clone());
            }
        }

        let (registry, a, _) = registry(|c| c.without(Capability::AxisInfo));
        a.set_axis_name(1, "elbow");
        let batch = BatchEngine::for_registry(&registry);
        let view = BoardView::new(&registry, &batch, None);
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut cycle = AggregationCycle::new(6, false, DEFAULT_BACKLOG_WARNING);
        cycle.set_bridge(Box::new(Capture(sent.clone())));
        cycle.run(&view, 0);
        let records = sent.lock().unwrap();
        assert_eq!(
            records[0].names,
            vec!["axis0", "elbow", "axis2", "joint3", "joint4", "joint5"]
        );
        assert_eq!(records[0].stamp, 15.0);
    }
}
