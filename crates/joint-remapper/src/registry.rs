//! Subdevice slots and the logical-joint lookup table.

use crate::capabilities::{Capability, CapabilitySet};
use crate::error::{AttachError, ConfigError, DeviceError, JointOutOfRange};
use serde::{Deserialize, Serialize};
use std::ops::{Range, RangeInclusive};
use tracing::{debug, info, warn};

/// Maps `wrapper_base..=wrapper_top` of the logical joint space onto
/// `device_base..=device_top` of the subdevice registered under `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub key: String,
    pub wrapper_base: usize,
    pub wrapper_top: usize,
    pub device_base: usize,
    pub device_top: usize,
}

impl RangeSpec {
    pub fn new(
        key: impl Into<String>,
        wrapper: (usize, usize),
        device: (usize, usize),
    ) -> Self {
        Self {
            key: key.into(),
            wrapper_base: wrapper.0,
            wrapper_top: wrapper.1,
            device_base: device.0,
            device_top: device.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubDeviceLayout {
    Explicit(Vec<RangeSpec>),
    /// One subdevice owning every joint one-to-one.
    FullSpan { key: String },
}

/// Where a logical joint lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointLocation {
    pub subdevice: usize,
    /// Device-local axis index.
    pub axis: usize,
}

pub struct SubDeviceSlot {
    key: String,
    wrapper_range: RangeInclusive<usize>,
    device_range: RangeInclusive<usize>,
    device_axes: Vec<usize>,
    caps: CapabilitySet,
    attached: bool,
}

impl SubDeviceSlot {
    fn from_spec(spec: &RangeSpec) -> Self {
        Self {
            key: spec.key.clone(),
            wrapper_range: spec.wrapper_base..=spec.wrapper_top,
            device_range: spec.device_base..=spec.device_top,
            device_axes: (spec.device_base..=spec.device_top).collect(),
            caps: CapabilitySet::default(),
            attached: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn wrapper_range(&self) -> &RangeInclusive<usize> {
        &self.wrapper_range
    }

    /// Logical joints of this slot as a half-open range, for slicing
    /// joint-indexed buffers.
    pub fn wrapper_span(&self) -> Range<usize> {
        *self.wrapper_range.start()..*self.wrapper_range.end() + 1
    }

    pub fn device_range(&self) -> &RangeInclusive<usize> {
        &self.device_range
    }

    /// Device-local axes in wrapper order.
    pub fn device_axes(&self) -> &[usize] {
        &self.device_axes
    }

    pub fn axis_count(&self) -> usize {
        self.device_axes.len()
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.caps
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

pub struct SubDeviceRegistry {
    joints: usize,
    slots: Vec<SubDeviceSlot>,
    lut: Vec<JointLocation>,
}

impl SubDeviceRegistry {
    /// Validate `layout` against `joints` and build the slots and LUT.
    pub fn configure(joints: usize, layout: SubDeviceLayout) -> Result<Self, ConfigError> {
        if joints == 0 {
            return Err(ConfigError::MissingParameter("joints"));
        }
        let specs = match layout {
            SubDeviceLayout::FullSpan { key } => {
                vec![RangeSpec::new(key, (0, joints - 1), (0, joints - 1))]
            }
            SubDeviceLayout::Explicit(specs) if specs.is_empty() => {
                return Err(ConfigError::MissingParameter("subdevices"));
            }
            SubDeviceLayout::Explicit(specs) => specs,
        };

        let mut owners: Vec<Option<JointLocation>> = vec![None; joints];
        let mut covered = 0usize;
        for (index, spec) in specs.iter().enumerate() {
            validate_spec(spec, joints)?;
            if specs[..index].iter().any(|s| s.key == spec.key) {
                return Err(ConfigError::DuplicateKey(spec.key.clone()));
            }
            for (offset, joint) in (spec.wrapper_base..=spec.wrapper_top).enumerate() {
                if let Some(previous) = owners[joint] {
                    return Err(ConfigError::OverlappingRanges {
                        joint,
                        first: specs[previous.subdevice].key.clone(),
                        second: spec.key.clone(),
                    });
                }
                owners[joint] = Some(JointLocation {
                    subdevice: index,
                    axis: spec.device_base + offset,
                });
            }
            covered += spec.wrapper_top - spec.wrapper_base + 1;
        }
        if covered != joints {
            return Err(ConfigError::JointCountMismatch {
                covered,
                expected: joints,
            });
        }
        let lut = owners
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(ConfigError::JointCountMismatch {
                covered,
                expected: joints,
            })?;

        let slots: Vec<SubDeviceSlot> = specs.iter().map(SubDeviceSlot::from_spec).collect();
        for slot in &slots {
            debug!(
                key = %slot.key,
                wrapper = ?slot.wrapper_range,
                device = ?slot.device_range,
                "configured subdevice"
            );
        }
        Ok(Self { joints, slots, lut })
    }

    pub fn joints(&self) -> usize {
        self.joints
    }

    pub fn slots(&self) -> &[SubDeviceSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&SubDeviceSlot> {
        self.slots.get(index)
    }

    pub fn max_axes(&self) -> usize {
        self.slots.iter().map(|s| s.axis_count()).max().unwrap_or(0)
    }

    pub fn position_of(&self, key: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.key == key)
    }

    pub fn all_attached(&self) -> bool {
        self.slots.iter().all(|s| s.attached)
    }

    /// Bounds-checked O(1) lookup.
    pub fn lookup(&self, joint: i64) -> Result<JointLocation, JointOutOfRange> {
        usize::try_from(joint)
            .ok()
            .and_then(|j| self.lut.get(j).copied())
            .ok_or(JointOutOfRange {
                joint,
                joints: self.joints,
            })
    }

    /// Bind `caps` to the slot registered under `key`. All-or-nothing: the
    /// slot is untouched unless every check passes.
    pub fn attach(&mut self, key: &str, caps: CapabilitySet) -> Result<(), AttachError> {
        let index = self
            .position_of(key)
            .ok_or_else(|| AttachError::UnknownSubDevice(key.to_string()))?;
        let slot = &self.slots[index];
        if slot.attached {
            return Err(AttachError::AlreadyAttached(key.to_string()));
        }
        let required = slot.axis_count().max(*slot.device_range.end() + 1);
        for capability in Capability::REQUIRED {
            let reported = required_axes(&caps, capability).map_err(|e| match e {
                AxesFailure::Missing => AttachError::MissingCapability {
                    key: key.to_string(),
                    capability,
                },
                AxesFailure::Device(source) => AttachError::Device {
                    key: key.to_string(),
                    source,
                },
            })?;
            if reported == 0 || reported < required {
                return Err(AttachError::AxisCount {
                    key: key.to_string(),
                    capability,
                    reported,
                    required,
                });
            }
        }

        for capability in Capability::ALL {
            if !caps.supports(capability) {
                debug!(key, %capability, "optional capability not exposed");
            }
        }
        info!(
            key,
            capabilities = caps.supported().len(),
            "subdevice attached"
        );
        let slot = &mut self.slots[index];
        slot.caps = caps;
        slot.attached = true;
        Ok(())
    }

    pub fn detach(&mut self, key: &str) -> Result<(), AttachError> {
        let index = self
            .position_of(key)
            .ok_or_else(|| AttachError::UnknownSubDevice(key.to_string()))?;
        let slot = &mut self.slots[index];
        if !slot.attached {
            warn!(key, "detach requested for a subdevice that is not attached");
        }
        slot.caps = CapabilitySet::default();
        slot.attached = false;
        info!(key, "subdevice detached");
        Ok(())
    }
}

fn validate_spec(spec: &RangeSpec, joints: usize) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidRange {
        key: spec.key.clone(),
        reason,
    };
    if spec.wrapper_base > spec.wrapper_top {
        return Err(invalid(format!(
            "wrapper base {} above top {}",
            spec.wrapper_base, spec.wrapper_top
        )));
    }
    if spec.device_base > spec.device_top {
        return Err(invalid(format!(
            "device base {} above top {}",
            spec.device_base, spec.device_top
        )));
    }
    if spec.wrapper_top >= joints {
        return Err(invalid(format!(
            "wrapper top {} beyond last joint {}",
            spec.wrapper_top,
            joints - 1
        )));
    }
    let axis_count = spec.device_top - spec.device_base + 1;
    let wrapper_count = spec.wrapper_top - spec.wrapper_base + 1;
    if axis_count != wrapper_count {
        return Err(invalid(format!(
            "{wrapper_count} wrapper joints mapped onto {axis_count} device axes"
        )));
    }
    Ok(())
}

enum AxesFailure {
    Missing,
    Device(DeviceError),
}

fn required_axes(caps: &CapabilitySet, capability: Capability) -> Result<usize, AxesFailure> {
    let reported = match capability {
        Capability::Position => caps.position().map_err(|_| AxesFailure::Missing)?.axes(),
        Capability::Velocity => caps.velocity().map_err(|_| AxesFailure::Missing)?.axes(),
        Capability::Encoders => caps.encoders().map_err(|_| AxesFailure::Missing)?.axes(),
        _ => return Err(AxesFailure::Missing),
    };
    reported.map_err(AxesFailure::Device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_slot_layout() -> SubDeviceLayout {
        SubDeviceLayout::Explicit(vec![
            RangeSpec::new("left", (0, 2), (0, 2)),
            RangeSpec::new("right", (3, 5), (1, 3)),
        ])
    }

    #[test]
    fn test_every_joint_maps_to_one_slot() {
        let reg = SubDeviceRegistry::configure(6, two_slot_layout()).unwrap();
        for joint in 0..6 {
            let loc = reg.lookup(joint).unwrap();
            let slot = reg.slot(loc.subdevice).unwrap();
            assert!(slot.wrapper_range().contains(&(joint as usize)));
        }
        assert_eq!(
            reg.lookup(4).unwrap(),
            JointLocation {
                subdevice: 1,
                axis: 2
            }
        );
        assert_eq!(reg.max_axes(), 3);
    }

    #[test]
    fn test_full_span_layout() {
        let reg = SubDeviceRegistry::configure(
            4,
            SubDeviceLayout::FullSpan {
                key: "board".into(),
            },
        )
        .unwrap();
        assert_eq!(reg.slots().len(), 1);
        assert_eq!(reg.lookup(3).unwrap().axis, 3);
    }

    #[test]
    fn test_gap_is_rejected() {
        let layout = SubDeviceLayout::Explicit(vec![
            RangeSpec::new("a", (0, 1), (0, 1)),
            RangeSpec::new("b", (3, 5), (0, 2)),
        ]);
        assert_eq!(
            SubDeviceRegistry::configure(6, layout).err(),
            Some(ConfigError::JointCountMismatch {
                covered: 5,
                expected: 6
            })
        );
    }

    #[test]
    fn test_overlap_is_rejected() {
        let layout = SubDeviceLayout::Explicit(vec![
            RangeSpec::new("a", (0, 3), (0, 3)),
            RangeSpec::new("b", (3, 5), (0, 2)),
        ]);
        assert!(matches!(
            SubDeviceRegistry::configure(6, layout),
            Err(ConfigError::OverlappingRanges { joint: 3, .. })
        ));
    }

    #[test]
    fn test_malformed_ranges_are_rejected() {
        let cases = vec![
            RangeSpec::new("a", (2, 1), (0, 1)),
            RangeSpec::new("a", (0, 1), (3, 2)),
            RangeSpec::new("a", (0, 6), (0, 6)),
            RangeSpec::new("a", (0, 1), (0, 2)),
        ];
        for spec in cases {
            let layout = SubDeviceLayout::Explicit(vec![spec]);
            assert!(matches!(
                SubDeviceRegistry::configure(6, layout),
                Err(ConfigError::InvalidRange { .. })
            ));
        }
    }

    #[test]
    fn test_missing_parameters() {
        assert_eq!(
            SubDeviceRegistry::configure(0, two_slot_layout()).err(),
            Some(ConfigError::MissingParameter("joints"))
        );
        assert_eq!(
            SubDeviceRegistry::configure(3, SubDeviceLayout::Explicit(vec![])).err(),
            Some(ConfigError::MissingParameter("subdevices"))
        );
    }

    #[test]
    fn test_duplicate_key() {
        let layout = SubDeviceLayout::Explicit(vec![
            RangeSpec::new("a", (0, 1), (0, 1)),
            RangeSpec::new("a", (2, 3), (0, 1)),
        ]);
        assert_eq!(
            SubDeviceRegistry::configure(4, layout).err(),
            Some(ConfigError::DuplicateKey("a".into()))
        );
        assert_eq!(
            ConfigError::DuplicateKey("a".into()).to_string(),
            "subdevice a listed twice"
        );
    }

    #[test]
    fn test_lookup_bounds() {
        let reg = SubDeviceRegistry::configure(6, two_slot_layout()).unwrap();
        assert_eq!(
            reg.lookup(6).err(),
            Some(JointOutOfRange { joint: 6, joints: 6 })
        );
        assert_eq!(
            reg.lookup(-1).err(),
            Some(JointOutOfRange {
                joint: -1,
                joints: 6
            })
        );
    }

    #[cfg(feature = "mock")]
    mod attach {
        use super::*;
        use crate::mock::MockController;
        use std::sync::Arc;

        #[test]
        fn test_double_attach_keeps_first_binding() {
            let mut reg = SubDeviceRegistry::configure(6, two_slot_layout()).unwrap();
            let first = Arc::new(MockController::new(3));
            reg.attach("left", CapabilitySet::from_device(first.clone()))
                .unwrap();
            let second = Arc::new(MockController::new(3));
            let err = reg
                .attach("left", CapabilitySet::from_device(second))
                .unwrap_err();
            assert_eq!(err, AttachError::AlreadyAttached("left".into()));

            let slot = reg.slot(0).unwrap();
            assert!(slot.is_attached());
            slot.capabilities()
                .position()
                .unwrap()
                .position_move(1, 12.0)
                .unwrap();
            assert_eq!(first.target(1), 12.0);
        }

        #[test]
        fn test_missing_required_capability_fails_whole_attach() {
            let mut reg = SubDeviceRegistry::configure(6, two_slot_layout()).unwrap();
            let caps = CapabilitySet::from_device(Arc::new(MockController::new(3)))
                .without(Capability::Velocity);
            let err = reg.attach("left", caps).unwrap_err();
            assert_eq!(
                err,
                AttachError::MissingCapability {
                    key: "left".into(),
                    capability: Capability::Velocity
                }
            );
            assert!(!reg.slot(0).unwrap().is_attached());
            assert!(reg.slot(0).unwrap().capabilities().is_empty());
        }

        #[test]
        fn test_too_few_axes() {
            let mut reg = SubDeviceRegistry::configure(6, two_slot_layout()).unwrap();
            // "right" maps device axes 1..=3 so it needs at least 4 axes.
            let caps = CapabilitySet::from_device(Arc::new(MockController::new(3)));
            assert!(matches!(
                reg.attach("right", caps),
                Err(AttachError::AxisCount {
                    reported: 3,
                    required: 4,
                    ..
                })
            ));
        }

        #[test]
        fn test_detach_then_reattach() {
            let mut reg = SubDeviceRegistry::configure(6, two_slot_layout()).unwrap();
            let dev = Arc::new(MockController::new(3));
            reg.attach("left", CapabilitySet::from_device(dev.clone()))
                .unwrap();
            reg.detach("left").unwrap();
            assert!(!reg.slot(0).unwrap().is_attached());
            assert!(reg.slot(0).unwrap().capabilities().is_empty());
            reg.attach("left", CapabilitySet::from_device(dev)).unwrap();
            assert!(reg.detach("nope").is_err());
        }
    }
}
