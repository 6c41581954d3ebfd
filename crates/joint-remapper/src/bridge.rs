//! Joint-state export to an external time-series bridge.
//!
//! The aggregation cycle hands over values in controller units (degrees);
//! [`RadianBridge`] converts before forwarding to the actual sink.

use serde::{Deserialize, Serialize};

/// Reduced joint state for the bridge topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointStateRecord {
    pub names: Vec<String>,
    pub position: Vec<f64>,
    pub velocity: Vec<f64>,
    pub torque: Vec<f64>,
    /// Seconds since the UNIX epoch.
    pub stamp: f64,
}

pub trait JointStateBridge: Send {
    fn publish(&mut self, record: &JointStateRecord);
}

/// Where a bridge publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub node: String,
    pub topic: String,
    /// Overrides the names reported by the subdevices.
    #[serde(default)]
    pub joint_names: Option<Vec<String>>,
}

/// Degrees to radians for position and velocity; torque passes through.
pub struct RadianBridge<S> {
    config: BridgeConfig,
    sink: S,
    converted: JointStateRecord,
}

impl<S: JointStateBridge> RadianBridge<S> {
    pub fn new(config: BridgeConfig, sink: S) -> Self {
        Self {
            config,
            sink,
            converted: JointStateRecord::default(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: JointStateBridge> JointStateBridge for RadianBridge<S> {
    fn publish(&mut self, record: &JointStateRecord) {
        let out = &mut self.converted;
        out.names.clone_from(self.config.joint_names.as_ref().unwrap_or(&record.names));
        out.position.clear();
        out.position
            .extend(record.position.iter().map(|d| d.to_radians()));
        out.velocity.clear();
        out.velocity
            .extend(record.velocity.iter().map(|d| d.to_radians()));
        out.torque.clone_from(&record.torque);
        out.stamp = record.stamp;
        self.sink.publish(out);
    }
}

/// Name for joint `index` when the subdevice reports none.
pub fn fallback_joint_name(index: usize) -> String {
    format!("joint{index}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[derive(Default)]
    struct Capture(Vec<JointStateRecord>);

    impl JointStateBridge for Capture {
        fn publish(&mut self, record: &JointStateRecord) {
            self.0.push(record.clone());
        }
    }

    fn config(names: Option<Vec<String>>) -> BridgeConfig {
        BridgeConfig {
            node: "/remapper".into(),
            topic: "/joint_states".into(),
            joint_names: names,
        }
    }

    #[test]
    fn test_degrees_become_radians() {
        let mut bridge = RadianBridge::new(config(None), Capture::default());
        bridge.publish(&JointStateRecord {
            names: vec!["a".into(), "b".into()],
            position: vec![180.0, -90.0],
            velocity: vec![360.0, 0.0],
            torque: vec![1.5, -2.0],
            stamp: 12.0,
        });
        let sent = &bridge.sink().0[0];
        assert!((sent.position[0] - PI).abs() < 1e-12);
        assert!((sent.position[1] + PI / 2.0).abs() < 1e-12);
        assert!((sent.velocity[0] - 2.0 * PI).abs() < 1e-12);
        assert_eq!(sent.torque, vec![1.5, -2.0]);
        assert_eq!(sent.names, vec!["a", "b"]);
        assert_eq!(sent.stamp, 12.0);
    }

    #[test]
    fn test_configured_names_win() {
        let mut bridge = RadianBridge::new(
            config(Some(vec!["shoulder".into()])),
            Capture::default(),
        );
        bridge.publish(&JointStateRecord {
            names: vec![fallback_joint_name(0)],
            position: vec![0.0],
            velocity: vec![0.0],
            torque: vec![0.0],
            stamp: 0.0,
        });
        assert_eq!(bridge.sink().0[0].names, vec!["shoulder"]);
    }
}
