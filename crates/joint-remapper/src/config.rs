//! YAML configuration of a wrapper instance.

use crate::aggregation::DEFAULT_BACKLOG_WARNING;
use crate::bridge::BridgeConfig;
use crate::error::ConfigError;
use crate::registry::{RangeSpec, SubDeviceLayout};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PERIOD_MS: u64 = 20;

/// One `subdevices` entry: `{key, wrapper: [base, top], device: [base, top]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubDeviceEntry {
    pub key: String,
    pub wrapper: [usize; 2],
    pub device: [usize; 2],
}

impl From<&SubDeviceEntry> for RangeSpec {
    fn from(entry: &SubDeviceEntry) -> Self {
        RangeSpec::new(
            entry.key.clone(),
            (entry.wrapper[0], entry.wrapper[1]),
            (entry.device[0], entry.device[1]),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrapperConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub joints: usize,
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    #[serde(default = "default_true")]
    pub extended_output: bool,
    #[serde(default = "default_backlog_warning")]
    pub backlog_warning: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdevices: Option<Vec<SubDeviceEntry>>,
    /// Key of a single subdevice owning every joint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdevice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<BridgeConfig>,
}

fn default_name() -> String {
    "remapper".to_string()
}

fn default_period_ms() -> u64 {
    DEFAULT_PERIOD_MS
}

fn default_true() -> bool {
    true
}

fn default_backlog_warning() -> usize {
    DEFAULT_BACKLOG_WARNING
}

impl WrapperConfig {
    /// A config with defaults and no layout.
    pub fn new(name: impl Into<String>, joints: usize) -> Self {
        Self {
            name: name.into(),
            joints,
            period_ms: DEFAULT_PERIOD_MS,
            extended_output: true,
            backlog_warning: DEFAULT_BACKLOG_WARNING,
            subdevices: None,
            subdevice: None,
            bridge: None,
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Explicit ranges win over the single-subdevice shorthand.
    pub fn to_layout(&self) -> Result<SubDeviceLayout, ConfigError> {
        if self.joints == 0 {
            return Err(ConfigError::MissingParameter("joints"));
        }
        match (&self.subdevices, &self.subdevice) {
            (Some(entries), _) if !entries.is_empty() => Ok(SubDeviceLayout::Explicit(
                entries.iter().map(RangeSpec::from).collect(),
            )),
            (_, Some(key)) => Ok(SubDeviceLayout::FullSpan { key: key.clone() }),
            _ => Err(ConfigError::MissingParameter("subdevices")),
        }
    }
}

pub fn load_config_str(raw: &str) -> anyhow::Result<WrapperConfig> {
    let config: WrapperConfig = serde_yaml::from_str(raw).context("decoding wrapper config")?;
    config.to_layout()?;
    Ok(config)
}

pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<WrapperConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    load_config_str(&raw).with_context(|| format!("loading config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_layout_with_defaults() {
        let raw = r#"
joints: 6
subdevices:
  - { key: left, wrapper: [0, 2], device: [0, 2] }
  - { key: right, wrapper: [3, 5], device: [1, 3] }
"#;
        let config = load_config_str(raw).unwrap();
        assert_eq!(config.name, "remapper");
        assert_eq!(config.period(), Duration::from_millis(20));
        assert!(config.extended_output);
        assert_eq!(config.backlog_warning, 20);
        let SubDeviceLayout::Explicit(ranges) = config.to_layout().unwrap() else {
            panic!("expected explicit layout");
        };
        assert_eq!(ranges[1], RangeSpec::new("right", (3, 5), (1, 3)));
    }

    #[test]
    fn test_full_span_and_bridge() {
        let raw = r#"
name: torso
joints: 3
period_ms: 10
extended_output: false
subdevice: torso_mc
bridge:
  node: /torso
  topic: /torso/joint_states
"#;
        let config = load_config_str(raw).unwrap();
        assert_eq!(
            config.to_layout().unwrap(),
            SubDeviceLayout::FullSpan {
                key: "torso_mc".into()
            }
        );
        assert!(!config.extended_output);
        assert_eq!(config.bridge.unwrap().joint_names, None);
    }

    #[test]
    fn test_missing_layout() {
        let config = WrapperConfig::new("arm", 4);
        assert_eq!(
            config.to_layout(),
            Err(ConfigError::MissingParameter("subdevices"))
        );
        assert!(load_config_str("joints: 4\n").is_err());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = load_config_file("/nonexistent/remapper.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/remapper.yaml"));
    }
}
