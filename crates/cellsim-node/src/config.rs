//! Node configuration.
//!
//! The binary loads a YAML file describing the devices to launch, the
//! access-point registry, and any SMS taps. Prefix overlap is a
//! configuration error and is rejected before anything launches.

use crate::command::DEFAULT_BRIDGE;
use crate::error::NodeError;
use crate::number::NumberPrefix;
use cellsim_common::Location;
use cellsim_radio::AccessPoint;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level node configuration.
#[derive(Debug, Default, Deserialize)]
pub struct NodeConfig {
    /// Devices to launch at startup.
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
    /// Access points to register.
    #[serde(default)]
    pub access_points: Vec<ApEntry>,
    /// SMS taps to open.
    #[serde(default)]
    pub taps: Vec<TapEntry>,
}

/// One device stanza.
#[derive(Debug, Deserialize)]
pub struct DeviceEntry {
    /// Device name, unique on this node.
    pub name: String,
    /// VM instance directory holding the guest sockets.
    pub instance_dir: PathBuf,
    /// Telephone number prefix; empty for the whole 10-digit space.
    #[serde(default)]
    pub prefix: String,
}

/// One access-point stanza.
#[derive(Debug, Deserialize)]
pub struct ApEntry {
    /// Network name.
    pub ssid: String,
    /// Backing VLAN.
    pub vlan: u32,
    /// Bridge carrying the VLAN.
    #[serde(default = "default_bridge")]
    pub bridge: String,
    /// Transmitter position; omitted for universal APs.
    #[serde(default)]
    pub location: Option<LocationEntry>,
    /// Transmitter EIRP in milliwatts; 0 means universal.
    #[serde(default)]
    pub milliwatts: f64,
}

/// A transmitter position.
#[derive(Debug, Deserialize)]
pub struct LocationEntry {
    pub lat: f64,
    pub long: f64,
}

/// One tap stanza.
#[derive(Debug, Deserialize)]
pub struct TapEntry {
    /// Low end of the claimed number range.
    pub low: i64,
    /// High end of the claimed number range.
    pub high: i64,
    /// File the tap appends to.
    pub path: PathBuf,
}

fn default_bridge() -> String {
    DEFAULT_BRIDGE.to_string()
}

impl NodeConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<NodeConfig, NodeError> {
        let text = std::fs::read_to_string(path)?;
        let config: NodeConfig = serde_yaml::from_str(&text)
            .map_err(|err| NodeError::Config(format!("{}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject overlapping number prefixes before anything launches.
    pub fn validate(&self) -> Result<(), NodeError> {
        let mut prefixes: Vec<NumberPrefix> = Vec::new();
        for device in &self.devices {
            let prefix: NumberPrefix = device.prefix.parse()?;
            if let Some(existing) = prefixes.iter().find(|p| **p != prefix && p.overlaps(&prefix))
            {
                return Err(NodeError::OverlappingPrefixes(*existing, prefix));
            }
            prefixes.push(prefix);
        }
        Ok(())
    }
}

impl ApEntry {
    /// Convert to the registry's access-point form.
    pub fn to_access_point(&self) -> AccessPoint {
        match (&self.location, self.milliwatts) {
            (Some(loc), mw) if mw > 0.0 => AccessPoint::located(
                self.ssid.clone(),
                self.vlan,
                self.bridge.clone(),
                Location::new(loc.lat, loc.long, 1.0),
                mw,
            ),
            _ => AccessPoint::universal(self.ssid.clone(), self.vlan, self.bridge.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_validate() {
        let yaml = r#"
devices:
  - name: phone0
    instance_dir: /tmp/vm/0
    prefix: "223344"
  - name: phone1
    instance_dir: /tmp/vm/1
    prefix: "223345"
access_points:
  - ssid: corp
    vlan: 100
  - ssid: corner
    vlan: 20
    bridge: br1
    location: { lat: 37.75, long: -122.44 }
    milliwatts: 200
taps:
  - { low: 5550000, high: 5559999, path: /tmp/tap.out }
"#;
        let config: NodeConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.devices.len(), 2);
        let corp = config.access_points[0].to_access_point();
        assert!(corp.is_universal());
        assert_eq!(corp.bridge, DEFAULT_BRIDGE);
        let corner = config.access_points[1].to_access_point();
        assert!(!corner.is_universal());
        assert_eq!(corner.power_dbm, 23);
    }

    #[test]
    fn test_overlapping_prefixes_rejected() {
        let yaml = r#"
devices:
  - { name: a, instance_dir: /tmp/a, prefix: "223344" }
  - { name: b, instance_dir: /tmp/b, prefix: "22334" }
"#;
        let config: NodeConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(NodeError::OverlappingPrefixes(_, _))
        ));
    }

    #[test]
    fn test_same_prefix_twice_is_fine() {
        let yaml = r#"
devices:
  - { name: a, instance_dir: /tmp/a, prefix: "223344" }
  - { name: b, instance_dir: /tmp/b, prefix: "223344" }
"#;
        let config: NodeConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
    }
}
