//! gattlane CLI configuration
//!
//! Loaded from a TOML file. Every section is optional:
//!
//! ```toml
//! [lane]
//! lane_name = "ble-lane"
//! operation_timeout = 5000
//!
//! [logging]
//! verbose = false
//! show_target = false
//!
//! [radio]
//! enabled = true
//! multi_advertisement = true
//!
//! [[radio.peers]]
//! address = "AA:BB:CC:DD:EE:01"
//! name = "thermometer"
//!
//! [[radio.peers.services]]
//! uuid = "environment"
//! characteristics = [{ uuid = "temperature", value = "21.5" }]
//! ```
//!
//! Uuid fields accept a uuid or a name; names map to stable name-based uuids.

use std::path::Path;

use anyhow::Context;
use gattlane_core::{named_uuid, CharacteristicSpec, LaneConfig, LocalService};
use gattlane_harness::{SimulatedRadioConfig, VirtualPeer};
use serde::Deserialize;

use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub lane: LaneConfig,
    pub logging: LoggingConfig,
    pub radio: RadioConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log at DEBUG instead of INFO
    pub verbose: bool,
    /// Include the module target in each line
    pub show_target: bool,
}

/// Simulated radio and the peers around it
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub enabled: bool,
    pub multi_advertisement: bool,
    pub location_permission: bool,
    pub latency_ms: u64,
    pub peers: Vec<PeerConfig>,
}

impl Default for RadioConfig {
    fn default() -> Self {
        let radio = SimulatedRadioConfig::default();
        Self {
            enabled: radio.enabled,
            multi_advertisement: radio.multi_advertisement,
            location_permission: radio.location_permission,
            latency_ms: radio.latency_ms,
            peers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeerConfig {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_rssi")]
    pub rssi: i16,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub uuid: String,
    #[serde(default)]
    pub characteristics: Vec<CharacteristicConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CharacteristicConfig {
    pub uuid: String,
    /// UTF-8 value served to reads. Without one the characteristic is write-only.
    #[serde(default)]
    pub value: Option<String>,
}

fn default_rssi() -> i16 {
    -60
}

// ----------------------------------------------------------------------------
// Loading
// ----------------------------------------------------------------------------

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.lane
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;
        for peer in &self.radio.peers {
            if peer.address.is_empty() {
                return Err(CliError::Config("peer address must not be empty".into()));
            }
        }
        Ok(())
    }
}

impl RadioConfig {
    pub fn simulated(&self) -> SimulatedRadioConfig {
        SimulatedRadioConfig {
            enabled: self.enabled,
            multi_advertisement: self.multi_advertisement,
            location_permission: self.location_permission,
            latency_ms: self.latency_ms,
        }
    }

    pub fn virtual_peers(&self) -> Vec<VirtualPeer> {
        self.peers.iter().map(PeerConfig::to_virtual_peer).collect()
    }
}

impl PeerConfig {
    pub fn to_virtual_peer(&self) -> VirtualPeer {
        let mut peer = VirtualPeer::new(self.address.clone()).with_rssi(self.rssi);
        if let Some(name) = &self.name {
            peer = peer.with_name(name.clone());
        }
        for service in &self.services {
            peer = peer.with_service(service.to_local_service());
        }
        peer
    }
}

impl ServiceConfig {
    pub fn to_local_service(&self) -> LocalService {
        self.characteristics
            .iter()
            .fold(LocalService::new(named_uuid(&self.uuid)), |service, c| {
                let uuid = named_uuid(&c.uuid);
                service.with_characteristic(match &c.value {
                    Some(value) => CharacteristicSpec::readable(uuid, value.as_bytes()),
                    None => CharacteristicSpec::writable(uuid),
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.lane.lane_name, "ble-lane");
        assert!(config.radio.enabled);
        assert!(config.radio.peers.is_empty());
    }

    #[test]
    fn test_peers_and_named_uuids() {
        let config = AppConfig::from_toml(
            r#"
            [lane]
            operation_timeout = 250

            [[radio.peers]]
            address = "AA:BB"
            name = "thermometer"

            [[radio.peers.services]]
            uuid = "environment"
            characteristics = [{ uuid = "temperature", value = "21.5" }, { uuid = "reset" }]
            "#,
        )
        .unwrap();

        assert_eq!(config.lane.operation_timeout, Some(Duration::from_millis(250)));
        let peer = config.radio.virtual_peers().remove(0);
        assert_eq!(peer.rssi, -60);
        assert_eq!(
            peer.value_of(named_uuid("environment"), named_uuid("temperature")),
            Some(b"21.5".to_vec())
        );
        assert_eq!(peer.value_of(named_uuid("environment"), named_uuid("reset")), None);
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = AppConfig::from_toml("[lane]\noperation_timeout = 0\n").unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
