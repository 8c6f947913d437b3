//! Lane configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BleError, Result};
use crate::protocol::{AdvertiseMode, ScanMode, TxPowerLevel};

// ----------------------------------------------------------------------------
// Radio Settings
// ----------------------------------------------------------------------------

/// Settings used every time advertising is (re)started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvertiseSettings {
    pub mode: AdvertiseMode,
    pub tx_power: TxPowerLevel,
    pub connectable: bool,
}

impl Default for AdvertiseSettings {
    fn default() -> Self {
        Self {
            mode: AdvertiseMode::LowPower,
            tx_power: TxPowerLevel::Medium,
            connectable: true,
        }
    }
}

/// Settings passed to the radio when a scan starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub mode: ScanMode,
    /// Report first-match and match-lost callbacks instead of every advertisement
    pub report_match_lost: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            mode: ScanMode::LowPower,
            report_match_lost: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the command lane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// Name used in log output for the lane's worker
    pub lane_name: String,
    /// Advertising policy
    pub advertise: AdvertiseSettings,
    /// Scan policy
    pub scan: ScanSettings,
    /// Upper bound on any single radio completion. `None` waits indefinitely.
    #[serde(with = "optional_millis")]
    pub operation_timeout: Option<Duration>,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            lane_name: "ble-lane".to_string(),
            advertise: AdvertiseSettings::default(),
            scan: ScanSettings::default(),
            operation_timeout: None,
        }
    }
}

impl LaneConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lane name
    pub fn with_lane_name(mut self, name: impl Into<String>) -> Self {
        self.lane_name = name.into();
        self
    }

    /// Set advertising policy
    pub fn with_advertise_settings(mut self, settings: AdvertiseSettings) -> Self {
        self.advertise = settings;
        self
    }

    /// Set scan policy
    pub fn with_scan_settings(mut self, settings: ScanSettings) -> Self {
        self.scan = settings;
        self
    }

    /// Bound every radio completion wait
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.lane_name.trim().is_empty() {
            return Err(BleError::InvalidPayload("lane name must not be empty".into()));
        }
        if self.operation_timeout == Some(Duration::ZERO) {
            return Err(BleError::InvalidPayload(
                "operation timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
