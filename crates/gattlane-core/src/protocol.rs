//! Radio status codes, settings enums and their human-readable mapping
//!
//! Raw codes reported by the radio are converted here exactly once. Everything
//! above this module works with the typed values and their fixed messages.

use std::fmt;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// GATT Status
// ----------------------------------------------------------------------------

/// Status reported by the radio for a GATT operation or response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GattStatus {
    Success,
    ReadNotPermitted,
    WriteNotPermitted,
    InsufficientAuthentication,
    RequestNotSupported,
    InvalidOffset,
    InvalidAttributeLength,
    InsufficientEncryption,
    ConnectionCongested,
    Failure,
    /// Any code without a dedicated mapping
    Other(i32),
}

impl GattStatus {
    pub const SUCCESS: i32 = 0x00;
    pub const READ_NOT_PERMITTED: i32 = 0x02;
    pub const WRITE_NOT_PERMITTED: i32 = 0x03;
    pub const INSUFFICIENT_AUTHENTICATION: i32 = 0x05;
    pub const REQUEST_NOT_SUPPORTED: i32 = 0x06;
    pub const INVALID_OFFSET: i32 = 0x07;
    pub const INVALID_ATTRIBUTE_LENGTH: i32 = 0x0d;
    pub const INSUFFICIENT_ENCRYPTION: i32 = 0x0f;
    pub const CONNECTION_CONGESTED: i32 = 0x8f;
    pub const FAILURE: i32 = 0x101;

    /// Map a raw radio status code
    pub fn from_code(code: i32) -> Self {
        match code {
            Self::SUCCESS => GattStatus::Success,
            Self::READ_NOT_PERMITTED => GattStatus::ReadNotPermitted,
            Self::WRITE_NOT_PERMITTED => GattStatus::WriteNotPermitted,
            Self::INSUFFICIENT_AUTHENTICATION => GattStatus::InsufficientAuthentication,
            Self::REQUEST_NOT_SUPPORTED => GattStatus::RequestNotSupported,
            Self::INVALID_OFFSET => GattStatus::InvalidOffset,
            Self::INVALID_ATTRIBUTE_LENGTH => GattStatus::InvalidAttributeLength,
            Self::INSUFFICIENT_ENCRYPTION => GattStatus::InsufficientEncryption,
            Self::CONNECTION_CONGESTED => GattStatus::ConnectionCongested,
            Self::FAILURE => GattStatus::Failure,
            other => GattStatus::Other(other),
        }
    }

    /// Raw code as understood by the radio
    pub fn code(&self) -> i32 {
        match self {
            GattStatus::Success => Self::SUCCESS,
            GattStatus::ReadNotPermitted => Self::READ_NOT_PERMITTED,
            GattStatus::WriteNotPermitted => Self::WRITE_NOT_PERMITTED,
            GattStatus::InsufficientAuthentication => Self::INSUFFICIENT_AUTHENTICATION,
            GattStatus::RequestNotSupported => Self::REQUEST_NOT_SUPPORTED,
            GattStatus::InvalidOffset => Self::INVALID_OFFSET,
            GattStatus::InvalidAttributeLength => Self::INVALID_ATTRIBUTE_LENGTH,
            GattStatus::InsufficientEncryption => Self::INSUFFICIENT_ENCRYPTION,
            GattStatus::ConnectionCongested => Self::CONNECTION_CONGESTED,
            GattStatus::Failure => Self::FAILURE,
            GattStatus::Other(code) => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GattStatus::Success)
    }

    /// Human-readable description, `None` for success
    pub fn message(&self) -> Option<&'static str> {
        let text = match self {
            GattStatus::Success => return None,
            GattStatus::ConnectionCongested => "The connection is congested.",
            GattStatus::InsufficientAuthentication => "Insufficient authentication.",
            GattStatus::InsufficientEncryption => "Insufficient encryption.",
            GattStatus::InvalidAttributeLength => "Invalid attribute length.",
            GattStatus::InvalidOffset => "Invalid offset.",
            GattStatus::WriteNotPermitted => "Write not permitted.",
            GattStatus::ReadNotPermitted => "Read not permitted.",
            GattStatus::RequestNotSupported => "Request not supported.",
            GattStatus::Failure | GattStatus::Other(_) => "An unknown error occurred.",
        };
        Some(text)
    }
}

impl fmt::Display for GattStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(text) => write!(f, "{} (code {})", text, self.code()),
            None => write!(f, "Success"),
        }
    }
}

// ----------------------------------------------------------------------------
// Advertise / Scan Failures
// ----------------------------------------------------------------------------

/// Reason the radio refused to start advertising
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvertiseFailure {
    DataTooLarge,
    TooManyAdvertisers,
    AlreadyStarted,
    InternalError,
    FeatureUnsupported,
    Other(i32),
}

impl AdvertiseFailure {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => AdvertiseFailure::DataTooLarge,
            2 => AdvertiseFailure::TooManyAdvertisers,
            3 => AdvertiseFailure::AlreadyStarted,
            4 => AdvertiseFailure::InternalError,
            5 => AdvertiseFailure::FeatureUnsupported,
            other => AdvertiseFailure::Other(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AdvertiseFailure::DataTooLarge => 1,
            AdvertiseFailure::TooManyAdvertisers => 2,
            AdvertiseFailure::AlreadyStarted => 3,
            AdvertiseFailure::InternalError => 4,
            AdvertiseFailure::FeatureUnsupported => 5,
            AdvertiseFailure::Other(code) => *code,
        }
    }
}

impl fmt::Display for AdvertiseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AdvertiseFailure::DataTooLarge => "The advertisement data is too large.",
            AdvertiseFailure::TooManyAdvertisers => "No advertising instance is available.",
            AdvertiseFailure::AlreadyStarted => "Advertising has already been started.",
            AdvertiseFailure::InternalError => "An internal error occurred.",
            AdvertiseFailure::FeatureUnsupported => "This feature is not supported on this device.",
            AdvertiseFailure::Other(_) => "An unknown error occurred.",
        };
        write!(f, "{} Code {}", text, self.code())
    }
}

/// Reason the radio ended or refused a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanFailure {
    AlreadyStarted,
    ApplicationRegistrationFailed,
    InternalError,
    FeatureUnsupported,
    Other(i32),
}

impl ScanFailure {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ScanFailure::AlreadyStarted,
            2 => ScanFailure::ApplicationRegistrationFailed,
            3 => ScanFailure::InternalError,
            4 => ScanFailure::FeatureUnsupported,
            other => ScanFailure::Other(other),
        }
    }
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ScanFailure::AlreadyStarted => "Another scan has already been started.",
            ScanFailure::ApplicationRegistrationFailed => {
                "Unable to register the application. Maybe permission has not been granted?"
            }
            ScanFailure::InternalError => "An internal error occurred.",
            ScanFailure::FeatureUnsupported => "This feature is not supported on this device.",
            ScanFailure::Other(_) => "An unknown error occurred.",
        };
        f.write_str(text)
    }
}

// ----------------------------------------------------------------------------
// Radio Settings
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvertiseMode {
    #[default]
    LowPower,
    Balanced,
    LowLatency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxPowerLevel {
    UltraLow,
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    #[default]
    LowPower,
    Balanced,
    LowLatency,
}

/// Whether a scan callback reports a new/updated match or a lost one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCallbackType {
    FirstMatch,
    AllMatches,
    MatchLost,
}

/// Link state reported alongside a connection-state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gatt_status_codes_map_both_ways() {
        for code in [0x00, 0x02, 0x03, 0x05, 0x06, 0x07, 0x0d, 0x0f, 0x8f, 0x101, 0x85] {
            assert_eq!(GattStatus::from_code(code).code(), code);
        }
        assert_eq!(GattStatus::from_code(0x85), GattStatus::Other(0x85));
    }

    #[test]
    fn test_gatt_status_messages() {
        assert_eq!(GattStatus::Success.message(), None);
        assert_eq!(
            GattStatus::ConnectionCongested.message(),
            Some("The connection is congested.")
        );
        assert_eq!(
            GattStatus::Other(133).message(),
            Some("An unknown error occurred.")
        );
        assert_eq!(
            GattStatus::InvalidOffset.to_string(),
            "Invalid offset. (code 7)"
        );
    }

    #[test]
    fn test_scan_failure_messages() {
        assert_eq!(
            ScanFailure::from_code(1).to_string(),
            "Another scan has already been started."
        );
        assert_eq!(ScanFailure::from_code(42), ScanFailure::Other(42));
    }

    #[test]
    fn test_advertise_failure_round_trip() {
        assert_eq!(AdvertiseFailure::from_code(5), AdvertiseFailure::FeatureUnsupported);
        assert_eq!(AdvertiseFailure::Other(9).code(), 9);
    }
}
