//! Error types for the command lane

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{AdvertiseFailure, GattStatus, ScanFailure};

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors surfaced by lane operations
///
/// Raw radio codes are already mapped into [`GattStatus`], [`AdvertiseFailure`]
/// or [`ScanFailure`] by the time they land here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BleError {
    #[error("Bluetooth is currently disabled.")]
    RadioDisabled,

    #[error("This device does not support multiple advertisement.")]
    FeatureUnsupported,

    #[error("Unable to open GATT server.")]
    ServerOpenFailed,

    #[error("Unable to create service. Code {}", .0.code())]
    ServiceRegistrationFailed(GattStatus),

    #[error("Connection failed. {0}")]
    ConnectionFailed(GattStatus),

    #[error("The connection to this device was lost.")]
    ConnectionLost,

    #[error("Unable to request a connection to this device.")]
    ConnectRequestFailed,

    #[error("Service discovery failed. {0}")]
    ServiceDiscoveryFailed(GattStatus),

    #[error("Characteristic read failed. {0}")]
    CharacteristicReadFailed(GattStatus),

    #[error("The specified service was not found.")]
    ServiceNotFound,

    #[error("The specified characteristic was not found.")]
    CharacteristicNotFound,

    #[error("Access to Fine Location has not been granted. This is needed in order to search for nearby Bluetooth devices.")]
    PermissionDenied,

    #[error("Another scan was started.")]
    ScanAlreadyActive,

    #[error("Unable to start advertising. {0}")]
    AdvertiseFailed(AdvertiseFailure),

    #[error("Unable to start scan. {0}")]
    ScanFailed(ScanFailure),

    #[error("{operation} did not complete within {after_ms}ms")]
    OperationTimedOut {
        operation: &'static str,
        after_ms: u64,
    },

    #[error("Radio rejected the request: {0}")]
    Radio(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("The command lane has shut down.")]
    LaneClosed,
}

impl BleError {
    /// Stable snake_case code for the external request/response surface
    pub fn kind(&self) -> &'static str {
        match self {
            BleError::RadioDisabled => "radio_disabled",
            BleError::FeatureUnsupported => "feature_unsupported",
            BleError::ServerOpenFailed => "server_open_failed",
            BleError::ServiceRegistrationFailed(_) => "service_registration_failed",
            BleError::ConnectionFailed(_) => "connection_failed",
            BleError::ConnectionLost => "connection_lost",
            BleError::ConnectRequestFailed => "connect_request_failed",
            BleError::ServiceDiscoveryFailed(_) => "service_discovery_failed",
            BleError::CharacteristicReadFailed(_) => "characteristic_read_failed",
            BleError::ServiceNotFound => "service_not_found",
            BleError::CharacteristicNotFound => "characteristic_not_found",
            BleError::PermissionDenied => "permission_denied",
            BleError::ScanAlreadyActive => "scan_already_active",
            BleError::AdvertiseFailed(_) => "advertise_failed",
            BleError::ScanFailed(_) => "scan_failed",
            BleError::OperationTimedOut { .. } => "operation_timed_out",
            BleError::Radio(_) => "radio",
            BleError::InvalidPayload(_) => "invalid_payload",
            BleError::LaneClosed => "lane_closed",
        }
    }
}

impl From<serde_json::Error> for BleError {
    fn from(err: serde_json::Error) -> Self {
        BleError::InvalidPayload(err.to_string())
    }
}

/// Result type for lane operations
pub type Result<T> = std::result::Result<T, BleError>;

// ----------------------------------------------------------------------------
// Structured Failure
// ----------------------------------------------------------------------------

/// Failure shape handed to the request/response surface instead of a raw error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: String,
    pub message: String,
}

impl From<&BleError> for Failure {
    fn from(err: &BleError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<BleError> for Failure {
    fn from(err: BleError) -> Self {
        Failure::from(&err)
    }
}
