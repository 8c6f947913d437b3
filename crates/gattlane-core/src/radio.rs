//! Radio adapter contract
//!
//! The adapter is a thin capability surface over the platform's BLE stack. It is
//! not required to be safe under concurrent calls: the lane is the only caller of
//! every request method. Completions are reported later, from the adapter's own
//! notification context, through the sink handed over with each request:
//!
//! ```text
//! lane ──request──▶ RadioAdapter ──(later, other thread)──▶ sink.dispatch(event)
//!                                                              │
//!                                          resolves the pending CompletionCell
//! ```

use smallvec::SmallVec;
use uuid::Uuid;

use crate::advertiser::AdvertiseListener;
use crate::config::{AdvertiseSettings, ScanSettings};
use crate::connection::ConnectionCallbacks;
use crate::error::Result;
use crate::protocol::{AdvertiseFailure, GattStatus, LinkState};
use crate::router::GattServerRouter;
use crate::scan::ScanSink;
use crate::service::LocalService;

// ----------------------------------------------------------------------------
// Opaque Handles
// ----------------------------------------------------------------------------

/// Open local GATT server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerHandle(pub u64);

/// Running scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanHandle(pub u64);

/// GATT client link to a remote peer. May be recreated across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportHandle(pub u64);

// ----------------------------------------------------------------------------
// Payloads
// ----------------------------------------------------------------------------

/// Advertisement (or scan response) content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisePayload {
    pub service_uuids: SmallVec<[Uuid; 4]>,
}

impl AdvertisePayload {
    pub fn from_services(uuids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            service_uuids: uuids.into_iter().collect(),
        }
    }
}

/// Service found on a remote peer during discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

/// Which kind of attribute a server request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Characteristic,
    Descriptor,
}

/// Response sent back to a remote central for a server request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattResponse {
    pub device: String,
    pub request_id: i32,
    pub status: GattStatus,
    pub offset: u16,
    pub value: Option<Vec<u8>>,
}

// ----------------------------------------------------------------------------
// Radio Events
// ----------------------------------------------------------------------------

/// Event reported for the local GATT server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    ServiceAdded {
        status: GattStatus,
        service: Uuid,
    },
    ReadRequest {
        device: String,
        request_id: i32,
        offset: u16,
        attribute: AttributeKind,
        uuid: Uuid,
        /// Value stored on the attribute, if any
        value: Option<Vec<u8>>,
    },
    WriteRequest {
        device: String,
        request_id: i32,
        attribute: AttributeKind,
        uuid: Uuid,
        prepared: bool,
        response_needed: bool,
        offset: u16,
        value: Vec<u8>,
    },
    ExecuteWrite {
        device: String,
        request_id: i32,
        execute: bool,
    },
    /// A remote central connected to or left the local server
    ConnectionStateChanged {
        device: String,
        status: GattStatus,
        state: LinkState,
    },
    MtuChanged {
        device: String,
        mtu: u16,
    },
    NotificationSent {
        device: String,
        status: GattStatus,
    },
}

/// Event reported for an outbound connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    StateChanged {
        status: GattStatus,
        state: LinkState,
    },
    ServicesDiscovered {
        status: GattStatus,
    },
    CharacteristicRead {
        status: GattStatus,
        service: Uuid,
        characteristic: Uuid,
        value: Vec<u8>,
    },
}

/// Outcome of an advertising start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseEvent {
    StartSuccess,
    StartFailure(AdvertiseFailure),
}

// ----------------------------------------------------------------------------
// Adapter Trait
// ----------------------------------------------------------------------------

/// Capability surface over the platform's BLE primitives
///
/// Request methods return as soon as the request is handed to the radio. Their
/// completions arrive through the sink passed with the request (or, for the GATT
/// server and client, the sink registered when the server or link was opened).
pub trait RadioAdapter: Send + Sync {
    fn is_radio_enabled(&self) -> bool;

    fn supports_multi_advertisement(&self) -> bool;

    /// Whether the host granted the permission needed to scan or connect
    fn has_location_permission(&self) -> bool {
        true
    }

    fn open_gatt_server(&self, router: GattServerRouter) -> Result<ServerHandle>;

    fn close_gatt_server(&self, server: ServerHandle);

    /// Completion: [`ServerEvent::ServiceAdded`]
    fn add_service(&self, server: ServerHandle, service: &LocalService) -> Result<()>;

    fn remove_service(&self, server: ServerHandle, service: Uuid);

    fn send_response(&self, response: GattResponse);

    /// Completion: [`AdvertiseEvent`] on `listener`
    fn start_advertising(
        &self,
        settings: &AdvertiseSettings,
        data: &AdvertisePayload,
        scan_response: &AdvertisePayload,
        listener: AdvertiseListener,
    ) -> Result<()>;

    fn stop_advertising(&self);

    /// An empty `filter` scans without filtering. Results flow into `sink`.
    fn start_scan(&self, filter: &[Uuid], settings: &ScanSettings, sink: ScanSink)
        -> Result<ScanHandle>;

    fn stop_scan(&self, scan: ScanHandle);

    /// Completion: [`ConnectionEvent::StateChanged`] on `callbacks`
    fn connect(&self, address: &str, callbacks: ConnectionCallbacks) -> Result<TransportHandle>;

    /// Re-issue a connect on an existing link. `false` if the radio refused.
    fn reconnect(&self, transport: TransportHandle) -> bool;

    /// Completion: [`ConnectionEvent::ServicesDiscovered`]
    fn discover_services(&self, transport: TransportHandle) -> Result<()>;

    /// Services discovered so far on this link; empty before discovery
    fn discovered_services(&self, transport: TransportHandle) -> Vec<RemoteService>;

    /// Completion: [`ConnectionEvent::CharacteristicRead`]
    fn read_characteristic(
        &self,
        transport: TransportHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<()>;

    fn disconnect(&self, transport: TransportHandle);
}
