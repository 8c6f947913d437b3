//! Serialized command lane over a callback-driven BLE radio
//!
//! A BLE radio handles one GATT, advertise or scan request at a time and reports
//! each outcome later, from its own thread. This crate turns that interface into
//! ordinary async requests: every request becomes one task on a single worker
//! lane, and the lane waits on a completion cell until the radio's callback
//! settles it.
//!
//! ## Architecture
//!
//! - [`cell`] - one-shot completion cells bridging callbacks to the lane
//! - [`queue`] - the single-worker command lane
//! - [`radio`] - the radio adapter contract and its events
//! - [`service`] - local service definitions and the service registry
//! - [`advertiser`] - advertising derived from the registry
//! - [`router`] - GATT server callback routing
//! - [`connection`] - outbound connections and their state machine
//! - [`scan`] - the single active scan session
//! - [`central`] - outbound scan events and the device directory
//! - [`discovery`] - publishing and fetching JSON documents over GATT
//! - [`coordinator`] - the public front door
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gattlane_core::{BleCoordinator, CharacteristicSpec, LaneConfig, LocalService, RadioAdapter};
//! use uuid::Uuid;
//!
//! # async fn example(radio: Arc<dyn RadioAdapter>) -> gattlane_core::Result<()> {
//! let coordinator = BleCoordinator::new(radio, LaneConfig::default())?;
//!
//! let battery = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
//! let level = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);
//! coordinator
//!     .create_service(LocalService::new(battery).with_characteristic(CharacteristicSpec::readable(level, [87])))
//!     .await?;
//!
//! let value = coordinator
//!     .read_characteristic("AA:BB:CC:DD:EE:FF", battery, level)
//!     .await?;
//! # let _ = value;
//! coordinator.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod advertiser;
pub mod cell;
pub mod central;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod keepalive;
pub mod lane;
pub mod protocol;
pub mod queue;
pub mod radio;
pub mod router;
pub mod scan;
pub mod service;

// Public API exports
pub use advertiser::{AdvertiseListener, Advertiser};
pub use cell::CompletionCell;
pub use central::{CentralEvent, ChannelScanListener, DeviceDirectory, DirectoryChange};
pub use config::{AdvertiseSettings, LaneConfig, ScanSettings};
pub use connection::{ConnectionCallbacks, ConnectionState};
pub use coordinator::BleCoordinator;
pub use discovery::{named_uuid, reassemble, DiscoveryProfile, DISCOVERY_NAMESPACE};
pub use error::{BleError, Failure, Result};
pub use keepalive::{Keepalive, NoopKeepalive};
pub use protocol::{
    AdvertiseFailure, AdvertiseMode, GattStatus, LinkState, ScanCallbackType, ScanFailure,
    ScanMode, TxPowerLevel,
};
pub use queue::{CommandQueue, TaskHandle};
pub use radio::{
    AdvertiseEvent, AdvertisePayload, AttributeKind, ConnectionEvent, GattResponse, RadioAdapter,
    RemoteService, ScanHandle, ServerEvent, ServerHandle, TransportHandle,
};
pub use router::{GattServerRouter, PendingServiceAdds};
pub use scan::{DiscoveredDevice, ScanEndReason, ScanListener, ScanRecord, ScanSink};
pub use service::{CharacteristicSpec, LocalService, ServiceRegistry};
