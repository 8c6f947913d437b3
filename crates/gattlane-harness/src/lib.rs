//! Simulated BLE radio for exercising the command lane
//!
//! [`SimulatedRadio`] implements the radio adapter contract in memory. It keeps
//! a small virtual world of remote peers, records every request made to it and
//! delivers every completion from its own notification thread, the way a real
//! platform stack would.
//!
//! ```rust,no_run
//! use gattlane_core::{BleCoordinator, LaneConfig};
//! use gattlane_harness::{SimulatedRadio, SimulatedRadioConfig, VirtualPeer};
//!
//! # async fn example() -> gattlane_core::Result<()> {
//! let radio = SimulatedRadio::with_peers(
//!     SimulatedRadioConfig::ideal(),
//!     vec![VirtualPeer::new("AA:BB:CC:DD:EE:FF").with_name("sensor")],
//! );
//! let coordinator = BleCoordinator::new(radio.clone(), LaneConfig::default())?;
//! # let _ = coordinator;
//! # Ok(())
//! # }
//! ```

pub mod keepalive;
pub mod peer;
pub mod radio;

pub use keepalive::CountingKeepalive;
pub use peer::{SimulatedRadioConfig, VirtualPeer};
pub use radio::{RadioCall, RadioStats, SimulatedRadio};
