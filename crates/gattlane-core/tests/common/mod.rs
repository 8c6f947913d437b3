//! Shared fixtures for the coordinator integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gattlane_core::{BleCoordinator, CharacteristicSpec, LaneConfig, LocalService};
use gattlane_harness::{CountingKeepalive, RadioCall, SimulatedRadio, VirtualPeer};
use uuid::Uuid;

pub const PEER: &str = "AA:BB:CC:DD:EE:01";

pub fn uuid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

pub fn service(n: u128) -> LocalService {
    LocalService::new(uuid(n))
        .with_characteristic(CharacteristicSpec::readable(uuid(n * 100 + 1), vec![n as u8]))
}

pub fn battery_service() -> LocalService {
    LocalService::new(uuid(0x180f)).with_characteristic(CharacteristicSpec::readable(uuid(0x2a19), [87]))
}

pub fn battery_peer() -> VirtualPeer {
    VirtualPeer::new(PEER)
        .with_name("sensor")
        .with_service(battery_service())
}

pub fn coordinator(radio: &Arc<SimulatedRadio>) -> BleCoordinator {
    BleCoordinator::new(radio.clone(), LaneConfig::default()).expect("valid config")
}

pub fn coordinator_with_keepalive(
    radio: &Arc<SimulatedRadio>,
) -> (BleCoordinator, Arc<CountingKeepalive>) {
    let keepalive = Arc::new(CountingKeepalive::new());
    let coordinator =
        BleCoordinator::with_keepalive(radio.clone(), LaneConfig::default(), keepalive.clone())
            .expect("valid config");
    (coordinator, keepalive)
}

pub fn coordinator_with_timeout(radio: &Arc<SimulatedRadio>, timeout: Duration) -> BleCoordinator {
    BleCoordinator::new(
        radio.clone(),
        LaneConfig::new().with_operation_timeout(timeout),
    )
    .expect("valid config")
}

/// Central-side calls only, in the order they were made
pub fn central_calls(radio: &SimulatedRadio) -> Vec<RadioCall> {
    radio
        .calls()
        .into_iter()
        .filter(|call| {
            matches!(
                call,
                RadioCall::Connect(_)
                    | RadioCall::Reconnect(_)
                    | RadioCall::DiscoverServices(_)
                    | RadioCall::ReadCharacteristic { .. }
                    | RadioCall::Disconnect(_)
            )
        })
        .collect()
}
