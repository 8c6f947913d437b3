//! Outbound connect, discover and read through the lane

mod common;

use common::*;
use gattlane_core::{BleError, ConnectionState, GattStatus};
use gattlane_harness::{RadioCall, SimulatedRadio, SimulatedRadioConfig, VirtualPeer};

fn radio_with(peer: VirtualPeer) -> std::sync::Arc<SimulatedRadio> {
    SimulatedRadio::with_peers(SimulatedRadioConfig::ideal(), vec![peer])
}

fn read_call() -> RadioCall {
    RadioCall::ReadCharacteristic {
        address: PEER.into(),
        service: uuid(0x180f),
        characteristic: uuid(0x2a19),
    }
}

// ----------------------------------------------------------------------------
// Read Flow
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_read_connects_discovers_then_reads() {
    let radio = radio_with(battery_peer());
    let coordinator = coordinator(&radio);

    let value = coordinator
        .read_characteristic(PEER, uuid(0x180f), uuid(0x2a19))
        .await
        .unwrap();

    assert_eq!(value, vec![87]);
    assert_eq!(
        central_calls(&radio),
        vec![
            RadioCall::Connect(PEER.into()),
            RadioCall::DiscoverServices(PEER.into()),
            read_call(),
        ]
    );
    assert_eq!(
        coordinator.connection_state(PEER).await.unwrap(),
        Some(ConnectionState::Ready)
    );
}

#[tokio::test]
async fn test_second_read_reuses_the_connection() {
    let radio = radio_with(battery_peer());
    let coordinator = coordinator(&radio);

    coordinator
        .read_characteristic(PEER, uuid(0x180f), uuid(0x2a19))
        .await
        .unwrap();
    let lowercase = PEER.to_ascii_lowercase();
    let again = coordinator
        .read_characteristic(&lowercase, uuid(0x180f), uuid(0x2a19))
        .await
        .unwrap();

    assert_eq!(again, vec![87]);
    assert_eq!(radio.count_calls(|c| matches!(c, RadioCall::Connect(_))), 1);
    assert_eq!(radio.count_calls(|c| matches!(c, RadioCall::DiscoverServices(_))), 1);
    assert_eq!(
        radio.count_calls(|c| matches!(c, RadioCall::ReadCharacteristic { .. })),
        2
    );
    assert_eq!(radio.open_links(), 1);
}

#[tokio::test]
async fn test_missing_service_or_characteristic_never_reads() {
    let radio = radio_with(battery_peer());
    let coordinator = coordinator(&radio);

    assert_eq!(
        coordinator.read_characteristic(PEER, uuid(0x1800), uuid(0x2a19)).await,
        Err(BleError::ServiceNotFound)
    );
    assert_eq!(
        coordinator.read_characteristic(PEER, uuid(0x180f), uuid(0x2a00)).await,
        Err(BleError::CharacteristicNotFound)
    );
    assert_eq!(
        radio.count_calls(|c| matches!(c, RadioCall::ReadCharacteristic { .. })),
        0
    );
    assert_eq!(radio.count_calls(|c| matches!(c, RadioCall::Connect(_))), 1);
}

#[tokio::test]
async fn test_read_status_is_reported() {
    let radio = radio_with(battery_peer().with_read_status(GattStatus::InsufficientAuthentication));
    let coordinator = coordinator(&radio);

    let err = coordinator
        .read_characteristic(PEER, uuid(0x180f), uuid(0x2a19))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        BleError::CharacteristicReadFailed(GattStatus::InsufficientAuthentication)
    );
    assert_eq!(
        err.to_string(),
        "Characteristic read failed. Insufficient authentication. (code 5)"
    );
    // The link itself is still good
    assert_eq!(
        coordinator.connection_state(PEER).await.unwrap(),
        Some(ConnectionState::Ready)
    );
}

// ----------------------------------------------------------------------------
// Connection Failures
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_unknown_peer_fails_to_connect() {
    let radio = SimulatedRadio::ideal();
    let coordinator = coordinator(&radio);

    let err = coordinator
        .read_characteristic(PEER, uuid(0x180f), uuid(0x2a19))
        .await
        .unwrap_err();

    assert_eq!(err, BleError::ConnectionFailed(GattStatus::Other(133)));
    assert_eq!(
        coordinator.connection_state(PEER).await.unwrap(),
        Some(ConnectionState::Disconnected)
    );
}

#[tokio::test]
async fn test_connect_status_is_reported() {
    let radio = radio_with(battery_peer().with_connect_status(GattStatus::ConnectionCongested));
    let coordinator = coordinator(&radio);

    assert_eq!(
        coordinator.read_characteristic(PEER, uuid(0x180f), uuid(0x2a19)).await,
        Err(BleError::ConnectionFailed(GattStatus::ConnectionCongested))
    );
    assert_eq!(radio.count_calls(|c| matches!(c, RadioCall::DiscoverServices(_))), 0);
}

#[tokio::test]
async fn test_link_dropped_during_discovery() {
    let radio = radio_with(battery_peer().dropping_during_discovery(GattStatus::Other(8)));
    let coordinator = coordinator(&radio);

    let err = coordinator
        .read_characteristic(PEER, uuid(0x180f), uuid(0x2a19))
        .await
        .unwrap_err();

    assert_eq!(err, BleError::ServiceDiscoveryFailed(GattStatus::Other(8)));
    assert_eq!(
        coordinator.connection_state(PEER).await.unwrap(),
        Some(ConnectionState::Disconnected)
    );
    assert!(!radio.is_connected(PEER));
}

#[tokio::test]
async fn test_dropped_link_reconnects_without_rediscovery() {
    let radio = radio_with(battery_peer());
    let coordinator = coordinator(&radio);
    coordinator
        .read_characteristic(PEER, uuid(0x180f), uuid(0x2a19))
        .await
        .unwrap();

    radio.drop_link(PEER, GattStatus::Other(8));
    radio.flush();
    assert_eq!(
        coordinator.connection_state(PEER).await.unwrap(),
        Some(ConnectionState::Disconnected)
    );

    radio.clear_calls();
    let value = coordinator
        .read_characteristic(PEER, uuid(0x180f), uuid(0x2a19))
        .await
        .unwrap();

    assert_eq!(value, vec![87]);
    assert_eq!(
        central_calls(&radio),
        vec![RadioCall::Reconnect(PEER.into()), read_call()]
    );
    assert!(radio.is_connected(PEER));
}

#[tokio::test]
async fn test_refused_reconnect() {
    let radio = radio_with(battery_peer().refusing_reconnect());
    let coordinator = coordinator(&radio);
    coordinator
        .read_characteristic(PEER, uuid(0x180f), uuid(0x2a19))
        .await
        .unwrap();

    radio.drop_link(PEER, GattStatus::Success);
    radio.flush();

    assert_eq!(
        coordinator.read_characteristic(PEER, uuid(0x180f), uuid(0x2a19)).await,
        Err(BleError::ConnectRequestFailed)
    );
    assert_eq!(
        coordinator.connection_state(PEER).await.unwrap(),
        Some(ConnectionState::Disconnected)
    );
}

// ----------------------------------------------------------------------------
// Preconditions and Disconnect
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_central_preconditions() {
    let radio = radio_with(battery_peer());
    let coordinator = coordinator(&radio);

    radio.set_location_permission(false);
    assert_eq!(
        coordinator.read_characteristic(PEER, uuid(0x180f), uuid(0x2a19)).await,
        Err(BleError::PermissionDenied)
    );

    radio.set_enabled(false);
    assert_eq!(
        coordinator.read_characteristic(PEER, uuid(0x180f), uuid(0x2a19)).await,
        Err(BleError::RadioDisabled)
    );
    assert!(radio.calls().is_empty());
}

#[tokio::test]
async fn test_disconnect_releases_the_link() {
    let radio = radio_with(battery_peer());
    let coordinator = coordinator(&radio);
    coordinator
        .read_characteristic(PEER, uuid(0x180f), uuid(0x2a19))
        .await
        .unwrap();

    assert!(coordinator.disconnect(&PEER.to_ascii_lowercase()).await.unwrap());
    assert!(!coordinator.disconnect(PEER).await.unwrap());

    assert_eq!(radio.open_links(), 0);
    assert_eq!(coordinator.connection_state(PEER).await.unwrap(), None);
    assert_eq!(radio.count_calls(|c| matches!(c, RadioCall::Disconnect(_))), 1);

    // A fresh read starts from scratch
    radio.clear_calls();
    coordinator
        .read_characteristic(PEER, uuid(0x180f), uuid(0x2a19))
        .await
        .unwrap();
    assert_eq!(central_calls(&radio).len(), 3);
}
