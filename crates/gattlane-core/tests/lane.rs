//! Lane-wide behaviour: ordering across request kinds, timeouts, discovery
//! documents and shutdown

mod common;

use std::time::Duration;

use common::*;
use gattlane_core::{
    named_uuid, BleError, ConnectionState, DiscoveryProfile, ScanCallbackType,
};
use gattlane_harness::{RadioCall, SimulatedRadio, SimulatedRadioConfig, VirtualPeer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Kiosk {
    device: String,
    label: String,
    notes: Vec<String>,
}

// ----------------------------------------------------------------------------
// Ordering
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_mixed_requests_reach_the_radio_in_submission_order() {
    let radio = SimulatedRadio::with_peers(SimulatedRadioConfig::sluggish(), vec![battery_peer()]);
    let coordinator = coordinator(&radio);

    let read = coordinator.read_characteristic(PEER, uuid(0x180f), uuid(0x2a19));
    let create = coordinator.create_service(service(1));
    let (scan, _events) = coordinator.scan_events(Vec::new());
    let remove = coordinator.remove_service(uuid(1));

    // Awaited out of order on purpose
    remove.await.unwrap();
    scan.await.unwrap();
    create.await.unwrap();
    assert_eq!(read.await.unwrap(), vec![87]);

    let kinds: Vec<&str> = radio
        .calls()
        .iter()
        .map(|call| match call {
            RadioCall::Connect(_) => "connect",
            RadioCall::DiscoverServices(_) => "discover",
            RadioCall::ReadCharacteristic { .. } => "read",
            RadioCall::OpenServer => "open",
            RadioCall::AddService(_) => "add",
            RadioCall::StartAdvertising(_) => "advertise",
            RadioCall::StartScan(_) => "scan",
            RadioCall::RemoveService(_) => "remove",
            RadioCall::StopAdvertising => "unadvertise",
            RadioCall::CloseServer => "close",
            _ => "other",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "connect", "discover", "read", "open", "add", "advertise", "scan", "remove",
            "unadvertise", "close",
        ]
    );
}

// ----------------------------------------------------------------------------
// Timeouts
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_unanswered_service_add_times_out_and_lane_recovers() {
    let radio = SimulatedRadio::ideal();
    let coordinator = coordinator_with_timeout(&radio, Duration::from_millis(50));

    radio.mute_completions(true);
    let err = coordinator.create_service(service(1)).await.unwrap_err();
    assert_eq!(
        err,
        BleError::OperationTimedOut {
            operation: "service-add",
            after_ms: 50
        }
    );
    assert!(coordinator.registered_services().await.unwrap().is_empty());
    assert!(!radio.server_open());

    radio.mute_completions(false);
    coordinator.create_service(service(1)).await.unwrap();
    assert_eq!(coordinator.registered_services().await.unwrap(), vec![uuid(1)]);
    assert!(coordinator.is_advertising().await.unwrap());
}

#[tokio::test]
async fn test_unanswered_add_beside_live_services_is_withdrawn() {
    let radio = SimulatedRadio::ideal();
    let coordinator = coordinator_with_timeout(&radio, Duration::from_millis(50));
    coordinator.create_service(service(1)).await.unwrap();

    radio.mute_completions(true);
    let err = coordinator.create_service(service(2)).await.unwrap_err();
    assert_eq!(err.kind(), "operation_timed_out");

    let live: Vec<_> = radio.live_services().iter().map(|s| s.uuid).collect();
    assert_eq!(live, coordinator.registered_services().await.unwrap());
    assert_eq!(live, vec![uuid(1)]);
    assert_eq!(radio.advertised_services(), Some(vec![uuid(1)]));
    assert!(radio.server_open());

    radio.mute_completions(false);
    coordinator.create_service(service(2)).await.unwrap();
    let live: Vec<_> = radio.live_services().iter().map(|s| s.uuid).collect();
    assert_eq!(live, vec![uuid(1), uuid(2)]);
}

#[tokio::test]
async fn test_unanswered_advertising_restart_leaves_radio_quiet() {
    let radio = SimulatedRadio::ideal();
    let coordinator = coordinator_with_timeout(&radio, Duration::from_millis(50));
    coordinator.create_service(service(1)).await.unwrap();
    coordinator.create_service(service(2)).await.unwrap();

    radio.mute_completions(true);
    coordinator.remove_service(uuid(2)).await.unwrap();
    assert_eq!(coordinator.registered_services().await.unwrap(), vec![uuid(1)]);
    assert!(!coordinator.is_advertising().await.unwrap());
    assert_eq!(radio.advertised_services(), None);

    radio.mute_completions(false);
    coordinator.create_service(service(3)).await.unwrap();
    assert_eq!(radio.advertised_services(), Some(vec![uuid(1), uuid(3)]));

    coordinator.remove_service(uuid(1)).await.unwrap();
    coordinator.remove_service(uuid(3)).await.unwrap();
    assert!(coordinator.registered_services().await.unwrap().is_empty());
    assert!(!radio.server_open());
    assert_eq!(radio.advertised_services(), None);
}

#[tokio::test]
async fn test_unanswered_restart_then_emptied_registry_stops_everything() {
    let radio = SimulatedRadio::ideal();
    let coordinator = coordinator_with_timeout(&radio, Duration::from_millis(50));
    coordinator.create_service(service(1)).await.unwrap();
    coordinator.create_service(service(2)).await.unwrap();

    radio.mute_completions(true);
    coordinator.remove_service(uuid(2)).await.unwrap();
    radio.mute_completions(false);
    coordinator.remove_service(uuid(1)).await.unwrap();

    assert!(coordinator.registered_services().await.unwrap().is_empty());
    assert!(!radio.server_open());
    assert_eq!(radio.advertised_services(), None);
}

#[tokio::test]
async fn test_unanswered_connect_times_out_and_lane_recovers() {
    let radio = SimulatedRadio::with_peers(SimulatedRadioConfig::ideal(), vec![battery_peer()]);
    let coordinator = coordinator_with_timeout(&radio, Duration::from_millis(50));

    radio.mute_completions(true);
    let err = coordinator
        .read_characteristic(PEER, uuid(0x180f), uuid(0x2a19))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "operation_timed_out");
    assert_eq!(
        coordinator.connection_state(PEER).await.unwrap(),
        Some(ConnectionState::Disconnected)
    );

    // Requests behind the stuck one were never blocked
    assert!(coordinator.registered_services().await.unwrap().is_empty());

    radio.mute_completions(false);
    let value = coordinator
        .read_characteristic(PEER, uuid(0x180f), uuid(0x2a19))
        .await
        .unwrap();
    assert_eq!(value, vec![87]);
    assert_eq!(radio.count_calls(|c| matches!(c, RadioCall::Reconnect(_))), 1);
}

#[tokio::test]
async fn test_without_a_timeout_requests_wait_for_the_radio() {
    let radio = SimulatedRadio::ideal();
    let coordinator = coordinator(&radio);

    radio.mute_completions(true);
    let pending = coordinator.create_service(service(1));
    let waited = tokio::time::timeout(Duration::from_millis(100), pending).await;
    assert!(waited.is_err());
    assert_eq!(radio.stats().completions_muted.load(std::sync::atomic::Ordering::Relaxed), 1);
}

// ----------------------------------------------------------------------------
// Discovery Documents
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_discovery_document_round_trip_through_a_peer() {
    let profile = DiscoveryProfile::new("com.example.kiosk", Some("remote".into())).unwrap();
    let document = Kiosk {
        device: profile.device_id().to_string(),
        label: "Lobby".into(),
        notes: vec!["lorem ipsum dolor sit amet".repeat(12); 4],
    };
    let remote = profile.service_for(&document).unwrap();
    assert!(remote.characteristics.len() > 3);

    let radio = SimulatedRadio::with_peers(
        SimulatedRadioConfig::ideal(),
        vec![VirtualPeer::new(PEER).with_service(remote)],
    );
    let coordinator = coordinator(&radio);

    let (started, mut events) = coordinator.scan_events(profile.scan_filter());
    started.await.unwrap();
    radio.emit_scan_result(PEER, ScanCallbackType::FirstMatch);
    radio.flush();
    let _ = events.try_recv();
    assert!(matches!(
        events.try_recv(),
        Ok(gattlane_core::CentralEvent::ScanAdded(device)) if device.address == PEER
    ));

    let fetched: Kiosk = profile.fetch(&coordinator, PEER).await.unwrap();
    assert_eq!(fetched, document);
    assert_eq!(radio.count_calls(|c| matches!(c, RadioCall::Connect(_))), 1);
}

#[tokio::test]
async fn test_advertising_a_document_registers_the_group_service() {
    let radio = SimulatedRadio::ideal();
    let coordinator = coordinator(&radio);
    let profile = DiscoveryProfile::new("com.example.kiosk", None).unwrap();

    profile
        .advertise(&coordinator, &serde_json::json!({ "device": profile.device_id() }))
        .await
        .unwrap();
    profile
        .advertise(&coordinator, &serde_json::json!({ "device": "replaced" }))
        .await
        .unwrap();

    assert_eq!(
        coordinator.registered_services().await.unwrap(),
        vec![profile.service_uuid()]
    );
    let live = radio.live_services();
    assert_eq!(live.len(), 1);
    let msg = live[0].characteristic(named_uuid("msg")).unwrap();
    assert!(msg.writable && !msg.readable);
}

#[tokio::test]
async fn test_fetch_from_a_peer_outside_the_group() {
    let radio = SimulatedRadio::with_peers(SimulatedRadioConfig::ideal(), vec![battery_peer()]);
    let coordinator = coordinator(&radio);
    let profile = DiscoveryProfile::new("com.example.kiosk", None).unwrap();

    let err = profile
        .fetch::<serde_json::Value>(&coordinator, PEER)
        .await
        .unwrap_err();
    assert_eq!(err, BleError::ServiceNotFound);
}

// ----------------------------------------------------------------------------
// Shutdown
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_shutdown_releases_everything() {
    let radio = SimulatedRadio::with_peers(SimulatedRadioConfig::ideal(), vec![battery_peer()]);
    let (coordinator, keepalive) = coordinator_with_keepalive(&radio);

    coordinator.create_service(service(1)).await.unwrap();
    coordinator.create_service(service(2)).await.unwrap();
    let (scan, mut events) = coordinator.scan_events(Vec::new());
    scan.await.unwrap();
    coordinator
        .read_characteristic(PEER, uuid(0x180f), uuid(0x2a19))
        .await
        .unwrap();

    coordinator.shutdown().await.unwrap();

    assert!(!radio.server_open());
    assert!(radio.live_services().is_empty());
    assert_eq!(radio.advertised_services(), None);
    assert_eq!(radio.active_scans(), 0);
    assert_eq!(radio.open_links(), 0);
    assert!(!keepalive.is_running());

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen.last(),
        Some(&gattlane_core::CentralEvent::ScanEnded(
            gattlane_core::ScanEndReason::Stopped
        ))
    );
}
