//! Command handlers for the gattlane CLI

use std::sync::Arc;
use std::time::Duration;

use gattlane_core::{
    named_uuid, BleCoordinator, BleError, CentralEvent, CharacteristicSpec, DeviceDirectory,
    DirectoryChange, DiscoveryProfile, LocalService, ScanCallbackType,
};
use gattlane_harness::{SimulatedRadio, VirtualPeer};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{debug, info};

use crate::cli::Commands;
use crate::config::AppConfig;
use crate::error::{CliError, Result};

const DEMO_PEER: &str = "DE:11:00:00:00:01";

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command against a simulated radio built from `config`
    pub async fn execute(command: Commands, config: AppConfig) -> Result<()> {
        let radio = SimulatedRadio::with_peers(config.radio.simulated(), config.radio.virtual_peers());
        let coordinator = BleCoordinator::new(radio.clone(), config.lane.clone())?;

        let outcome = match command {
            Commands::Advertise {
                service,
                characteristics,
                duration_ms,
            } => {
                Self::handle_advertise(&coordinator, &service, &characteristics, duration_ms).await
            }
            Commands::Scan {
                filter,
                duration_ms,
            } => Self::handle_scan(&coordinator, &radio, &config, &filter, duration_ms).await,
            Commands::Read {
                address,
                service,
                characteristic,
            } => Self::handle_read(&coordinator, &address, &service, &characteristic).await,
            Commands::Demo { group } => Self::handle_demo(&coordinator, &radio, &group).await,
        };

        coordinator.shutdown().await?;
        outcome
    }

    /// Handle the advertise command
    async fn handle_advertise(
        coordinator: &BleCoordinator,
        service: &str,
        characteristics: &[String],
        duration_ms: u64,
    ) -> Result<()> {
        let mut local = LocalService::new(named_uuid(service));
        for entry in characteristics {
            local = local.with_characteristic(parse_characteristic(entry)?);
        }
        let uuid = local.uuid;

        coordinator.create_service(local).await?;
        let services = coordinator.registered_services().await?;
        let advertising = coordinator.is_advertising().await?;
        println!(
            "{}",
            json!({ "advertising": advertising, "services": services })
        );

        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        coordinator.remove_service(uuid).await?;
        info!(%uuid, "advertising finished");
        Ok(())
    }

    /// Handle the scan command
    async fn handle_scan(
        coordinator: &BleCoordinator,
        radio: &Arc<SimulatedRadio>,
        config: &AppConfig,
        filter: &[String],
        duration_ms: u64,
    ) -> Result<()> {
        let filter = filter.iter().map(|name| named_uuid(name)).collect();
        let (started, mut events) = coordinator.scan_events(filter);
        started.await?;

        for peer in &config.radio.peers {
            radio.emit_scan_result(&peer.address, ScanCallbackType::FirstMatch);
        }

        let mut directory = DeviceDirectory::new();
        let deadline = Instant::now() + Duration::from_millis(duration_ms);
        drain_events(&mut events, &mut directory, Some(deadline)).await?;

        coordinator.stop_scan().await?;
        drain_events(&mut events, &mut directory, None).await?;
        info!(devices = directory.len(), "scan finished");
        Ok(())
    }

    /// Handle the read command
    async fn handle_read(
        coordinator: &BleCoordinator,
        address: &str,
        service: &str,
        characteristic: &str,
    ) -> Result<()> {
        let value = coordinator
            .read_characteristic(address, named_uuid(service), named_uuid(characteristic))
            .await?;
        println!(
            "{}",
            json!({
                "address": address,
                "hex": hex::encode(&value),
                "text": String::from_utf8_lossy(&value),
            })
        );
        Ok(())
    }

    /// Handle the demo command
    async fn handle_demo(
        coordinator: &BleCoordinator,
        radio: &Arc<SimulatedRadio>,
        group: &str,
    ) -> Result<()> {
        let profile = DiscoveryProfile::new(group, None)?;
        profile
            .advertise(
                coordinator,
                &json!({ "device": profile.device_id(), "role": "host" }),
            )
            .await?;
        info!(service = %profile.service_uuid(), "published local document");

        let peer_profile = DiscoveryProfile::new(group, Some("demo-peer".into()))?;
        let peer_document = json!({
            "device": peer_profile.device_id(),
            "role": "peer",
            "notes": "lorem ipsum ".repeat(60),
        });
        radio.add_peer(
            VirtualPeer::new(DEMO_PEER)
                .with_name("demo-peer")
                .with_service(peer_profile.service_for(&peer_document)?),
        );

        let (started, mut events) = coordinator.scan_events(profile.scan_filter());
        started.await?;
        radio.emit_scan_result(DEMO_PEER, ScanCallbackType::FirstMatch);

        let found = loop {
            match timeout(Duration::from_secs(2), events.recv()).await {
                Ok(Some(CentralEvent::ScanAdded(device))) => break device,
                Ok(Some(event)) => debug!(?event, "waiting for the demo peer"),
                Ok(None) | Err(_) => {
                    return Err(BleError::Radio("demo peer was not discovered".into()).into())
                }
            }
        };
        coordinator.stop_scan().await?;

        let document: serde_json::Value = profile.fetch(coordinator, &found.address).await?;
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "from": found, "document": document }))?
        );
        Ok(())
    }
}

/// Parse `name=value` into a readable characteristic
fn parse_characteristic(entry: &str) -> Result<CharacteristicSpec> {
    let (name, value) = entry
        .split_once('=')
        .ok_or_else(|| CliError::InvalidArgument(format!("expected name=value, got {:?}", entry)))?;
    if name.is_empty() {
        return Err(CliError::InvalidArgument("characteristic name is empty".into()));
    }
    Ok(CharacteristicSpec::readable(named_uuid(name), value.as_bytes()))
}

/// Print central events until `deadline`, or until the channel is idle when
/// there is none
async fn drain_events(
    events: &mut mpsc::UnboundedReceiver<CentralEvent>,
    directory: &mut DeviceDirectory,
    deadline: Option<Instant>,
) -> Result<()> {
    loop {
        let wait = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => Duration::from_millis(50),
        };
        let event = match timeout(wait, events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) | Err(_) => return Ok(()),
        };

        if let Some(change) = directory.apply(&event) {
            match change {
                DirectoryChange::Added(device) => debug!(address = %device.address, "device added"),
                DirectoryChange::Updated(device) => debug!(address = %device.address, "device updated"),
                DirectoryChange::Removed(device) => debug!(address = %device.address, "device removed"),
            }
        }
        println!("{}", serde_json::to_string(&event)?);
    }
}
