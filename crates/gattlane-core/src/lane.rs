//! State owned by the command lane's worker
//!
//! Every method here runs inside a lane task, one at a time. This is the only
//! code that mutates the service registry, the connection table or the scan
//! slot. Radio callbacks reach it only through completion cells.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::advertiser::Advertiser;
use crate::config::LaneConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::{BleError, Result};
use crate::keepalive::Keepalive;
use crate::radio::{RadioAdapter, ServerHandle};
use crate::router::{GattServerRouter, PendingServiceAdds};
use crate::scan::{ScanListener, ScanSession};
use crate::service::{LocalService, ServiceRegistry};

/// Lane-owned view of the radio
pub struct Lane {
    adapter: Arc<dyn RadioAdapter>,
    config: LaneConfig,
    keepalive: Arc<dyn Keepalive>,
    server: Option<ServerHandle>,
    registry: ServiceRegistry,
    pending_adds: PendingServiceAdds,
    advertiser: Advertiser,
    connections: ConnectionManager,
    scan: ScanSession,
}

impl Lane {
    pub fn new(
        adapter: Arc<dyn RadioAdapter>,
        config: LaneConfig,
        keepalive: Arc<dyn Keepalive>,
    ) -> Self {
        Self {
            adapter,
            config,
            keepalive,
            server: None,
            registry: ServiceRegistry::new(),
            pending_adds: PendingServiceAdds::new(),
            advertiser: Advertiser::new(),
            connections: ConnectionManager::new(),
            scan: ScanSession::new(),
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn is_advertising(&self) -> bool {
        self.advertiser.is_active()
    }

    pub fn server(&self) -> Option<ServerHandle> {
        self.server
    }

    pub fn connection_state(&self, address: &str) -> Option<ConnectionState> {
        self.connections.state(address)
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.is_active()
    }

    fn limit(&self) -> Option<Duration> {
        self.config.operation_timeout
    }

    // ------------------------------------------------------------------------
    // Peripheral
    // ------------------------------------------------------------------------

    fn ensure_server(&mut self) -> Result<ServerHandle> {
        if !self.adapter.is_radio_enabled() {
            return Err(BleError::RadioDisabled);
        }
        if !self.adapter.supports_multi_advertisement() {
            return Err(BleError::FeatureUnsupported);
        }
        if let Some(server) = self.server {
            return Ok(server);
        }

        let router = GattServerRouter::new(&self.adapter, self.pending_adds.clone());
        let server = self.adapter.open_gatt_server(router).map_err(|e| {
            error!("unable to open GATT server: {}", e);
            BleError::ServerOpenFailed
        })?;
        info!(?server, "GATT server opened");
        self.server = Some(server);
        Ok(server)
    }

    /// Register `service`, replacing any entry with the same uuid, and restart
    /// advertising with the new service set
    pub async fn create_service(&mut self, service: LocalService) -> Result<()> {
        let server = self.ensure_server()?;
        let uuid = service.uuid;
        let had_services = !self.registry.is_empty();

        let replaced = self.registry.remove(uuid).is_some();
        if replaced {
            info!(%uuid, "replacing existing service");
            self.adapter.remove_service(server, uuid);
        }

        let cell = self.pending_adds.insert(uuid);
        debug!(%uuid, characteristics = service.characteristics.len(), "adding service");
        let added = match self.adapter.add_service(server, &service) {
            Ok(()) => cell.wait_for(self.limit()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = added {
            self.pending_adds.take(uuid);
            if matches!(e, BleError::OperationTimedOut { .. }) {
                // The radio may still hold the service it never confirmed
                self.adapter.remove_service(server, uuid);
            }
            warn!(%uuid, "service registration failed: {}", e);
            self.resettle(had_services, replaced).await;
            return Err(e);
        }

        self.registry.push(service);
        let limit = self.limit();
        if let Err(e) = self
            .advertiser
            .refresh(self.adapter.as_ref(), &self.registry, &self.config.advertise, limit)
            .await
        {
            warn!(%uuid, "advertising failed, withdrawing service: {}", e);
            self.registry.remove(uuid);
            self.adapter.remove_service(server, uuid);
            self.resettle(had_services, true).await;
            return Err(e);
        }

        if !had_services {
            self.keepalive.start_background_keepalive();
        }
        Ok(())
    }

    /// Withdraw the service with `uuid`. Unknown uuids are ignored.
    pub async fn remove_service(&mut self, uuid: Uuid) -> Result<()> {
        let Some(server) = self.server else {
            debug!(%uuid, "no GATT server open, nothing to remove");
            return Ok(());
        };
        if self.registry.remove(uuid).is_none() {
            debug!(%uuid, "service not registered");
            return Ok(());
        }

        self.adapter.remove_service(server, uuid);
        info!(%uuid, "service removed");
        self.resettle(true, true).await;
        Ok(())
    }

    /// Bring the advertisement and server back in line with the registry after
    /// it shrank or an add failed
    async fn resettle(&mut self, had_services: bool, changed: bool) {
        if self.registry.is_empty() {
            self.retire_server();
            if had_services {
                self.keepalive.stop_background_keepalive();
            }
            return;
        }
        if !changed {
            return;
        }

        let limit = self.limit();
        if let Err(e) = self
            .advertiser
            .refresh(self.adapter.as_ref(), &self.registry, &self.config.advertise, limit)
            .await
        {
            warn!("unable to restart advertising: {}", e);
        }
    }

    fn retire_server(&mut self) {
        self.advertiser.stop(self.adapter.as_ref());
        if let Some(server) = self.server.take() {
            self.adapter.close_gatt_server(server);
            info!(?server, "GATT server closed");
        }
    }

    // ------------------------------------------------------------------------
    // Central
    // ------------------------------------------------------------------------

    fn check_central(&self) -> Result<()> {
        if !self.adapter.is_radio_enabled() {
            return Err(BleError::RadioDisabled);
        }
        if !self.adapter.has_location_permission() {
            return Err(BleError::PermissionDenied);
        }
        Ok(())
    }

    /// Start a scan, superseding any scan already running. The running scan
    /// ends even when the new one cannot start.
    pub fn scan(&mut self, filter: Vec<Uuid>, listener: Arc<dyn ScanListener>) -> Result<()> {
        if let Err(e) = self.check_central() {
            if self.scan.supersede(self.adapter.as_ref()) {
                info!("previous scan superseded");
            }
            listener.on_start_failed(&e);
            return Err(e);
        }
        self.scan
            .start(self.adapter.as_ref(), filter, &self.config.scan, listener)
    }

    pub fn stop_scan(&mut self) -> bool {
        self.scan.stop(self.adapter.as_ref())
    }

    /// Connect, discover and read, all within one lane task
    pub async fn read_characteristic(
        &mut self,
        address: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>> {
        self.check_central()?;
        let limit = self.limit();
        self.connections
            .read_characteristic(self.adapter.as_ref(), address, service, characteristic, limit)
            .await
    }

    pub fn disconnect(&mut self, address: &str) -> bool {
        self.connections.disconnect(self.adapter.as_ref(), address)
    }

    /// Release everything the lane holds on the radio
    pub fn shutdown(&mut self) {
        self.stop_scan();
        self.connections.disconnect_all(self.adapter.as_ref());

        let had_services = !self.registry.is_empty();
        if let Some(server) = self.server {
            for service in self.registry.drain() {
                self.adapter.remove_service(server, service.uuid);
            }
        }
        self.retire_server();
        if had_services {
            self.keepalive.stop_background_keepalive();
        }
        info!("lane released the radio");
    }
}
