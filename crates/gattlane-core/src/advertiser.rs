//! Advertising derived from the service registry
//!
//! The advertisement always mirrors the registry: one service uuid per
//! registered service, in insertion order. Any registry change restarts it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::cell::CompletionCell;
use crate::config::AdvertiseSettings;
use crate::error::{BleError, Result};
use crate::radio::{AdvertiseEvent, AdvertisePayload, RadioAdapter};
use crate::service::ServiceRegistry;

// ----------------------------------------------------------------------------
// Advertise Listener
// ----------------------------------------------------------------------------

/// Receives the outcome of one advertise start request
///
/// Each start gets its own listener, so an outcome the radio reports after the
/// lane stopped waiting can never settle a later start.
#[derive(Clone)]
pub struct AdvertiseListener {
    pending: Arc<Mutex<Option<CompletionCell<()>>>>,
}

impl AdvertiseListener {
    /// A listener armed for a single start, with the cell its outcome settles
    pub fn armed() -> (Self, CompletionCell<()>) {
        let cell = CompletionCell::new("advertise-start");
        let listener = Self {
            pending: Arc::new(Mutex::new(Some(cell.clone()))),
        };
        (listener, cell)
    }

    pub fn dispatch(&self, event: AdvertiseEvent) {
        let Some(cell) = self.slot().take() else {
            warn!(?event, "advertise outcome with no start outstanding, ignoring");
            return;
        };
        match event {
            AdvertiseEvent::StartSuccess => {
                info!("advertising has started successfully");
                cell.resolve(());
            }
            AdvertiseEvent::StartFailure(failure) => {
                error!("failed to start advertising: {}", failure);
                cell.reject(BleError::AdvertiseFailed(failure));
            }
        }
    }

    fn disarm(&self) {
        self.slot().take();
    }

    fn slot(&self) -> MutexGuard<'_, Option<CompletionCell<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ----------------------------------------------------------------------------
// Advertiser
// ----------------------------------------------------------------------------

/// Owner of the single advertising session
#[derive(Default)]
pub struct Advertiser {
    active: bool,
    restarts: u64,
}

impl Advertiser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Number of successful (re)starts
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Restart advertising with the registry's current service set
    pub async fn refresh(
        &mut self,
        adapter: &dyn RadioAdapter,
        registry: &ServiceRegistry,
        settings: &AdvertiseSettings,
        limit: Option<Duration>,
    ) -> Result<()> {
        if registry.is_empty() {
            debug!("no services registered, nothing to advertise");
            return Ok(());
        }

        let payload = AdvertisePayload::from_services(registry.uuids());
        self.stop(adapter);

        let (listener, cell) = AdvertiseListener::armed();
        adapter.start_advertising(settings, &payload, &payload, listener.clone())?;
        if let Err(e) = cell.wait_for(limit).await {
            listener.disarm();
            if matches!(e, BleError::OperationTimedOut { .. }) {
                // The radio accepted the start; make sure it is not left running
                adapter.stop_advertising();
            }
            return Err(e);
        }

        self.active = true;
        self.restarts += 1;
        info!(services = payload.service_uuids.len(), "restarted advertising");
        Ok(())
    }

    /// Stop advertising if it is running
    pub fn stop(&mut self, adapter: &dyn RadioAdapter) {
        if self.active {
            adapter.stop_advertising();
            self.active = false;
            debug!("stopped advertising");
        }
    }
}
