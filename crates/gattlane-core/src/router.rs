//! GATT server callback routing
//!
//! Runs on the radio's notification context. It never touches lane-owned state:
//! it either settles a pending service-add cell or answers a remote request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cell::CompletionCell;
use crate::error::BleError;
use crate::protocol::{GattStatus, LinkState};
use crate::radio::{AttributeKind, GattResponse, RadioAdapter, ServerEvent};

// ----------------------------------------------------------------------------
// Pending Service Adds
// ----------------------------------------------------------------------------

/// In-flight service registrations keyed by service uuid
#[derive(Clone, Default)]
pub struct PendingServiceAdds {
    cells: Arc<Mutex<HashMap<Uuid, CompletionCell<()>>>>,
}

impl PendingServiceAdds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a cell for `service`
    pub fn insert(&self, service: Uuid) -> CompletionCell<()> {
        let cell = CompletionCell::new("service-add");
        if self.cells().insert(service, cell.clone()).is_some() {
            warn!(%service, "replaced a service-add cell that was still pending");
        }
        cell
    }

    /// Remove and return the cell for `service`
    pub fn take(&self, service: Uuid) -> Option<CompletionCell<()>> {
        self.cells().remove(&service)
    }

    pub fn len(&self) -> usize {
        self.cells().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells().is_empty()
    }

    fn cells(&self) -> MutexGuard<'_, HashMap<Uuid, CompletionCell<()>>> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ----------------------------------------------------------------------------
// Router
// ----------------------------------------------------------------------------

/// Dispatcher for every event the radio reports on the local GATT server
#[derive(Clone)]
pub struct GattServerRouter {
    adapter: Weak<dyn RadioAdapter>,
    pending: PendingServiceAdds,
}

impl GattServerRouter {
    pub fn new(adapter: &Arc<dyn RadioAdapter>, pending: PendingServiceAdds) -> Self {
        Self {
            adapter: Arc::downgrade(adapter),
            pending,
        }
    }

    /// Route one server event
    pub fn dispatch(&self, event: ServerEvent) {
        match event {
            ServerEvent::ServiceAdded { status, service } => self.on_service_added(status, service),
            ServerEvent::ReadRequest {
                device,
                request_id,
                offset,
                attribute,
                uuid,
                value,
            } => {
                let (status, value) = if offset != 0 {
                    info!(%device, ?attribute, "read with offset {} refused, offsets are not supported", offset);
                    (GattStatus::InvalidOffset, None)
                } else if let Some(value) = value {
                    info!(%device, ?attribute, %uuid, "remote read served");
                    (GattStatus::Success, Some(value))
                } else {
                    info!(%device, ?attribute, %uuid, "remote read refused, no stored value");
                    (GattStatus::RequestNotSupported, None)
                };
                self.respond(device, request_id, status, offset, value);
            }
            ServerEvent::WriteRequest {
                device,
                request_id,
                attribute,
                uuid,
                response_needed,
                offset,
                ..
            } => {
                if !response_needed {
                    return;
                }
                info!(%device, ?attribute, %uuid, "remote write ignored, writes are not supported");
                let status = match attribute {
                    AttributeKind::Characteristic => GattStatus::RequestNotSupported,
                    AttributeKind::Descriptor => GattStatus::Success,
                };
                self.respond(device, request_id, status, offset, None);
            }
            ServerEvent::ExecuteWrite {
                device,
                request_id,
                execute,
            } => {
                info!(%device, execute, "execute-write acknowledged without prepared writes");
                self.respond(device, request_id, GattStatus::Success, 0, None);
            }
            ServerEvent::ConnectionStateChanged {
                device,
                status,
                state,
            } => match state {
                LinkState::Connected => info!(%device, %status, "remote central connected"),
                LinkState::Disconnected => info!(%device, %status, "remote central disconnected"),
            },
            ServerEvent::MtuChanged { device, mtu } => {
                info!(%device, "remote central changed the MTU to {}", mtu);
            }
            ServerEvent::NotificationSent { device, status } => {
                if status.is_success() {
                    info!(%device, "notification sent");
                } else {
                    warn!(%device, %status, "notification failed to send");
                }
            }
        }
    }

    fn on_service_added(&self, status: GattStatus, service: Uuid) {
        info!(%service, %status, "service added");
        let Some(cell) = self.pending.take(service) else {
            debug!(%service, "no pending registration for added service");
            return;
        };
        if status.is_success() {
            cell.resolve(());
        } else {
            cell.reject(BleError::ServiceRegistrationFailed(status));
        }
    }

    fn respond(
        &self,
        device: String,
        request_id: i32,
        status: GattStatus,
        offset: u16,
        value: Option<Vec<u8>>,
    ) {
        let Some(adapter) = self.adapter.upgrade() else {
            debug!(%device, request_id, "radio released before the response could be sent");
            return;
        };
        adapter.send_response(GattResponse {
            device,
            request_id,
            status,
            offset,
            value,
        });
    }
}
