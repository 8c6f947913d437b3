//! Outbound connections and their per-connection state machine
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──onConnected──▶ Connected
//!      ▲                                                   │ discover
//!      │ non-success status                                ▼
//!      └──────────── (any state) ◀────────────── DiscoveringServices ──onDiscovered──▶ Ready
//! ```
//!
//! Only one operation is ever pending on a connection. The pending slot is an
//! enum, so a connect, discovery and read can never be outstanding together.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cell::CompletionCell;
use crate::error::{BleError, Result};
use crate::protocol::{GattStatus, LinkState};
use crate::radio::{ConnectionEvent, RadioAdapter, TransportHandle};

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Connection state for a remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    DiscoveringServices,
    Ready,
}

enum PendingOp {
    Idle,
    Connect(CompletionCell<()>),
    Discover(CompletionCell<()>),
    Read(CompletionCell<Vec<u8>>),
}

struct LinkInner {
    state: ConnectionState,
    pending: PendingOp,
}

struct LinkShared {
    address: String,
    inner: Mutex<LinkInner>,
}

impl LinkShared {
    fn lock(&self) -> MutexGuard<'_, LinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ----------------------------------------------------------------------------
// Connection Callbacks
// ----------------------------------------------------------------------------

/// Sink for the radio's per-connection events
#[derive(Clone)]
pub struct ConnectionCallbacks {
    shared: Arc<LinkShared>,
}

impl ConnectionCallbacks {
    pub fn address(&self) -> &str {
        &self.shared.address
    }

    pub fn dispatch(&self, event: ConnectionEvent) {
        let address = self.shared.address.as_str();
        let mut inner = self.shared.lock();

        match event {
            ConnectionEvent::StateChanged { status, state } => {
                if !status.is_success() {
                    info!(%address, %status, "connection dropped with error");
                    inner.state = ConnectionState::Disconnected;
                    let pending = std::mem::replace(&mut inner.pending, PendingOp::Idle);
                    drop(inner);
                    fail_pending(pending, status);
                } else if state == LinkState::Connected {
                    info!(%address, "connected");
                    inner.state = ConnectionState::Connected;
                    match std::mem::replace(&mut inner.pending, PendingOp::Idle) {
                        PendingOp::Connect(cell) => {
                            drop(inner);
                            cell.resolve(());
                        }
                        other => inner.pending = other,
                    }
                } else {
                    info!(%address, "disconnected");
                    inner.state = ConnectionState::Disconnected;
                    let pending = std::mem::replace(&mut inner.pending, PendingOp::Idle);
                    drop(inner);
                    lose_pending(pending);
                }
            }
            ConnectionEvent::ServicesDiscovered { status } => {
                if !matches!(inner.pending, PendingOp::Discover(_)) {
                    debug!(%address, "services discovered with no discovery pending");
                    return;
                }
                let PendingOp::Discover(cell) = std::mem::replace(&mut inner.pending, PendingOp::Idle)
                else {
                    return;
                };
                if status.is_success() {
                    inner.state = ConnectionState::Ready;
                    drop(inner);
                    cell.resolve(());
                } else {
                    inner.state = ConnectionState::Connected;
                    drop(inner);
                    cell.reject(BleError::ServiceDiscoveryFailed(status));
                }
            }
            ConnectionEvent::CharacteristicRead {
                status,
                characteristic,
                value,
                ..
            } => {
                if !matches!(inner.pending, PendingOp::Read(_)) {
                    debug!(%address, %characteristic, "characteristic read with no read pending");
                    return;
                }
                let PendingOp::Read(cell) = std::mem::replace(&mut inner.pending, PendingOp::Idle)
                else {
                    return;
                };
                drop(inner);
                if status.is_success() {
                    cell.resolve(value);
                } else {
                    cell.reject(BleError::CharacteristicReadFailed(status));
                }
            }
        }
    }
}

fn fail_pending(pending: PendingOp, status: GattStatus) {
    match pending {
        PendingOp::Idle => {}
        PendingOp::Connect(cell) => {
            cell.reject(BleError::ConnectionFailed(status));
        }
        PendingOp::Discover(cell) => {
            cell.reject(BleError::ServiceDiscoveryFailed(status));
        }
        PendingOp::Read(cell) => {
            cell.reject(BleError::CharacteristicReadFailed(status));
        }
    }
}

fn lose_pending(pending: PendingOp) {
    match pending {
        PendingOp::Idle => {}
        PendingOp::Connect(cell) | PendingOp::Discover(cell) => {
            cell.reject(BleError::ConnectionLost);
        }
        PendingOp::Read(cell) => {
            cell.reject(BleError::ConnectionLost);
        }
    }
}

// ----------------------------------------------------------------------------
// Remote Connection
// ----------------------------------------------------------------------------

/// Outbound connection to one peer, identified by its address
pub struct RemoteConnection {
    shared: Arc<LinkShared>,
    transport: Option<TransportHandle>,
}

impl RemoteConnection {
    fn new(address: &str) -> Self {
        Self {
            shared: Arc::new(LinkShared {
                address: address.to_string(),
                inner: Mutex::new(LinkInner {
                    state: ConnectionState::Disconnected,
                    pending: PendingOp::Idle,
                }),
            }),
            transport: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.shared.address
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    pub fn transport(&self) -> Option<TransportHandle> {
        self.transport
    }

    fn callbacks(&self) -> ConnectionCallbacks {
        ConnectionCallbacks {
            shared: Arc::clone(&self.shared),
        }
    }

    fn arm(&self, next: ConnectionState, op: PendingOp) {
        let mut inner = self.shared.lock();
        if !matches!(inner.pending, PendingOp::Idle) {
            warn!(address = %self.shared.address, "replacing an operation that never completed");
        }
        inner.state = next;
        inner.pending = op;
    }

    fn set_state(&self, state: ConnectionState) {
        self.shared.lock().state = state;
    }

    /// Clear the pending slot and fall back to `state`
    fn abandon(&self, state: ConnectionState) {
        let mut inner = self.shared.lock();
        inner.pending = PendingOp::Idle;
        inner.state = state;
    }

    async fn connect(
        &mut self,
        adapter: &dyn RadioAdapter,
        limit: Option<Duration>,
    ) -> Result<()> {
        let cell = CompletionCell::new("connect");
        self.arm(ConnectionState::Connecting, PendingOp::Connect(cell.clone()));

        match self.transport {
            None => match adapter.connect(self.address(), self.callbacks()) {
                Ok(handle) => self.transport = Some(handle),
                Err(e) => {
                    self.abandon(ConnectionState::Disconnected);
                    return Err(e);
                }
            },
            Some(handle) => {
                if !adapter.reconnect(handle) {
                    self.abandon(ConnectionState::Disconnected);
                    return Err(BleError::ConnectRequestFailed);
                }
            }
        }

        self.settle(cell, limit, ConnectionState::Disconnected).await
    }

    async fn discover(
        &mut self,
        adapter: &dyn RadioAdapter,
        transport: TransportHandle,
        limit: Option<Duration>,
    ) -> Result<()> {
        let cell = CompletionCell::new("discover-services");
        self.arm(
            ConnectionState::DiscoveringServices,
            PendingOp::Discover(cell.clone()),
        );
        if let Err(e) = adapter.discover_services(transport) {
            self.abandon(ConnectionState::Connected);
            return Err(e);
        }
        self.settle(cell, limit, ConnectionState::Connected).await
    }

    async fn read(
        &mut self,
        adapter: &dyn RadioAdapter,
        transport: TransportHandle,
        service: Uuid,
        characteristic: Uuid,
        limit: Option<Duration>,
    ) -> Result<Vec<u8>> {
        let cell = CompletionCell::new("characteristic-read");
        let state = self.state();
        self.arm(state, PendingOp::Read(cell.clone()));
        if let Err(e) = adapter.read_characteristic(transport, service, characteristic) {
            self.abandon(state);
            return Err(e);
        }
        self.settle(cell, limit, state).await
    }

    async fn settle<T: Clone>(
        &self,
        cell: CompletionCell<T>,
        limit: Option<Duration>,
        on_timeout: ConnectionState,
    ) -> Result<T> {
        let outcome = cell.wait_for(limit).await;
        if let Err(BleError::OperationTimedOut { operation, .. }) = &outcome {
            warn!(address = %self.shared.address, operation, "radio never answered");
            self.abandon(on_timeout);
        }
        outcome
    }
}

// ----------------------------------------------------------------------------
// Connection Manager
// ----------------------------------------------------------------------------

/// Table of outbound connections, one per peer address (case-insensitive)
#[derive(Default)]
pub struct ConnectionManager {
    connections: HashMap<String, RemoteConnection>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn get(&self, address: &str) -> Option<&RemoteConnection> {
        self.connections.get(&address.to_ascii_lowercase())
    }

    pub fn state(&self, address: &str) -> Option<ConnectionState> {
        self.get(address).map(RemoteConnection::state)
    }

    /// Connect if needed, discover if needed, then read one characteristic
    pub async fn read_characteristic(
        &mut self,
        adapter: &dyn RadioAdapter,
        address: &str,
        service: Uuid,
        characteristic: Uuid,
        limit: Option<Duration>,
    ) -> Result<Vec<u8>> {
        let key = address.to_ascii_lowercase();
        let connection = self
            .connections
            .entry(key)
            .or_insert_with(|| RemoteConnection::new(address));

        if connection.state() == ConnectionState::Disconnected || connection.transport.is_none() {
            debug!(%address, "connecting");
            connection.connect(adapter, limit).await?;
        }
        let transport = connection
            .transport
            .ok_or_else(|| BleError::Radio("connection has no transport".into()))?;

        if adapter.discovered_services(transport).is_empty() {
            debug!(%address, "discovering services");
            connection.discover(adapter, transport, limit).await?;
        } else if connection.state() == ConnectionState::Connected {
            connection.set_state(ConnectionState::Ready);
        }

        let services = adapter.discovered_services(transport);
        let remote = services
            .iter()
            .find(|s| s.uuid == service)
            .ok_or(BleError::ServiceNotFound)?;
        if !remote.characteristics.contains(&characteristic) {
            return Err(BleError::CharacteristicNotFound);
        }

        let value = connection
            .read(adapter, transport, service, characteristic, limit)
            .await?;
        debug!(%address, %characteristic, "read {} bytes: {}", value.len(), hex::encode(&value));
        Ok(value)
    }

    /// Drop the connection to `address`. Returns `false` if there was none.
    pub fn disconnect(&mut self, adapter: &dyn RadioAdapter, address: &str) -> bool {
        let Some(connection) = self.connections.remove(&address.to_ascii_lowercase()) else {
            return false;
        };
        if let Some(transport) = connection.transport {
            adapter.disconnect(transport);
        }
        connection.abandon(ConnectionState::Disconnected);
        info!(%address, "connection released");
        true
    }

    pub fn disconnect_all(&mut self, adapter: &dyn RadioAdapter) {
        let addresses: Vec<String> = self.connections.keys().cloned().collect();
        for address in addresses {
            self.disconnect(adapter, &address);
        }
    }
}
