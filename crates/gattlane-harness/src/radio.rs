//! Simulated radio
//!
//! Implements [`RadioAdapter`] in memory. Request methods record the call,
//! update the simulated stack and schedule the completion on a dedicated
//! notification thread, so callbacks always arrive from a thread other than
//! the caller's, after the request method has returned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use gattlane_core::{
    AdvertiseEvent, AdvertiseFailure, AdvertiseListener, AdvertisePayload, AdvertiseSettings,
    BleError, ConnectionCallbacks, ConnectionEvent, GattResponse, GattServerRouter, GattStatus,
    LinkState, LocalService, RadioAdapter, RemoteService, Result, ScanCallbackType, ScanFailure,
    ScanHandle, ScanRecord, ScanSettings, ScanSink, ServerEvent, ServerHandle, TransportHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::peer::{SimulatedRadioConfig, VirtualPeer};

// ----------------------------------------------------------------------------
// Call Log
// ----------------------------------------------------------------------------

/// One request made to the simulated radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    OpenServer,
    CloseServer,
    AddService(Uuid),
    RemoveService(Uuid),
    StartAdvertising(Vec<Uuid>),
    StopAdvertising,
    StartScan(Vec<Uuid>),
    StopScan,
    Connect(String),
    Reconnect(String),
    DiscoverServices(String),
    ReadCharacteristic {
        address: String,
        service: Uuid,
        characteristic: Uuid,
    },
    Disconnect(String),
}

/// Counters kept by the simulated radio
#[derive(Debug, Default)]
pub struct RadioStats {
    pub completions_delivered: AtomicU64,
    pub completions_muted: AtomicU64,
    pub responses_sent: AtomicU64,
}

// ----------------------------------------------------------------------------
// Notification Thread
// ----------------------------------------------------------------------------

type Notification = Box<dyn FnOnce() + Send>;

enum Delivery {
    Run(Notification),
    Flush(mpsc::Sender<()>),
}

fn spawn_notifier(latency: Duration, stats: Arc<RadioStats>) -> mpsc::Sender<Delivery> {
    let (tx, rx) = mpsc::channel::<Delivery>();
    let spawned = thread::Builder::new()
        .name("radio-notify".into())
        .spawn(move || {
            while let Ok(delivery) = rx.recv() {
                match delivery {
                    Delivery::Run(notification) => {
                        if !latency.is_zero() {
                            thread::sleep(latency);
                        }
                        notification();
                        stats.completions_delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Delivery::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            debug!("radio notification thread stopped");
        });
    if let Err(e) = spawned {
        warn!("unable to spawn the radio notification thread: {}", e);
    }
    tx
}

// ----------------------------------------------------------------------------
// Simulated Stack
// ----------------------------------------------------------------------------

struct Link {
    address: String,
    callbacks: ConnectionCallbacks,
    connected: bool,
    discovered: Vec<RemoteService>,
}

#[derive(Default)]
struct Knobs {
    fail_server_open: bool,
    service_status: HashMap<Uuid, GattStatus>,
    advertise_failure: Option<AdvertiseFailure>,
    scan_start_error: Option<BleError>,
    muted: bool,
}

#[derive(Default)]
struct Stack {
    server: Option<(ServerHandle, GattServerRouter)>,
    live_services: Vec<LocalService>,
    advertising: Option<AdvertisePayload>,
    scans: Vec<(ScanHandle, ScanSink)>,
    links: HashMap<TransportHandle, Link>,
    peers: HashMap<String, VirtualPeer>,
    calls: Vec<RadioCall>,
    responses: Vec<GattResponse>,
    next_handle: u64,
}

impl Stack {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn peer(&self, address: &str) -> Option<&VirtualPeer> {
        self.peers.get(&address.to_ascii_lowercase())
    }
}

/// In-memory radio with a configurable set of virtual peers
pub struct SimulatedRadio {
    config: Mutex<SimulatedRadioConfig>,
    knobs: Mutex<Knobs>,
    stack: Mutex<Stack>,
    notifier: Mutex<mpsc::Sender<Delivery>>,
    stats: Arc<RadioStats>,
}

impl SimulatedRadio {
    pub fn new(config: SimulatedRadioConfig) -> Arc<Self> {
        let stats = Arc::new(RadioStats::default());
        let notifier = spawn_notifier(Duration::from_millis(config.latency_ms), Arc::clone(&stats));
        Arc::new(Self {
            config: Mutex::new(config),
            knobs: Mutex::new(Knobs::default()),
            stack: Mutex::new(Stack::default()),
            notifier: Mutex::new(notifier),
            stats,
        })
    }

    pub fn ideal() -> Arc<Self> {
        Self::new(SimulatedRadioConfig::ideal())
    }

    pub fn with_peers(config: SimulatedRadioConfig, peers: Vec<VirtualPeer>) -> Arc<Self> {
        let radio = Self::new(config);
        for peer in peers {
            radio.add_peer(peer);
        }
        radio
    }

    fn stack(&self) -> MutexGuard<'_, Stack> {
        self.stack.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn knobs(&self) -> MutexGuard<'_, Knobs> {
        self.knobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn config(&self) -> MutexGuard<'_, SimulatedRadioConfig> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule a completion. Dropped while completions are muted.
    fn complete(&self, notification: impl FnOnce() + Send + 'static) {
        if self.knobs().muted {
            debug!("completion muted");
            self.stats.completions_muted.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.deliver(notification);
    }

    /// Schedule an event regardless of muting
    fn deliver(&self, notification: impl FnOnce() + Send + 'static) {
        let notifier = self.notifier.lock().unwrap_or_else(PoisonError::into_inner);
        if notifier.send(Delivery::Run(Box::new(notification))).is_err() {
            warn!("radio notification thread is gone");
        }
    }

    // ------------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------------

    pub fn add_peer(&self, peer: VirtualPeer) {
        let key = peer.address.to_ascii_lowercase();
        self.stack().peers.insert(key, peer);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.config().enabled = enabled;
    }

    pub fn set_multi_advertisement(&self, supported: bool) {
        self.config().multi_advertisement = supported;
    }

    pub fn set_location_permission(&self, granted: bool) {
        self.config().location_permission = granted;
    }

    pub fn fail_server_open(&self, fail: bool) {
        self.knobs().fail_server_open = fail;
    }

    /// Status reported when `service` is added. Success unless set.
    pub fn set_service_status(&self, service: Uuid, status: GattStatus) {
        self.knobs().service_status.insert(service, status);
    }

    pub fn set_advertise_failure(&self, failure: Option<AdvertiseFailure>) {
        self.knobs().advertise_failure = failure;
    }

    pub fn set_scan_start_error(&self, error: Option<BleError>) {
        self.knobs().scan_start_error = error;
    }

    /// Stop delivering completions, as a radio that never answers would
    pub fn mute_completions(&self, muted: bool) {
        self.knobs().muted = muted;
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn stats(&self) -> &RadioStats {
        &self.stats
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.stack().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.stack().calls.clear();
    }

    pub fn count_calls(&self, predicate: impl Fn(&RadioCall) -> bool) -> usize {
        self.stack().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn responses(&self) -> Vec<GattResponse> {
        self.stack().responses.clone()
    }

    pub fn server_open(&self) -> bool {
        self.stack().server.is_some()
    }

    /// Services currently live on the server
    pub fn live_services(&self) -> Vec<LocalService> {
        self.stack().live_services.clone()
    }

    /// Service uuids in the running advertisement, `None` when not advertising
    pub fn advertised_services(&self) -> Option<Vec<Uuid>> {
        self.stack()
            .advertising
            .as_ref()
            .map(|payload| payload.service_uuids.to_vec())
    }

    pub fn active_scans(&self) -> usize {
        self.stack().scans.len()
    }

    pub fn open_links(&self) -> usize {
        self.stack().links.len()
    }

    /// Whether some link to `address` is currently up
    pub fn is_connected(&self, address: &str) -> bool {
        self.stack()
            .links
            .values()
            .any(|link| link.connected && link.address.eq_ignore_ascii_case(address))
    }

    /// Block until every notification scheduled so far has been delivered
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        let sent = self
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(Delivery::Flush(ack_tx))
            .is_ok();
        if sent {
            let _ = ack_rx.recv();
        }
    }

    // ------------------------------------------------------------------------
    // Injection
    // ------------------------------------------------------------------------

    /// Report `record` to every running scan
    pub fn emit_scan_record(&self, kind: ScanCallbackType, record: ScanRecord) {
        let sinks: Vec<ScanSink> = self.stack().scans.iter().map(|(_, s)| s.clone()).collect();
        for sink in sinks {
            let record = record.clone();
            self.deliver(move || sink.on_result(kind, record));
        }
    }

    /// Report a known peer to every running scan
    pub fn emit_scan_result(&self, address: &str, kind: ScanCallbackType) {
        let record = self.stack().peer(address).map(VirtualPeer::scan_record);
        match record {
            Some(record) => self.emit_scan_record(kind, record),
            None => warn!(%address, "no such virtual peer"),
        }
    }

    /// End every running scan with a system failure
    pub fn fail_scan(&self, failure: ScanFailure) {
        let sinks: Vec<ScanSink> = self.stack().scans.iter().map(|(_, s)| s.clone()).collect();
        for sink in sinks {
            self.deliver(move || sink.on_failed(failure));
        }
    }

    /// Deliver a raw event to the open GATT server
    pub fn inject_server_event(&self, event: ServerEvent) {
        let router = self.stack().server.as_ref().map(|(_, r)| r.clone());
        match router {
            Some(router) => self.deliver(move || router.dispatch(event)),
            None => warn!("no GATT server open"),
        }
    }

    /// Drop the link to `address` with `status`
    pub fn drop_link(&self, address: &str, status: GattStatus) {
        let mut stack = self.stack();
        let callbacks: Vec<ConnectionCallbacks> = stack
            .links
            .values_mut()
            .filter(|link| link.address.eq_ignore_ascii_case(address))
            .map(|link| {
                link.connected = false;
                link.callbacks.clone()
            })
            .collect();
        drop(stack);

        for callbacks in callbacks {
            self.deliver(move || {
                callbacks.dispatch(ConnectionEvent::StateChanged {
                    status,
                    state: LinkState::Disconnected,
                })
            });
        }
    }

    fn schedule_connect(&self, stack: &mut Stack, transport: TransportHandle) {
        let Some(link) = stack.links.get(&transport) else {
            return;
        };
        let status = stack
            .peer(&link.address)
            .map(|peer| peer.connect_status)
            .unwrap_or(GattStatus::Other(133));
        let state = if status.is_success() {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        };

        let callbacks = link.callbacks.clone();
        if let Some(link) = stack.links.get_mut(&transport) {
            link.connected = status.is_success();
        }
        self.complete(move || callbacks.dispatch(ConnectionEvent::StateChanged { status, state }));
    }
}

// ----------------------------------------------------------------------------
// Radio Adapter
// ----------------------------------------------------------------------------

impl RadioAdapter for SimulatedRadio {
    fn is_radio_enabled(&self) -> bool {
        self.config().enabled
    }

    fn supports_multi_advertisement(&self) -> bool {
        self.config().multi_advertisement
    }

    fn has_location_permission(&self) -> bool {
        self.config().location_permission
    }

    fn open_gatt_server(&self, router: GattServerRouter) -> Result<ServerHandle> {
        let mut stack = self.stack();
        stack.calls.push(RadioCall::OpenServer);
        if self.knobs().fail_server_open {
            return Err(BleError::ServerOpenFailed);
        }
        let handle = ServerHandle(stack.next_handle());
        stack.server = Some((handle, router));
        info!(?handle, "simulated GATT server opened");
        Ok(handle)
    }

    fn close_gatt_server(&self, server: ServerHandle) {
        let mut stack = self.stack();
        stack.calls.push(RadioCall::CloseServer);
        if matches!(stack.server, Some((open, _)) if open == server) {
            stack.server = None;
            stack.live_services.clear();
        }
    }

    fn add_service(&self, server: ServerHandle, service: &LocalService) -> Result<()> {
        let mut stack = self.stack();
        stack.calls.push(RadioCall::AddService(service.uuid));
        let router = match &stack.server {
            Some((open, router)) if *open == server => router.clone(),
            _ => return Err(BleError::Radio("unknown GATT server".into())),
        };

        let uuid = service.uuid;
        let status = self
            .knobs()
            .service_status
            .get(&uuid)
            .copied()
            .unwrap_or(GattStatus::Success);
        if status.is_success() {
            stack.live_services.retain(|s| s.uuid != uuid);
            stack.live_services.push(service.clone());
        }
        drop(stack);

        self.complete(move || router.dispatch(ServerEvent::ServiceAdded { status, service: uuid }));
        Ok(())
    }

    fn remove_service(&self, _server: ServerHandle, service: Uuid) {
        let mut stack = self.stack();
        stack.calls.push(RadioCall::RemoveService(service));
        stack.live_services.retain(|s| s.uuid != service);
    }

    fn send_response(&self, response: GattResponse) {
        debug!(device = %response.device, status = %response.status, "simulated response sent");
        self.stats.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.stack().responses.push(response);
    }

    fn start_advertising(
        &self,
        _settings: &AdvertiseSettings,
        data: &AdvertisePayload,
        _scan_response: &AdvertisePayload,
        listener: AdvertiseListener,
    ) -> Result<()> {
        let mut stack = self.stack();
        stack
            .calls
            .push(RadioCall::StartAdvertising(data.service_uuids.to_vec()));

        let failure = self.knobs().advertise_failure;
        match failure {
            Some(failure) => {
                stack.advertising = None;
                drop(stack);
                self.complete(move || listener.dispatch(AdvertiseEvent::StartFailure(failure)));
            }
            None => {
                stack.advertising = Some(data.clone());
                drop(stack);
                self.complete(move || listener.dispatch(AdvertiseEvent::StartSuccess));
            }
        }
        Ok(())
    }

    fn stop_advertising(&self) {
        let mut stack = self.stack();
        stack.calls.push(RadioCall::StopAdvertising);
        stack.advertising = None;
    }

    fn start_scan(&self, filter: &[Uuid], _settings: &ScanSettings, sink: ScanSink) -> Result<ScanHandle> {
        let mut stack = self.stack();
        stack.calls.push(RadioCall::StartScan(filter.to_vec()));
        if let Some(error) = self.knobs().scan_start_error.clone() {
            return Err(error);
        }
        let handle = ScanHandle(stack.next_handle());
        stack.scans.push((handle, sink));
        Ok(handle)
    }

    fn stop_scan(&self, scan: ScanHandle) {
        let mut stack = self.stack();
        stack.calls.push(RadioCall::StopScan);
        stack.scans.retain(|(handle, _)| *handle != scan);
    }

    fn connect(&self, address: &str, callbacks: ConnectionCallbacks) -> Result<TransportHandle> {
        let mut stack = self.stack();
        stack.calls.push(RadioCall::Connect(address.to_string()));
        let transport = TransportHandle(stack.next_handle());
        stack.links.insert(
            transport,
            Link {
                address: address.to_string(),
                callbacks,
                connected: false,
                discovered: Vec::new(),
            },
        );
        self.schedule_connect(&mut stack, transport);
        Ok(transport)
    }

    fn reconnect(&self, transport: TransportHandle) -> bool {
        let mut stack = self.stack();
        let Some(address) = stack.links.get(&transport).map(|l| l.address.clone()) else {
            return false;
        };
        stack.calls.push(RadioCall::Reconnect(address.clone()));
        if stack.peer(&address).is_some_and(|peer| peer.refuse_reconnect) {
            return false;
        }
        self.schedule_connect(&mut stack, transport);
        true
    }

    fn discover_services(&self, transport: TransportHandle) -> Result<()> {
        let mut stack = self.stack();
        let Some(address) = stack.links.get(&transport).map(|l| l.address.clone()) else {
            return Err(BleError::Radio("unknown transport".into()));
        };
        stack.calls.push(RadioCall::DiscoverServices(address.clone()));

        let (drop_status, status, services) = match stack.peer(&address) {
            Some(peer) => (
                peer.drop_during_discovery,
                peer.discover_status,
                peer.remote_services(),
            ),
            None => (None, GattStatus::Failure, Vec::new()),
        };
        let Some(link) = stack.links.get_mut(&transport) else {
            return Err(BleError::Radio("unknown transport".into()));
        };
        let callbacks = link.callbacks.clone();

        if let Some(status) = drop_status {
            link.connected = false;
            drop(stack);
            self.complete(move || {
                callbacks.dispatch(ConnectionEvent::StateChanged {
                    status,
                    state: LinkState::Disconnected,
                })
            });
            return Ok(());
        }

        if status.is_success() {
            link.discovered = services;
        }
        drop(stack);
        self.complete(move || callbacks.dispatch(ConnectionEvent::ServicesDiscovered { status }));
        Ok(())
    }

    fn discovered_services(&self, transport: TransportHandle) -> Vec<RemoteService> {
        self.stack()
            .links
            .get(&transport)
            .map(|link| link.discovered.clone())
            .unwrap_or_default()
    }

    fn read_characteristic(
        &self,
        transport: TransportHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<()> {
        let mut stack = self.stack();
        let Some(link) = stack.links.get(&transport) else {
            return Err(BleError::Radio("unknown transport".into()));
        };
        let address = link.address.clone();
        let callbacks = link.callbacks.clone();
        stack.calls.push(RadioCall::ReadCharacteristic {
            address: address.clone(),
            service,
            characteristic,
        });

        let (status, value) = match stack.peer(&address) {
            Some(peer) if !peer.read_status.is_success() => (peer.read_status, Vec::new()),
            Some(peer) => match peer.value_of(service, characteristic) {
                Some(value) => (GattStatus::Success, value),
                None => (GattStatus::ReadNotPermitted, Vec::new()),
            },
            None => (GattStatus::Failure, Vec::new()),
        };
        drop(stack);

        self.complete(move || {
            callbacks.dispatch(ConnectionEvent::CharacteristicRead {
                status,
                service,
                characteristic,
                value,
            })
        });
        Ok(())
    }

    fn disconnect(&self, transport: TransportHandle) {
        let mut stack = self.stack();
        if let Some(link) = stack.links.remove(&transport) {
            stack.calls.push(RadioCall::Disconnect(link.address));
        }
    }
}
