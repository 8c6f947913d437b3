//! Scan session: at most one active scan, superseded scans are ended first
//!
//! Starting and stopping happen on the lane. Results arrive afterwards on the
//! radio's notification context through a [`ScanSink`], which filters them and
//! forwards them to the session's [`ScanListener`] without touching the lane.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::ScanSettings;
use crate::error::{BleError, Result};
use crate::protocol::{ScanCallbackType, ScanFailure};
use crate::radio::{RadioAdapter, ScanHandle};

/// Manufacturer data prefix of a backgrounded iOS peripheral: Apple's company
/// id followed by the overflow-area type. Its hashed services cannot be read
/// from the record, so a filtered scan lets it through.
pub const APPLE_OVERFLOW_MARKER: [u8; 4] = [0xFF, 0x4C, 0x00, 0x01];

// ----------------------------------------------------------------------------
// Scan Results
// ----------------------------------------------------------------------------

/// Raw scan result as reported by the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub address: String,
    pub name: Option<String>,
    pub rssi: i16,
    pub service_uuids: Vec<Uuid>,
    /// Raw advertisement bytes
    pub raw: Vec<u8>,
}

impl ScanRecord {
    pub fn has_overflow_marker(&self) -> bool {
        self.raw
            .windows(APPLE_OVERFLOW_MARKER.len())
            .any(|w| w == APPLE_OVERFLOW_MARKER)
    }
}

/// Device summary forwarded to scan listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub address: String,
    pub name: Option<String>,
    pub rssi: i16,
}

impl From<&ScanRecord> for DiscoveredDevice {
    fn from(record: &ScanRecord) -> Self {
        Self {
            address: record.address.clone(),
            name: record.name.clone(),
            rssi: record.rssi,
        }
    }
}

/// Why a scan session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanEndReason {
    /// A newer scan replaced this one
    Superseded,
    /// Explicitly stopped
    Stopped,
    /// The radio ended the scan
    Failed(ScanFailure),
}

impl fmt::Display for ScanEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanEndReason::Superseded => write!(f, "{}", BleError::ScanAlreadyActive),
            ScanEndReason::Stopped => f.write_str("Scan stopped."),
            ScanEndReason::Failed(failure) => write!(f, "Scan interrupted. {}", failure),
        }
    }
}

// ----------------------------------------------------------------------------
// Listener
// ----------------------------------------------------------------------------

/// One-way receiver of scan notifications
///
/// Start callbacks are invoked on the lane; result and end callbacks may come
/// from the radio's notification context. Implementations must not block.
pub trait ScanListener: Send + Sync {
    fn on_start(&self);

    fn on_start_failed(&self, error: &BleError);

    fn on_device_found(&self, device: DiscoveredDevice);

    fn on_device_lost(&self, device: DiscoveredDevice);

    fn on_scan_ended(&self, reason: ScanEndReason);
}

// ----------------------------------------------------------------------------
// Scan Sink
// ----------------------------------------------------------------------------

struct SinkShared {
    filter: Vec<Uuid>,
    listener: Arc<dyn ScanListener>,
    closed: AtomicBool,
}

/// Where the radio delivers results for one scan
#[derive(Clone)]
pub struct ScanSink {
    shared: Arc<SinkShared>,
}

impl ScanSink {
    fn new(filter: Vec<Uuid>, listener: Arc<dyn ScanListener>) -> Self {
        Self {
            shared: Arc::new(SinkShared {
                filter,
                listener,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Whether this sink's scan has ended. Closed sinks drop every result.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Filter rule: pass everything when unfiltered, otherwise require a
    /// matching service uuid or the overflow marker
    pub fn matches(&self, record: &ScanRecord) -> bool {
        let filter = &self.shared.filter;
        filter.is_empty()
            || record.service_uuids.iter().any(|uuid| filter.contains(uuid))
            || record.has_overflow_marker()
    }

    pub fn on_result(&self, kind: ScanCallbackType, record: ScanRecord) {
        if self.is_closed() {
            debug!(address = %record.address, "result for an ended scan dropped");
            return;
        }
        if !self.matches(&record) {
            return;
        }

        let device = DiscoveredDevice::from(&record);
        match kind {
            ScanCallbackType::MatchLost => self.shared.listener.on_device_lost(device),
            ScanCallbackType::FirstMatch | ScanCallbackType::AllMatches => {
                self.shared.listener.on_device_found(device)
            }
        }
    }

    pub fn on_failed(&self, failure: ScanFailure) {
        error!("scan failed: {}", failure);
        self.end(ScanEndReason::Failed(failure));
    }

    /// Close the sink and notify the listener. Only the first call notifies.
    fn end(&self, reason: ScanEndReason) -> bool {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shared.listener.on_scan_ended(reason);
        true
    }

    fn close_silently(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

// ----------------------------------------------------------------------------
// Scan Session
// ----------------------------------------------------------------------------

struct ActiveScan {
    handle: ScanHandle,
    sink: ScanSink,
    filter: Vec<Uuid>,
}

/// Owner of the single active scan
#[derive(Default)]
pub struct ScanSession {
    active: Option<ActiveScan>,
}

impl ScanSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a scan is running that the radio has not ended
    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(|scan| !scan.sink.is_closed())
    }

    pub fn filter(&self) -> Option<&[Uuid]> {
        self.active.as_ref().map(|scan| scan.filter.as_slice())
    }

    /// End any running scan, then start a new one
    pub fn start(
        &mut self,
        adapter: &dyn RadioAdapter,
        filter: Vec<Uuid>,
        settings: &ScanSettings,
        listener: Arc<dyn ScanListener>,
    ) -> Result<()> {
        if self.supersede(adapter) {
            info!("previous scan superseded");
        }

        let sink = ScanSink::new(filter.clone(), Arc::clone(&listener));
        match adapter.start_scan(&filter, settings, sink.clone()) {
            Ok(handle) => {
                info!(filtered = filter.len(), "scan started");
                self.active = Some(ActiveScan {
                    handle,
                    sink,
                    filter,
                });
                listener.on_start();
                Ok(())
            }
            Err(e) => {
                error!("unable to start scan: {}", e);
                sink.close_silently();
                listener.on_start_failed(&e);
                Err(e)
            }
        }
    }

    /// End the running scan as superseded. Returns `false` if there was none.
    pub fn supersede(&mut self, adapter: &dyn RadioAdapter) -> bool {
        self.end_active(adapter, ScanEndReason::Superseded)
    }

    /// Stop the running scan. Returns `false` if there was none.
    pub fn stop(&mut self, adapter: &dyn RadioAdapter) -> bool {
        self.end_active(adapter, ScanEndReason::Stopped)
    }

    /// Notify the running scan's listener first, then release it at the radio
    fn end_active(&mut self, adapter: &dyn RadioAdapter, reason: ScanEndReason) -> bool {
        let Some(scan) = self.active.take() else {
            return false;
        };
        scan.sink.end(reason);
        adapter.stop_scan(scan.handle);
        debug!(%reason, "scan released");
        true
    }
}
