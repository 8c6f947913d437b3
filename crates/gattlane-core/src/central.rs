//! Outbound central events and the discovered-device directory

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{BleError, Failure};
use crate::scan::{DiscoveredDevice, ScanEndReason, ScanListener};

// ----------------------------------------------------------------------------
// Central Events
// ----------------------------------------------------------------------------

/// Fire-and-forget notification emitted to application code
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum CentralEvent {
    ScanStarted,
    ScanStartFailed(Failure),
    ScanAdded(DiscoveredDevice),
    ScanRemoved(DiscoveredDevice),
    ScanEnded(ScanEndReason),
}

/// Scan listener that forwards every notification over an unbounded channel
pub struct ChannelScanListener {
    tx: mpsc::UnboundedSender<CentralEvent>,
}

impl ChannelScanListener {
    /// Create a listener and the receiving end of its channel
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<CentralEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn emit(&self, event: CentralEvent) {
        if self.tx.send(event).is_err() {
            debug!("central event dropped, receiver is gone");
        }
    }
}

impl ScanListener for ChannelScanListener {
    fn on_start(&self) {
        self.emit(CentralEvent::ScanStarted);
    }

    fn on_start_failed(&self, error: &BleError) {
        self.emit(CentralEvent::ScanStartFailed(Failure::from(error)));
    }

    fn on_device_found(&self, device: DiscoveredDevice) {
        self.emit(CentralEvent::ScanAdded(device));
    }

    fn on_device_lost(&self, device: DiscoveredDevice) {
        self.emit(CentralEvent::ScanRemoved(device));
    }

    fn on_scan_ended(&self, reason: ScanEndReason) {
        self.emit(CentralEvent::ScanEnded(reason));
    }
}

// ----------------------------------------------------------------------------
// Device Directory
// ----------------------------------------------------------------------------

/// Change produced by folding a central event into the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryChange {
    Added(DiscoveredDevice),
    Updated(DiscoveredDevice),
    Removed(DiscoveredDevice),
}

/// Devices seen by scanning, keyed by address
#[derive(Debug, Default)]
pub struct DeviceDirectory {
    devices: HashMap<String, DiscoveredDevice>,
    order: Vec<String>,
    scanning: bool,
}

impl DeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, address: &str) -> Option<&DiscoveredDevice> {
        self.devices.get(&address.to_ascii_lowercase())
    }

    /// Devices in the order they were first seen
    pub fn devices(&self) -> impl Iterator<Item = &DiscoveredDevice> {
        self.order.iter().filter_map(|key| self.devices.get(key))
    }

    pub fn apply(&mut self, event: &CentralEvent) -> Option<DirectoryChange> {
        match event {
            CentralEvent::ScanStarted => {
                self.scanning = true;
                None
            }
            CentralEvent::ScanStartFailed(_) | CentralEvent::ScanEnded(_) => {
                self.scanning = false;
                None
            }
            CentralEvent::ScanAdded(device) => {
                let key = device.address.to_ascii_lowercase();
                match self.devices.get_mut(&key) {
                    Some(known) => {
                        known.name = device.name.clone();
                        known.rssi = device.rssi;
                        Some(DirectoryChange::Updated(known.clone()))
                    }
                    None => {
                        self.devices.insert(key.clone(), device.clone());
                        self.order.push(key);
                        Some(DirectoryChange::Added(device.clone()))
                    }
                }
            }
            CentralEvent::ScanRemoved(device) => {
                let key = device.address.to_ascii_lowercase();
                let removed = self.devices.remove(&key)?;
                self.order.retain(|k| *k != key);
                Some(DirectoryChange::Removed(removed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(address: &str, rssi: i16) -> DiscoveredDevice {
        DiscoveredDevice {
            address: address.into(),
            name: Some("peer".into()),
            rssi,
        }
    }

    #[test]
    fn test_directory_classifies_added_and_updated() {
        let mut directory = DeviceDirectory::new();
        directory.apply(&CentralEvent::ScanStarted);

        let first = directory.apply(&CentralEvent::ScanAdded(device("AA:BB", -70)));
        let again = directory.apply(&CentralEvent::ScanAdded(device("aa:bb", -40)));

        assert_eq!(first, Some(DirectoryChange::Added(device("AA:BB", -70))));
        assert!(matches!(again, Some(DirectoryChange::Updated(d)) if d.rssi == -40));
        assert_eq!(directory.len(), 1);
        assert!(directory.is_scanning());
    }

    #[test]
    fn test_directory_drops_removed_devices() {
        let mut directory = DeviceDirectory::new();
        directory.apply(&CentralEvent::ScanAdded(device("aa", -70)));
        directory.apply(&CentralEvent::ScanAdded(device("bb", -70)));

        let removed = directory.apply(&CentralEvent::ScanRemoved(device("aa", -90)));
        let unknown = directory.apply(&CentralEvent::ScanRemoved(device("zz", -90)));

        assert!(matches!(removed, Some(DirectoryChange::Removed(_))));
        assert_eq!(unknown, None);
        let left: Vec<_> = directory.devices().map(|d| d.address.as_str()).collect();
        assert_eq!(left, vec!["bb"]);
    }

    #[test]
    fn test_scan_end_clears_scanning_flag() {
        let mut directory = DeviceDirectory::new();
        directory.apply(&CentralEvent::ScanStarted);
        directory.apply(&CentralEvent::ScanEnded(ScanEndReason::Superseded));
        assert!(!directory.is_scanning());
    }

    #[tokio::test]
    async fn test_channel_listener_forwards_events() {
        let (listener, mut rx) = ChannelScanListener::channel();
        listener.on_start();
        listener.on_device_found(device("aa", -50));
        listener.on_scan_ended(ScanEndReason::Stopped);

        assert_eq!(rx.recv().await, Some(CentralEvent::ScanStarted));
        assert_eq!(rx.recv().await, Some(CentralEvent::ScanAdded(device("aa", -50))));
        assert_eq!(
            rx.recv().await,
            Some(CentralEvent::ScanEnded(ScanEndReason::Stopped))
        );
    }
}
