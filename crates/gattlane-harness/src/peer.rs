//! Virtual remote peripherals reachable through the simulated radio

use gattlane_core::{GattStatus, LocalService, RemoteService, ScanRecord};
use serde::Deserialize;
use uuid::Uuid;

/// Remote peripheral the simulated radio can scan, connect to and read from
#[derive(Debug, Clone)]
pub struct VirtualPeer {
    pub address: String,
    pub name: Option<String>,
    pub rssi: i16,
    /// GATT services the peer publishes, with the values served to reads
    pub services: Vec<LocalService>,
    /// Extra uuids put in the advertisement besides the services above
    pub advertised: Vec<Uuid>,
    /// Raw advertisement bytes
    pub raw: Vec<u8>,
    pub connect_status: GattStatus,
    pub discover_status: GattStatus,
    pub read_status: GattStatus,
    /// Drop the link with this status instead of finishing discovery
    pub drop_during_discovery: Option<GattStatus>,
    pub refuse_reconnect: bool,
}

impl VirtualPeer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            rssi: -60,
            services: Vec::new(),
            advertised: Vec::new(),
            raw: Vec::new(),
            connect_status: GattStatus::Success,
            discover_status: GattStatus::Success,
            read_status: GattStatus::Success,
            drop_during_discovery: None,
            refuse_reconnect: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    pub fn with_service(mut self, service: LocalService) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_raw_advertisement(mut self, raw: Vec<u8>) -> Self {
        self.raw = raw;
        self
    }

    pub fn advertising(mut self, uuid: Uuid) -> Self {
        self.advertised.push(uuid);
        self
    }

    pub fn with_connect_status(mut self, status: GattStatus) -> Self {
        self.connect_status = status;
        self
    }

    pub fn with_discover_status(mut self, status: GattStatus) -> Self {
        self.discover_status = status;
        self
    }

    pub fn with_read_status(mut self, status: GattStatus) -> Self {
        self.read_status = status;
        self
    }

    pub fn dropping_during_discovery(mut self, status: GattStatus) -> Self {
        self.drop_during_discovery = Some(status);
        self
    }

    pub fn refusing_reconnect(mut self) -> Self {
        self.refuse_reconnect = true;
        self
    }

    /// What discovery reports for this peer
    pub fn remote_services(&self) -> Vec<RemoteService> {
        self.services
            .iter()
            .map(|service| RemoteService {
                uuid: service.uuid,
                characteristics: service.characteristics.iter().map(|c| c.uuid).collect(),
            })
            .collect()
    }

    /// Value served for a read, if the characteristic exists and is readable
    pub fn value_of(&self, service: Uuid, characteristic: Uuid) -> Option<Vec<u8>> {
        self.services
            .iter()
            .find(|s| s.uuid == service)?
            .characteristic(characteristic)
            .filter(|c| c.readable)?
            .static_value
            .clone()
    }

    /// Scan record the radio reports for this peer
    pub fn scan_record(&self) -> ScanRecord {
        let mut service_uuids: Vec<Uuid> = self.services.iter().map(|s| s.uuid).collect();
        service_uuids.extend(self.advertised.iter().copied());
        ScanRecord {
            address: self.address.clone(),
            name: self.name.clone(),
            rssi: self.rssi,
            service_uuids,
            raw: self.raw.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Radio Configuration
// ----------------------------------------------------------------------------

/// Capabilities of the simulated radio
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatedRadioConfig {
    pub enabled: bool,
    pub multi_advertisement: bool,
    pub location_permission: bool,
    /// Delay before each completion is delivered
    pub latency_ms: u64,
}

impl Default for SimulatedRadioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            multi_advertisement: true,
            location_permission: true,
            latency_ms: 0,
        }
    }
}

impl SimulatedRadioConfig {
    /// Radio that answers immediately and supports everything
    pub fn ideal() -> Self {
        Self::default()
    }

    /// Radio with a noticeable completion delay
    pub fn sluggish() -> Self {
        Self {
            latency_ms: 25,
            ..Self::default()
        }
    }

    /// Radio that is switched off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use gattlane_core::CharacteristicSpec;

    use super::*;

    #[test]
    fn test_value_of_requires_readable_characteristic() {
        let service = Uuid::from_u128(1);
        let peer = VirtualPeer::new("aa").with_service(
            LocalService::new(service)
                .with_characteristic(CharacteristicSpec::readable(Uuid::from_u128(2), *b"ok"))
                .with_characteristic(CharacteristicSpec::writable(Uuid::from_u128(3))),
        );

        assert_eq!(peer.value_of(service, Uuid::from_u128(2)), Some(b"ok".to_vec()));
        assert_eq!(peer.value_of(service, Uuid::from_u128(3)), None);
        assert_eq!(peer.value_of(Uuid::from_u128(9), Uuid::from_u128(2)), None);
    }

    #[test]
    fn test_scan_record_lists_services_and_extra_uuids() {
        let peer = VirtualPeer::new("aa")
            .with_service(LocalService::new(Uuid::from_u128(1)))
            .advertising(Uuid::from_u128(5));
        assert_eq!(
            peer.scan_record().service_uuids,
            vec![Uuid::from_u128(1), Uuid::from_u128(5)]
        );
    }
}
