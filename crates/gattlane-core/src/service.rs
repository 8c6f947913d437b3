//! Local GATT service definitions and the service registry

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Service Definitions
// ----------------------------------------------------------------------------

/// Characteristic exposed by a local service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicSpec {
    pub uuid: Uuid,
    pub readable: bool,
    pub writable: bool,
    /// Value served to remote reads. Without one, reads are answered as unsupported.
    pub static_value: Option<Vec<u8>>,
}

impl CharacteristicSpec {
    /// Readable characteristic serving a fixed value
    pub fn readable(uuid: Uuid, value: impl Into<Vec<u8>>) -> Self {
        Self {
            uuid,
            readable: true,
            writable: false,
            static_value: Some(value.into()),
        }
    }

    /// Writable characteristic without a stored value
    pub fn writable(uuid: Uuid) -> Self {
        Self {
            uuid,
            readable: false,
            writable: true,
            static_value: None,
        }
    }
}

/// Local GATT service entry, identified by its uuid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalService {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicSpec>,
}

impl LocalService {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: CharacteristicSpec) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    pub fn characteristic(&self, uuid: Uuid) -> Option<&CharacteristicSpec> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

/// Ordered set of registered local services, at most one per uuid
///
/// Insertion order is the order service uuids appear in the advertisement.
#[derive(Debug, Default, Clone)]
pub struct ServiceRegistry {
    entries: Vec<LocalService>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.entries.iter().any(|s| s.uuid == uuid)
    }

    pub fn get(&self, uuid: Uuid) -> Option<&LocalService> {
        self.entries.iter().find(|s| s.uuid == uuid)
    }

    /// Append a service. Callers remove any entry with the same uuid first.
    pub fn push(&mut self, service: LocalService) {
        debug_assert!(!self.contains(service.uuid));
        self.entries.push(service);
    }

    /// Remove the entry for `uuid`, returning it
    pub fn remove(&mut self, uuid: Uuid) -> Option<LocalService> {
        let index = self.entries.iter().position(|s| s.uuid == uuid)?;
        Some(self.entries.remove(index))
    }

    /// Service uuids in insertion order
    pub fn uuids(&self) -> Vec<Uuid> {
        self.entries.iter().map(|s| s.uuid).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalService> {
        self.entries.iter()
    }

    pub fn drain(&mut self) -> Vec<LocalService> {
        std::mem::take(&mut self.entries)
    }
}
