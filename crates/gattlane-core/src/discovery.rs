//! Discovery profile: publish a JSON document as a GATT service and fetch it
//! back from a peer
//!
//! The document is serialised to JSON and split into 448-byte packets. Every
//! packet but the last carries a trailing continuation byte. Packet `i` is
//! exposed as the readable characteristic `named_uuid("data#i")`, and a
//! writable `msg` characteristic is appended for inbound messages.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::{uuid, Uuid};

use crate::coordinator::BleCoordinator;
use crate::error::{BleError, Result};
use crate::service::{CharacteristicSpec, LocalService};

/// Namespace for uuids derived from names
pub const DISCOVERY_NAMESPACE: Uuid = uuid!("bb652ee7-940b-4ace-981f-9ce7889dae39");

/// Size of one data packet before the continuation byte
pub const PACKET_SIZE: usize = 448;

/// Trailing byte on every packet that has a successor
pub const CONTINUATION: u8 = 0x01;

/// Upper bound on packets followed by [`DiscoveryProfile::fetch`]
pub const MAX_PACKETS: usize = 256;

/// `text` itself if it already is a uuid, otherwise its name-based uuid
pub fn named_uuid(text: &str) -> Uuid {
    Uuid::parse_str(text)
        .unwrap_or_else(|_| Uuid::new_v5(&DISCOVERY_NAMESPACE, text.as_bytes()))
}

/// Characteristic uuid of data packet `index`
pub fn packet_uuid(index: usize) -> Uuid {
    named_uuid(&format!("data#{}", index))
}

/// Split `data` into continuation-marked packets
pub fn encode_packets<T: Serialize>(data: &T) -> Result<Vec<Vec<u8>>> {
    let text = serde_json::to_vec(data)?;
    let chunks: Vec<&[u8]> = text.chunks(PACKET_SIZE).collect();
    let last = chunks.len().saturating_sub(1);

    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut packet = chunk.to_vec();
            if i < last {
                packet.push(CONTINUATION);
            }
            packet
        })
        .collect())
}

/// Join packets produced by [`encode_packets`] and decode the document
pub fn reassemble<T: DeserializeOwned>(packets: &[Vec<u8>]) -> Result<T> {
    let Some((last, rest)) = packets.split_last() else {
        return Err(BleError::InvalidPayload("no packets".into()));
    };

    let mut text = Vec::with_capacity(packets.len() * PACKET_SIZE);
    for (i, packet) in rest.iter().enumerate() {
        match packet.split_last() {
            Some((&CONTINUATION, body)) => text.extend_from_slice(body),
            _ => {
                return Err(BleError::InvalidPayload(format!(
                    "packet {} is missing its continuation byte",
                    i
                )))
            }
        }
    }
    if last.last() == Some(&CONTINUATION) {
        return Err(BleError::InvalidPayload("final packet expects a successor".into()));
    }
    text.extend_from_slice(last);

    Ok(serde_json::from_slice(&text)?)
}

// ----------------------------------------------------------------------------
// Profile
// ----------------------------------------------------------------------------

/// Group membership used to advertise and discover documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryProfile {
    group_id: String,
    device_id: String,
    service_uuid: Uuid,
}

impl DiscoveryProfile {
    /// Profile for `group_id`. Without a device id a random one is generated.
    pub fn new(group_id: &str, device_id: Option<String>) -> Result<Self> {
        if group_id.is_empty() {
            return Err(BleError::InvalidPayload("a group id is required".into()));
        }
        Ok(Self {
            group_id: group_id.to_string(),
            device_id: device_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            service_uuid: named_uuid(group_id),
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn service_uuid(&self) -> Uuid {
        self.service_uuid
    }

    /// Scan filter matching peers of this group
    pub fn scan_filter(&self) -> Vec<Uuid> {
        vec![self.service_uuid]
    }

    /// Service publishing `data`
    pub fn service_for<T: Serialize>(&self, data: &T) -> Result<LocalService> {
        let packets = encode_packets(data)?;
        debug!(group = %self.group_id, packets = packets.len(), "encoded discovery document");

        let service = packets
            .into_iter()
            .enumerate()
            .fold(LocalService::new(self.service_uuid), |service, (i, packet)| {
                service.with_characteristic(CharacteristicSpec::readable(packet_uuid(i), packet))
            });
        Ok(service.with_characteristic(CharacteristicSpec::writable(named_uuid("msg"))))
    }

    /// Publish `data`, replacing whatever this device published before
    pub async fn advertise<T: Serialize>(&self, coordinator: &BleCoordinator, data: &T) -> Result<()> {
        let service = self.service_for(data)?;
        coordinator.create_service(service).await
    }

    /// Read and decode the document published by the peer at `address`
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        coordinator: &BleCoordinator,
        address: &str,
    ) -> Result<T> {
        let mut packets = Vec::new();
        for index in 0..MAX_PACKETS {
            let packet = coordinator
                .read_characteristic(address, self.service_uuid, packet_uuid(index))
                .await?;
            let more = packet.last() == Some(&CONTINUATION);
            packets.push(packet);
            if !more {
                return reassemble(&packets);
            }
        }
        Err(BleError::InvalidPayload(format!(
            "document spans more than {} packets",
            MAX_PACKETS
        )))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_named_uuid_passes_uuids_through() {
        let text = "0000180f-0000-1000-8000-00805f9b34fb";
        assert_eq!(named_uuid(text), Uuid::parse_str(text).unwrap());
        assert_eq!(named_uuid("com.example"), named_uuid("com.example"));
        assert_ne!(named_uuid("com.example"), named_uuid("com.other"));
        assert_eq!(named_uuid("msg").get_version_num(), 5);
    }

    #[test]
    fn test_small_document_is_one_packet_without_continuation() {
        let packets = encode_packets(&json!({"name": "kiosk"})).unwrap();
        assert_eq!(packets.len(), 1);
        assert_ne!(packets[0].last(), Some(&CONTINUATION));
    }

    #[test]
    fn test_large_document_is_split_and_reassembled() {
        let data = json!({ "blob": "x".repeat(1000) });
        let packets = encode_packets(&data).unwrap();

        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].len(), PACKET_SIZE + 1);
        assert_eq!(packets[1].last(), Some(&CONTINUATION));
        let back: serde_json::Value = reassemble(&packets).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_reassemble_rejects_truncated_documents() {
        let packets = encode_packets(&json!({ "blob": "y".repeat(600) })).unwrap();
        let err = reassemble::<serde_json::Value>(&packets[..1]).unwrap_err();
        assert_eq!(err.kind(), "invalid_payload");
        assert!(reassemble::<serde_json::Value>(&[]).is_err());
    }

    #[test]
    fn test_service_layout() {
        let profile = DiscoveryProfile::new("com.example.app", Some("device-1".into())).unwrap();
        let service = profile
            .service_for(&json!({ "blob": "z".repeat(500) }))
            .unwrap();

        assert_eq!(service.uuid, named_uuid("com.example.app"));
        let uuids: Vec<Uuid> = service.characteristics.iter().map(|c| c.uuid).collect();
        assert_eq!(uuids, vec![packet_uuid(0), packet_uuid(1), named_uuid("msg")]);

        let msg = service.characteristic(named_uuid("msg")).unwrap();
        assert!(msg.writable && !msg.readable && msg.static_value.is_none());
        assert!(service.characteristics[0].readable);
    }

    #[test]
    fn test_profile_requires_a_group() {
        assert!(DiscoveryProfile::new("", None).is_err());
        let profile = DiscoveryProfile::new("group", None).unwrap();
        assert!(Uuid::parse_str(profile.device_id()).is_ok());
    }
}
