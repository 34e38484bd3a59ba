//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use clinic_sync::{Device, DeviceConfig, DocKey, Document, MemoryNetwork, MemoryStore, MemoryTransport, SyncConfig};
use clinic_sync_core::{DeviceId, ManualClock};

/// Settings that keep tests fast: cheap key derivation, frequent publishing.
pub fn fast_config() -> DeviceConfig {
    DeviceConfig::default().with_sync(
        SyncConfig::default()
            .with_kdf_iterations(1_000)
            .with_publish_interval(Duration::from_millis(25)),
    )
}

/// An in-memory device with a deterministic id and a manual clock.
pub struct TestDevice {
    pub device: Device<MemoryStore, MemoryTransport>,
    pub clock: ManualClock,
}

impl TestDevice {
    /// Create a device whose id is `[id; 16]` and whose clock starts at `start`.
    pub fn new(network: &Arc<MemoryNetwork>, id: u8, start: i64) -> Self {
        Self::with_config(network, id, start, fast_config())
    }

    pub fn with_config(network: &Arc<MemoryNetwork>, id: u8, start: i64, config: DeviceConfig) -> Self {
        let clock = ManualClock::new(start);
        let device = Device::in_memory_with_clock(
            DeviceId::from_bytes([id; 16]),
            network.transport(),
            config,
            Arc::new(clock.clone()),
        )
        .expect("fixture config is valid");
        Self { device, clock }
    }

    /// Put a JSON object.
    pub async fn put_json(&self, collection: &str, value: Value) -> DocKey {
        let document = Document::from_value(value).expect("fixture documents are objects");
        self.device.put(collection, document).await.expect("put")
    }

    /// Read one field of a document, if present.
    pub async fn field(&self, collection: &str, key: impl Into<DocKey>, field: &str) -> Option<Value> {
        self.device
            .get(collection, &key.into())
            .await
            .ok()
            .flatten()
            .and_then(|d| d.get(field).cloned())
    }
}

/// Run the offer/answer exchange so both devices are ready to start.
pub async fn pair_devices(offerer: &mut TestDevice, answerer: &mut TestDevice, secret: &str) -> clinic_sync::Result<()> {
    let offer = offerer.device.create_offer(secret).await?;
    let answer = answerer.device.accept_offer(secret, &offer).await?;
    offerer.device.accept_answer(&answer).await
}

/// Two devices on one network, ids 1 and 2, clocks at 1000.
pub fn device_pair() -> (Arc<MemoryNetwork>, TestDevice, TestDevice) {
    let network = MemoryNetwork::new();
    let a = TestDevice::new(&network, 1, 1_000);
    let b = TestDevice::new(&network, 2, 1_000);
    (network, a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_device_pair_syncs() {
        let (_network, mut a, mut b) = device_pair();
        a.put_json("patients", json!({"id": 1, "name": "Rao"})).await;

        pair_devices(&mut a, &mut b, "1234").await.unwrap();
        let session_a = a.device.start_sync().unwrap();
        let session_b = b.device.start_sync().unwrap();

        for _ in 0..500 {
            if b.field("patients", 1i64, "name").await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        session_a.close();
        session_a.finish().await.unwrap();
        let report = session_b.finish().await.unwrap();

        assert_eq!(b.field("patients", 1i64, "name").await, Some(json!("Rao")));
        assert_eq!(report.records_applied, 1);
    }

    #[tokio::test]
    async fn test_ids_are_deterministic() {
        let (_network, a, b) = device_pair();
        assert_eq!(a.device.device_id(), DeviceId::from_bytes([1; 16]));
        assert_ne!(a.device.device_id(), b.device.device_id());
    }
}
