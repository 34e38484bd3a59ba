//! Shared setup for end-to-end tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Once};
use std::time::Duration;

use clinic_sync::core::ManualClock;
use clinic_sync::peer::Transport;
use clinic_sync::{Device, DeviceConfig, DeviceId, Document, MemoryNetwork, MemoryStore, MemoryTransport, Store, SyncConfig};

pub type MemoryDevice = Device<MemoryStore, MemoryTransport>;

static TRACING: Once = Once::new();

/// Install a test subscriber once.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// Fast settings: cheap key derivation, frequent publishing.
pub fn test_config() -> DeviceConfig {
    DeviceConfig::default().with_sync(
        SyncConfig::default()
            .with_kdf_iterations(1_000)
            .with_publish_interval(Duration::from_millis(25)),
    )
}

/// An in-memory device with a fixed id byte and a manual clock.
pub fn memory_device(network: &Arc<MemoryNetwork>, id: u8, start: i64) -> (MemoryDevice, ManualClock) {
    memory_device_with(network, id, start, test_config())
}

pub fn memory_device_with(
    network: &Arc<MemoryNetwork>,
    id: u8,
    start: i64,
    config: DeviceConfig,
) -> (MemoryDevice, ManualClock) {
    let clock = ManualClock::new(start);
    let device = Device::in_memory_with_clock(
        DeviceId::from_bytes([id; 16]),
        network.transport(),
        config,
        Arc::new(clock.clone()),
    )
    .expect("valid config");
    (device, clock)
}

/// Run the offer/answer exchange between two devices.
pub async fn pair<S1, T1, S2, T2>(
    offerer: &mut Device<S1, T1>,
    answerer: &mut Device<S2, T2>,
    secret: &str,
) -> anyhow::Result<()>
where
    S1: Store + 'static,
    T1: Transport,
    S2: Store + 'static,
    T2: Transport,
{
    let offer = offerer.create_offer(secret).await?;
    let answer = answerer.accept_offer(secret, &offer).await?;
    offerer.accept_answer(&answer).await?;
    Ok(())
}

pub fn doc(value: serde_json::Value) -> Document {
    Document::from_value(value).expect("object")
}

/// Poll `check` until it holds, failing after five seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
