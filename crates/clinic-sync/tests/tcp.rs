//! End-to-end sync over TCP between SQLite-backed devices.

mod common;

use std::sync::Arc;

use clinic_sync::core::ManualClock;
use clinic_sync::{ClinicError, Device, DocKey, EngineState, SqliteStore, TcpTransport, Timestamp};
use clinic_sync::peer::SyncError;
use serde_json::json;
use tempfile::TempDir;

use common::{doc, eventually, init_tracing, pair, test_config};

type TcpDevice = Device<SqliteStore, TcpTransport>;

fn sqlite_device(dir: &TempDir, name: &str, start: i64) -> anyhow::Result<(TcpDevice, ManualClock)> {
    let clock = ManualClock::new(start);
    let device = Device::open_with_clock(
        dir.path().join(name),
        TcpTransport::localhost(),
        test_config(),
        Arc::new(clock.clone()),
    )?;
    Ok((device, clock))
}

#[tokio::test]
async fn test_tcp_sync_between_sqlite_devices() -> anyhow::Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let (mut front_desk, clock_a) = sqlite_device(&dir, "front-desk.db", 1_000)?;
    let (mut pharmacy, clock_b) = sqlite_device(&dir, "pharmacy.db", 1_000)?;

    let patient = front_desk.insert("patients", doc(json!({"name": "Rao"}))).await?;
    pharmacy
        .put("pharmacyItems", doc(json!({"id": 7, "name": "Paracetamol", "stock": 40})))
        .await?;

    pair(&mut front_desk, &mut pharmacy, "clinic-pair-code").await?;
    let session_a = front_desk.start_sync()?;
    let session_b = pharmacy.start_sync()?;

    eventually("initial exchange", || async {
        front_desk.converged_with(&pharmacy).await.map(|r| r.is_converged()).unwrap_or(false)
    })
    .await;
    assert_eq!(front_desk.state(), EngineState::Connected);

    // Live edits on both sides during the session.
    clock_a.set(5_000);
    front_desk
        .update("patients", &patient, doc(json!({"phone": "555-0101"})))
        .await?;
    clock_b.set(6_000);
    pharmacy.delete("pharmacyItems", &DocKey::Int(7)).await?;

    eventually("live edits", || async {
        let phone = pharmacy
            .get("patients", &patient)
            .await
            .ok()
            .flatten()
            .and_then(|d| d.get("phone").cloned());
        let item = front_desk.get("pharmacyItems", &DocKey::Int(7)).await.ok().flatten();
        phone == Some(json!("555-0101")) && item.is_none()
    })
    .await;

    session_a.close();
    let report_a = session_a.finish().await?;
    let report_b = session_b.finish().await?;

    assert_eq!(report_a.records_applied, 2);
    assert_eq!(report_b.records_applied, 2);
    assert_eq!(report_b.last_applied, Timestamp(5_000));
    assert!(front_desk.converged_with(&pharmacy).await?.is_converged());
    assert_eq!(front_desk.state(), EngineState::Idle);
    assert_eq!(pharmacy.state(), EngineState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_tcp_syncs_log_larger_than_one_frame() -> anyhow::Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let (mut a, _) = sqlite_device(&dir, "records.db", 1_000)?;
    let (mut b, _) = sqlite_device(&dir, "ward.db", 1_000)?;

    // Well over 4 MiB once sealed.
    let note = "n".repeat(8 * 1024);
    for i in 0..200 {
        a.put("patients", doc(json!({"id": i, "note": note}))).await?;
    }

    pair(&mut a, &mut b, "1234").await?;
    let session_a = a.start_sync()?;
    let session_b = b.start_sync()?;

    eventually("every patient to arrive", || async {
        b.list("patients").await.map(|l| l.len() == 200).unwrap_or(false)
    })
    .await;
    assert_eq!(a.state(), EngineState::Connected);

    session_a.close();
    let report_a = session_a.finish().await?;
    let report_b = session_b.finish().await?;

    assert_eq!(report_a.records_sent, 200);
    assert_eq!(report_a.records_skipped, 0);
    assert_eq!(report_b.records_applied, 200);
    assert!(a.converged_with(&b).await?.is_converged());
    Ok(())
}

#[tokio::test]
async fn test_tcp_rejects_foreign_answer() -> anyhow::Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let (mut a, _) = sqlite_device(&dir, "a.db", 1_000)?;
    let (mut b, _) = sqlite_device(&dir, "b.db", 1_000)?;
    let (mut c, _) = sqlite_device(&dir, "c.db", 1_000)?;

    let _offer_a = a.create_offer("1234").await?;
    let offer_c = c.create_offer("1234").await?;
    let answer_for_c = b.accept_offer("1234", &offer_c).await?;

    let result = a.accept_answer(&answer_for_c).await;
    assert!(matches!(result, Err(ClinicError::Sync(SyncError::Setup(_)))));
    assert_eq!(a.state(), EngineState::Negotiating);
    Ok(())
}
