use std::future::Future;

use time::macros::datetime;

use chantier_core::Stage;

use super::{t0, TestResult};
use crate::{ChantierStorage, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "version",
        "update_client_stage_bumps_version",
        update_client_stage_bumps_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "stale_version_returns_concurrent_conflict",
        stale_version_returns_concurrent_conflict(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "touch_bumps_last_modified_only",
        touch_bumps_last_modified_only(factory).await,
    ));

    results
}

async fn seed<S: ChantierStorage>(s: &S) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.initialize_client(&mut snap, "client-1", Stage::Negotiation, t0())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

/// Each successful stage update increments the version by exactly one.
async fn update_client_stage_bumps_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let v1 = s
        .update_client_stage(&mut snap, "client-1", 0, Stage::Accepted, t0())
        .await
        .map_err(|e| e.to_string())?;
    let v2 = s
        .update_client_stage(&mut snap, "client-1", v1, Stage::InvoiceSettled, t0())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if (v1, v2) != (1, 2) {
        return Err(format!("expected versions (1, 2), got ({v1}, {v2})"));
    }
    let rec = s.get_client("client-1").await.map_err(|e| e.to_string())?;
    if rec.version != 2 || rec.stage != Stage::InvoiceSettled {
        return Err(format!(
            "expected invoice_settled/v2, got {}/v{}",
            rec.stage, rec.version
        ));
    }
    Ok(())
}

/// An update against a stale version must return ConcurrentConflict and
/// leave the record unchanged.
async fn stale_version_returns_concurrent_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_client_stage(&mut snap, "client-1", 0, Stage::Accepted, t0())
        .await
        .map_err(|e| e.to_string())?;
    // Reuse the stale version 0.
    let result = s
        .update_client_stage(&mut snap, "client-1", 0, Stage::Refused, t0())
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    match result {
        Err(StorageError::ConcurrentConflict {
            client_id,
            expected_version,
        }) => {
            if client_id != "client-1" || expected_version != 0 {
                return Err(format!(
                    "conflict fields wrong: {client_id}/v{expected_version}"
                ));
            }
            Ok(())
        }
        Err(e) => Err(format!("expected ConcurrentConflict, got: {e}")),
        Ok(v) => Err(format!("expected ConcurrentConflict, got Ok({v})")),
    }
}

/// touch_client must bump last_modified_at without changing stage or version.
async fn touch_bumps_last_modified_only<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s).await?;

    let later = datetime!(2026-02-01 00:00:00 UTC);
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.touch_client(&mut snap, "client-1", later)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.get_client("client-1").await.map_err(|e| e.to_string())?;
    if rec.stage != Stage::Negotiation || rec.version != 0 {
        return Err("touch must not change stage or version".to_string());
    }
    if rec.last_modified_at != later {
        return Err(format!(
            "expected last_modified_at {later}, got {}",
            rec.last_modified_at
        ));
    }
    Ok(())
}
