use std::future::Future;

use time::macros::datetime;

use chantier_core::Stage;

use super::{make_open_history, t0, TestResult};
use crate::{ChantierStorage, StorageError};

pub(super) async fn run_history_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "history",
        "second_open_row_is_rejected",
        second_open_row_is_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "history",
        "close_then_open_succeeds",
        close_then_open_succeeds(factory).await,
    ));
    results.push(TestResult::from_result(
        "history",
        "closing_a_closed_row_is_rejected",
        closing_a_closed_row_is_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "history",
        "open_row_lookup_is_per_client",
        open_row_lookup_is_per_client(factory).await,
    ));

    results
}

async fn seed<S: ChantierStorage>(s: &S, client_id: &str) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.initialize_client(&mut snap, client_id, Stage::Negotiation, t0())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

/// Opening a second open row for the same client must be rejected.
async fn second_open_row_is_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "client-1").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.open_stage_history(&mut snap, make_open_history("hist-1", "client-1", Stage::Negotiation))
        .await
        .map_err(|e| e.to_string())?;
    let result = s
        .open_stage_history(&mut snap, make_open_history("hist-2", "client-1", Stage::Accepted))
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    match result {
        Err(ref e) if matches!(e, StorageError::OpenHistoryViolation { .. }) => Ok(()),
        Err(e) => Err(format!("expected OpenHistoryViolation, got: {e}")),
        Ok(()) => Err("expected OpenHistoryViolation, but got Ok".to_string()),
    }
}

/// Close + open in the same snapshot is the normal transition pattern and
/// must leave exactly one open row with the computed duration on the old one.
async fn close_then_open_succeeds<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "client-1").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.open_stage_history(&mut snap, make_open_history("hist-1", "client-1", Stage::Negotiation))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let later = datetime!(2026-01-01 02:30:00 UTC);
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.close_stage_history(&mut snap, "hist-1", later, 9000)
        .await
        .map_err(|e| e.to_string())?;
    let mut row = make_open_history("hist-2", "client-1", Stage::Accepted);
    row.started_at = later;
    s.open_stage_history(&mut snap, row)
        .await
        .map_err(|e| e.to_string())?;
    let open = s
        .get_open_stage_history(&mut snap, "client-1")
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let open = open.ok_or("expected an open row after close+open")?;
    if open.id != "hist-2" || open.stage_name != Stage::Accepted {
        return Err(format!("wrong open row: {} ({})", open.id, open.stage_name));
    }
    let rows = s
        .list_stage_history("client-1")
        .await
        .map_err(|e| e.to_string())?;
    let closed = rows.iter().find(|r| r.id == "hist-1").ok_or("hist-1 missing")?;
    if closed.duration_seconds != Some(9000) {
        return Err(format!(
            "expected duration 9000, got {:?}",
            closed.duration_seconds
        ));
    }
    Ok(())
}

/// Closing an already-closed row must be rejected (the ledger is append-only
/// apart from the single close).
async fn closing_a_closed_row_is_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "client-1").await?;

    let later = datetime!(2026-01-01 01:00:00 UTC);
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.open_stage_history(&mut snap, make_open_history("hist-1", "client-1", Stage::Negotiation))
        .await
        .map_err(|e| e.to_string())?;
    s.close_stage_history(&mut snap, "hist-1", later, 3600)
        .await
        .map_err(|e| e.to_string())?;
    let result = s.close_stage_history(&mut snap, "hist-1", later, 3600).await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    match result {
        Err(ref e) if matches!(e, StorageError::OpenHistoryViolation { .. }) => Ok(()),
        Err(e) => Err(format!("expected OpenHistoryViolation, got: {e}")),
        Ok(()) => Err("expected OpenHistoryViolation, but got Ok".to_string()),
    }
}

/// The open-row invariant is scoped per client: two clients may each have
/// their own open row.
async fn open_row_lookup_is_per_client<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "client-1").await?;
    seed(&s, "client-2").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.open_stage_history(&mut snap, make_open_history("hist-1", "client-1", Stage::Negotiation))
        .await
        .map_err(|e| e.to_string())?;
    s.open_stage_history(&mut snap, make_open_history("hist-2", "client-2", Stage::Design))
        .await
        .map_err(|e| e.to_string())?;
    let open1 = s
        .get_open_stage_history(&mut snap, "client-1")
        .await
        .map_err(|e| e.to_string())?;
    let open2 = s
        .get_open_stage_history(&mut snap, "client-2")
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    match (open1, open2) {
        (Some(a), Some(b)) if a.id == "hist-1" && b.id == "hist-2" => Ok(()),
        other => Err(format!("wrong per-client open rows: {other:?}")),
    }
}
