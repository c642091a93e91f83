use std::future::Future;

use chantier_core::Stage;

use super::{t0, TestResult};
use crate::{ChantierStorage, StorageError};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "init",
        "initialize_creates_client_at_version_0",
        initialize_creates_client_at_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "initialize_sets_stage_and_leaves_no_open_history",
        initialize_sets_stage_and_leaves_no_open_history(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "double_initialize_returns_already_initialized",
        double_initialize_returns_already_initialized(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "double_initialize_across_snapshots",
        double_initialize_across_snapshots(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "initialize_not_visible_after_abort",
        initialize_not_visible_after_abort(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "clients_are_independent",
        clients_are_independent(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// After initialize + commit, the client version must be 0.
async fn initialize_creates_client_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.initialize_client(&mut snap, "client-1", Stage::Qualified, t0())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.get_client("client-1").await.map_err(|e| e.to_string())?;
    if rec.version != 0 {
        return Err(format!("expected version 0, got {}", rec.version));
    }
    Ok(())
}

/// Initialization sets the requested stage and opens no stage-history row.
async fn initialize_sets_stage_and_leaves_no_open_history<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.initialize_client(&mut snap, "client-1", Stage::Negotiation, t0())
        .await
        .map_err(|e| e.to_string())?;
    let open = s
        .get_open_stage_history(&mut snap, "client-1")
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if open.is_some() {
        return Err("fresh client must have no open stage history row".to_string());
    }
    let rec = s.get_client("client-1").await.map_err(|e| e.to_string())?;
    if rec.stage != Stage::Negotiation {
        return Err(format!("expected stage negotiation, got {}", rec.stage));
    }
    Ok(())
}

/// Initializing the same client twice in the same snapshot must return
/// AlreadyInitialized.
async fn double_initialize_returns_already_initialized<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.initialize_client(&mut snap, "client-1", Stage::Qualified, t0())
        .await
        .map_err(|e| e.to_string())?;

    let result = s
        .initialize_client(&mut snap, "client-1", Stage::Qualified, t0())
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    match result {
        Err(StorageError::AlreadyInitialized { client_id }) if client_id == "client-1" => Ok(()),
        Err(e) => Err(format!("expected AlreadyInitialized, got: {e}")),
        Ok(()) => Err("expected AlreadyInitialized error, but got Ok".to_string()),
    }
}

/// Initializing the same client in a second snapshot after committing the
/// first must return AlreadyInitialized.
async fn double_initialize_across_snapshots<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.initialize_client(&mut snap, "client-1", Stage::Qualified, t0())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap2 = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .initialize_client(&mut snap2, "client-1", Stage::Qualified, t0())
        .await;
    s.abort_snapshot(snap2).await.map_err(|e| e.to_string())?;

    match result {
        Err(ref e) if matches!(e, StorageError::AlreadyInitialized { .. }) => Ok(()),
        Err(e) => Err(format!("expected AlreadyInitialized, got: {e}")),
        Ok(()) => Err("expected AlreadyInitialized error, but got Ok".to_string()),
    }
}

/// After initialize + abort, the client must NOT exist.
async fn initialize_not_visible_after_abort<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.initialize_client(&mut snap, "client-1", Stage::Qualified, t0())
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    match s.get_client("client-1").await {
        Err(ref e) if matches!(e, StorageError::ClientNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected ClientNotFound, got: {e}")),
        Ok(_) => Err("client should not be visible after abort".to_string()),
    }
}

/// Two clients initialize independently, each at its own stage.
async fn clients_are_independent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.initialize_client(&mut snap, "client-1", Stage::Qualified, t0())
        .await
        .map_err(|e| e.to_string())?;
    s.initialize_client(&mut snap, "client-2", Stage::Design, t0())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec1 = s.get_client("client-1").await.map_err(|e| e.to_string())?;
    let rec2 = s.get_client("client-2").await.map_err(|e| e.to_string())?;
    if rec1.stage != Stage::Qualified || rec2.stage != Stage::Design {
        return Err("stages do not match expected values".to_string());
    }
    Ok(())
}
