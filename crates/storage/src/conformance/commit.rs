use std::future::Future;

use time::macros::datetime;

use chantier_core::Stage;

use super::{make_open_history, make_quote, t0, TestResult};
use crate::record::AuditRecord;
use crate::ChantierStorage;

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "commit",
        "full_transition_commits_atomically",
        full_transition_commits_atomically(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "aborted_transition_leaves_no_trace",
        aborted_transition_leaves_no_trace(factory).await,
    ));

    results
}

fn make_audit(id: &str, client_id: &str, from: Stage, to: Stage) -> AuditRecord {
    AuditRecord {
        id: id.to_string(),
        client_id: client_id.to_string(),
        date: t0(),
        kind: "stage_change".to_string(),
        description: "conformance transition".to_string(),
        author: "conformance".to_string(),
        previous_status: from,
        new_status: to,
    }
}

/// A full stage transition (quote write + history close/open + client update
/// + audit append) committed in one snapshot is visible in its entirety.
async fn full_transition_commits_atomically<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;

    // Seed: client at negotiation with an open history row.
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.initialize_client(&mut snap, "client-1", Stage::Negotiation, t0())
        .await
        .map_err(|e| e.to_string())?;
    s.open_stage_history(&mut snap, make_open_history("hist-1", "client-1", Stage::Negotiation))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    // The transition snapshot.
    let later = datetime!(2026-01-01 01:00:00 UTC);
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_quote(&mut snap, make_quote("client-1", "devis-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.close_stage_history(&mut snap, "hist-1", later, 3600)
        .await
        .map_err(|e| e.to_string())?;
    let mut new_row = make_open_history("hist-2", "client-1", Stage::Accepted);
    new_row.started_at = later;
    s.open_stage_history(&mut snap, new_row)
        .await
        .map_err(|e| e.to_string())?;
    s.update_client_stage(&mut snap, "client-1", 0, Stage::Accepted, later)
        .await
        .map_err(|e| e.to_string())?;
    s.append_audit(
        &mut snap,
        make_audit("audit-1", "client-1", Stage::Negotiation, Stage::Accepted),
    )
    .await
    .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    // Everything must be visible together.
    let client = s.get_client("client-1").await.map_err(|e| e.to_string())?;
    if client.stage != Stage::Accepted || client.version != 1 {
        return Err(format!(
            "expected accepted/v1, got {}/v{}",
            client.stage, client.version
        ));
    }
    let history = s
        .list_stage_history("client-1")
        .await
        .map_err(|e| e.to_string())?;
    if history.len() != 2 {
        return Err(format!("expected 2 history rows, got {}", history.len()));
    }
    if history[0].ended_at.is_none() || history[0].duration_seconds != Some(3600) {
        return Err("first history row should be closed with duration 3600".to_string());
    }
    if history[1].ended_at.is_some() {
        return Err("second history row should be open".to_string());
    }
    let audit = s.list_audit("client-1").await.map_err(|e| e.to_string())?;
    if audit.len() != 1 {
        return Err(format!("expected 1 audit row, got {}", audit.len()));
    }
    Ok(())
}

/// Aborting mid-transition leaves the seeded state completely untouched.
async fn aborted_transition_leaves_no_trace<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.open_stage_history(&mut snap, make_open_history("hist-1", "client-1", Stage::Negotiation))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let later = datetime!(2026-01-01 01:00:00 UTC);
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_quote(&mut snap, make_quote("client-1", "devis-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.close_stage_history(&mut snap, "hist-1", later, 3600)
        .await
        .map_err(|e| e.to_string())?;
    s.update_client_stage(&mut snap, "client-1", 0, Stage::Accepted, later)
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let client = s.get_client("client-1").await.map_err(|e| e.to_string())?;
    if client.stage != Stage::Negotiation || client.version != 0 {
        return Err("client must be untouched after abort".to_string());
    }
    let history = s
        .list_stage_history("client-1")
        .await
        .map_err(|e| e.to_string())?;
    if history.len() != 1 || history[0].ended_at.is_some() {
        return Err("history row must still be open after abort".to_string());
    }
    let quotes = s
        .list_quotes_for_client("client-1")
        .await
        .map_err(|e| e.to_string())?;
    if !quotes.is_empty() {
        return Err("quote insert must be rolled back on abort".to_string());
    }
    Ok(())
}
