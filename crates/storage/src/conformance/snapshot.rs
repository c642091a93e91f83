use std::future::Future;

use chantier_core::{QuoteStatus, Stage};

use super::{make_quote, t0, TestResult};
use crate::{ChantierStorage, StorageError};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "snapshot_reads_see_own_writes",
        snapshot_reads_see_own_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "aborted_quote_insert_is_discarded",
        aborted_quote_insert_is_discarded(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "committed_quote_is_visible",
        committed_quote_is_visible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "update_quote_requires_existing_quote",
        update_quote_requires_existing_quote(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "aborted_delete_leaves_quote_in_place",
        aborted_delete_leaves_quote_in_place(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// Helper: initialize a client and commit.
async fn seed_client<S: ChantierStorage>(s: &S, client_id: &str) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.initialize_client(&mut snap, client_id, Stage::Negotiation, t0())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

/// A quote inserted in a snapshot is visible to list_quotes in that same
/// snapshot (the engine evaluates against the just-persisted set).
async fn snapshot_reads_see_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_client(&s, "client-1").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_quote(&mut snap, make_quote("client-1", "devis-1"))
        .await
        .map_err(|e| e.to_string())?;
    let quotes = s
        .list_quotes(&mut snap, "client-1")
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    if quotes.len() != 1 || quotes[0].devis_id != "devis-1" {
        return Err(format!(
            "expected the uncommitted quote to be visible in-snapshot, got {} quotes",
            quotes.len()
        ));
    }
    Ok(())
}

/// After abort, the inserted quote must not exist.
async fn aborted_quote_insert_is_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_client(&s, "client-1").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_quote(&mut snap, make_quote("client-1", "devis-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let quotes = s
        .list_quotes_for_client("client-1")
        .await
        .map_err(|e| e.to_string())?;
    if !quotes.is_empty() {
        return Err(format!("expected no quotes after abort, got {}", quotes.len()));
    }
    Ok(())
}

/// After commit, the quote is visible on the read path with its fields intact.
async fn committed_quote_is_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_client(&s, "client-1").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut quote = make_quote("client-1", "devis-1");
    quote.statut = QuoteStatus::Accepted;
    quote.validated_at = Some(t0());
    s.insert_quote(&mut snap, quote)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let quotes = s
        .list_quotes_for_client("client-1")
        .await
        .map_err(|e| e.to_string())?;
    if quotes.len() != 1 {
        return Err(format!("expected 1 quote, got {}", quotes.len()));
    }
    if quotes[0].statut != QuoteStatus::Accepted || quotes[0].validated_at.is_none() {
        return Err("committed quote lost statut or validated_at".to_string());
    }
    Ok(())
}

/// update_quote on a missing quote must return QuoteNotFound.
async fn update_quote_requires_existing_quote<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_client(&s, "client-1").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .update_quote(&mut snap, make_quote("client-1", "devis-missing"))
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    match result {
        Err(ref e) if matches!(e, StorageError::QuoteNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected QuoteNotFound, got: {e}")),
        Ok(()) => Err("expected QuoteNotFound error, but got Ok".to_string()),
    }
}

/// A delete inside an aborted snapshot must not take effect.
async fn aborted_delete_leaves_quote_in_place<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_client(&s, "client-1").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_quote(&mut snap, make_quote("client-1", "devis-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap2 = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.delete_quote(&mut snap2, "client-1", "devis-1")
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap2).await.map_err(|e| e.to_string())?;

    let quotes = s
        .list_quotes_for_client("client-1")
        .await
        .map_err(|e| e.to_string())?;
    if quotes.len() != 1 {
        return Err(format!(
            "expected quote to survive aborted delete, got {} quotes",
            quotes.len()
        ));
    }
    Ok(())
}
