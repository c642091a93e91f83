//! Mutation orchestration.
//!
//! Drives quote and settlement mutations through a `ChantierStorage`
//! backend using snapshot (transaction) semantics. Each request follows the
//! same state machine:
//!
//! 1. Lock the client row (`get_client_for_update`)
//! 2. Apply the caller's quote mutation
//! 3. Re-read the full, just-persisted quote set for the client
//! 4. Derive trigger events from the before/after image and run the
//!    decision table
//! 5. If the stage changed: close the open stage-history row, open a new
//!    one, OCC-update the client's stage, append one audit row
//! 6. Always bump `last_modified_at`
//!
//! All writes happen in one snapshot -- either everything commits or the
//! snapshot is aborted and nothing happened. A request whose events derive
//! both a status change and a settlement change applies them sequentially,
//! each rule seeing the stage produced by the previous decision; the last
//! matching rule wins.

use rust_decimal::Decimal;
use time::OffsetDateTime;

use chantier_core::{QuoteStatus, Stage};
use chantier_storage::{
    AuditRecord, ChantierStorage, ClientRecord, QuoteRecord, StageHistoryRecord,
};

use crate::decide::{decide, Decision, TriggerEvent};
use crate::error::ApplyError;

/// Request-scoped context. `now` is captured once per request and reused
/// for every timestamp written (validated_at, ended_at, started_at, audit
/// date, last_modified_at), so a single consistent instant is recorded.
#[derive(Debug, Clone)]
pub struct MutationContext {
    pub author: String,
    pub now: OffsetDateTime,
}

/// Fields for creating a quote. `statut` defaults to pending;
/// `facture_reglee` is always forced false at creation.
#[derive(Debug, Clone)]
pub struct NewQuote {
    pub title: String,
    pub montant: Decimal,
    pub description: Option<String>,
    pub statut: Option<QuoteStatus>,
    pub notes: Option<String>,
    pub fichier: Option<String>,
    pub created_by: Option<String>,
}

/// Partial-field patch for an existing quote. `None` leaves the field
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct QuotePatch {
    pub title: Option<String>,
    pub montant: Option<Decimal>,
    pub description: Option<String>,
    pub statut: Option<QuoteStatus>,
    pub facture_reglee: Option<bool>,
    pub notes: Option<String>,
    pub fichier: Option<String>,
}

/// What a quote mutation returns to the caller.
#[derive(Debug, Clone)]
pub struct QuoteMutation {
    pub quote: QuoteRecord,
    pub stage_progressed: bool,
    pub new_stage: Option<Stage>,
}

/// Create a client record (the lead-conversion hook). The client starts at
/// `stage` with no open stage-history row; the first engine-driven
/// transition opens one.
pub async fn create_client<S: ChantierStorage>(
    storage: &S,
    ctx: &MutationContext,
    client_id: &str,
    stage: Stage,
) -> Result<ClientRecord, ApplyError> {
    let mut snap = storage.begin_snapshot().await?;
    let result = storage
        .initialize_client(&mut snap, client_id, stage, ctx.now)
        .await
        .map_err(ApplyError::from_storage);
    match result {
        Ok(()) => {
            storage.commit_snapshot(snap).await?;
            Ok(ClientRecord {
                client_id: client_id.to_string(),
                stage,
                version: 0,
                last_modified_at: ctx.now,
            })
        }
        Err(e) => {
            let _ = storage.abort_snapshot(snap).await;
            Err(e)
        }
    }
}

/// Create a quote for a client.
///
/// Runs the acceptance-progression rule when the quote is created already
/// accepted; other rules only apply on updates.
pub async fn create_quote<S: ChantierStorage>(
    storage: &S,
    ctx: &MutationContext,
    client_id: &str,
    new: NewQuote,
) -> Result<QuoteMutation, ApplyError> {
    let mut snap = storage.begin_snapshot().await?;
    match create_quote_in(storage, &mut snap, ctx, client_id, new).await {
        Ok(out) => {
            storage.commit_snapshot(snap).await?;
            Ok(out)
        }
        Err(e) => {
            let _ = storage.abort_snapshot(snap).await;
            Err(e)
        }
    }
}

/// Apply a partial-field patch to a quote, then run the full decision
/// table against the re-read quote set.
pub async fn patch_quote<S: ChantierStorage>(
    storage: &S,
    ctx: &MutationContext,
    client_id: &str,
    devis_id: &str,
    patch: QuotePatch,
) -> Result<QuoteMutation, ApplyError> {
    let mut snap = storage.begin_snapshot().await?;
    match patch_quote_in(storage, &mut snap, ctx, client_id, devis_id, patch).await {
        Ok(out) => {
            storage.commit_snapshot(snap).await?;
            Ok(out)
        }
        Err(e) => {
            let _ = storage.abort_snapshot(snap).await;
            Err(e)
        }
    }
}

/// Hard-delete a quote. Deletion is treated as data correction, not a
/// business event: no stage recomputation, only `last_modified_at` moves.
pub async fn delete_quote<S: ChantierStorage>(
    storage: &S,
    ctx: &MutationContext,
    client_id: &str,
    devis_id: &str,
) -> Result<(), ApplyError> {
    let mut snap = storage.begin_snapshot().await?;
    let result = async {
        storage
            .get_client_for_update(&mut snap, client_id)
            .await
            .map_err(ApplyError::from_storage)?;
        storage
            .delete_quote(&mut snap, client_id, devis_id)
            .await
            .map_err(ApplyError::from_storage)?;
        storage
            .touch_client(&mut snap, client_id, ctx.now)
            .await
            .map_err(ApplyError::from_storage)
    }
    .await;
    match result {
        Ok(()) => {
            storage.commit_snapshot(snap).await?;
            Ok(())
        }
        Err(e) => {
            let _ = storage.abort_snapshot(snap).await;
            Err(e)
        }
    }
}

// ── Inner steps (run inside one snapshot) ────────────────────────────────────

async fn create_quote_in<S: ChantierStorage>(
    storage: &S,
    snap: &mut S::Snapshot,
    ctx: &MutationContext,
    client_id: &str,
    new: NewQuote,
) -> Result<QuoteMutation, ApplyError> {
    let client = storage
        .get_client_for_update(snap, client_id)
        .await
        .map_err(ApplyError::from_storage)?;

    let statut = new.statut.unwrap_or_default();
    let quote = QuoteRecord {
        devis_id: fresh_id("devis"),
        client_id: client_id.to_string(),
        title: new.title,
        montant: new.montant,
        description: new.description,
        statut,
        facture_reglee: false,
        notes: new.notes,
        fichier: new.fichier,
        created_by: new.created_by,
        date_creation: ctx.now,
        validated_at: statut.is_validated().then_some(ctx.now),
    };
    storage
        .insert_quote(snap, quote.clone())
        .await
        .map_err(ApplyError::from_storage)?;

    let quotes = storage
        .list_quotes(snap, client_id)
        .await
        .map_err(ApplyError::from_storage)?;

    // Only acceptance at creation triggers a stage evaluation.
    let events = if statut == QuoteStatus::Accepted {
        vec![TriggerEvent::QuoteAccepted]
    } else {
        Vec::new()
    };

    let (stage_progressed, new_stage) =
        run_transition(storage, snap, ctx, &client, &quotes, &events, &quote.title).await?;
    if !stage_progressed {
        storage
            .touch_client(snap, client_id, ctx.now)
            .await
            .map_err(ApplyError::from_storage)?;
    }

    Ok(QuoteMutation {
        quote,
        stage_progressed,
        new_stage,
    })
}

async fn patch_quote_in<S: ChantierStorage>(
    storage: &S,
    snap: &mut S::Snapshot,
    ctx: &MutationContext,
    client_id: &str,
    devis_id: &str,
    patch: QuotePatch,
) -> Result<QuoteMutation, ApplyError> {
    let client = storage
        .get_client_for_update(snap, client_id)
        .await
        .map_err(ApplyError::from_storage)?;
    let before = storage
        .get_quote(snap, client_id, devis_id)
        .await
        .map_err(ApplyError::from_storage)?;

    let after = patched_quote(&before, &patch, ctx.now)?;
    storage
        .update_quote(snap, after.clone())
        .await
        .map_err(ApplyError::from_storage)?;

    let quotes = storage
        .list_quotes(snap, client_id)
        .await
        .map_err(ApplyError::from_storage)?;

    let events = derive_events(&before, &patch, &after);
    let (stage_progressed, new_stage) =
        run_transition(storage, snap, ctx, &client, &quotes, &events, &after.title).await?;
    if !stage_progressed {
        storage
            .touch_client(snap, client_id, ctx.now)
            .await
            .map_err(ApplyError::from_storage)?;
    }

    Ok(QuoteMutation {
        quote: after,
        stage_progressed,
        new_stage,
    })
}

/// Apply the patch's ledger side effects and return the resulting record.
///
/// - `validated_at` is stamped on the first transition into accepte/refuse
///   and never overwritten afterwards.
/// - Reverting statut to pending forces `facture_reglee = false`; a settled
///   invoice cannot survive its quote becoming pending again.
/// - Explicitly settling a quote that is not accepted is a validation error.
fn patched_quote(
    before: &QuoteRecord,
    patch: &QuotePatch,
    now: OffsetDateTime,
) -> Result<QuoteRecord, ApplyError> {
    let mut after = before.clone();

    if let Some(title) = &patch.title {
        after.title = title.clone();
    }
    if let Some(montant) = patch.montant {
        after.montant = montant;
    }
    if let Some(description) = &patch.description {
        after.description = Some(description.clone());
    }
    if let Some(notes) = &patch.notes {
        after.notes = Some(notes.clone());
    }
    if let Some(fichier) = &patch.fichier {
        after.fichier = Some(fichier.clone());
    }
    if let Some(statut) = patch.statut {
        after.statut = statut;
        if statut.is_validated() && before.validated_at.is_none() {
            after.validated_at = Some(now);
        }
    }
    if let Some(settled) = patch.facture_reglee {
        if settled && after.statut != QuoteStatus::Accepted {
            return Err(ApplyError::Validation(
                "facture_reglee requires an accepted quote".to_string(),
            ));
        }
        after.facture_reglee = settled;
    }
    // Forced clear on revert, regardless of what the patch said.
    if after.statut != QuoteStatus::Accepted && patch.facture_reglee.is_none() {
        after.facture_reglee = false;
    }

    Ok(after)
}

/// Derive trigger events from the explicit patch fields, status first,
/// settlement second. Only fields the caller actually patched produce
/// events; a `facture_reglee` clear forced by a status revert is covered
/// by revert rule A, not by a settlement event.
fn derive_events(before: &QuoteRecord, patch: &QuotePatch, after: &QuoteRecord) -> Vec<TriggerEvent> {
    let mut events = Vec::new();

    if patch.statut.is_some() && after.statut != before.statut {
        match after.statut {
            QuoteStatus::Accepted => events.push(TriggerEvent::QuoteAccepted),
            QuoteStatus::Refused => events.push(TriggerEvent::QuoteRefused),
            QuoteStatus::Pending => events.push(TriggerEvent::QuoteReverted {
                was_accepted: before.statut == QuoteStatus::Accepted,
                was_settled: before.facture_reglee,
            }),
        }
    }

    if let Some(settled) = patch.facture_reglee {
        if settled != before.facture_reglee {
            events.push(if settled {
                TriggerEvent::SettlementSet
            } else {
                TriggerEvent::SettlementCleared
            });
        }
    }

    events
}

/// Fold the decision table over the derived events and, when the stage
/// changed, perform the full bookkeeping: close the open history row, open
/// a new one, OCC-update the client's stage, append one audit row.
async fn run_transition<S: ChantierStorage>(
    storage: &S,
    snap: &mut S::Snapshot,
    ctx: &MutationContext,
    client: &ClientRecord,
    quotes: &[QuoteRecord],
    events: &[TriggerEvent],
    quote_title: &str,
) -> Result<(bool, Option<Stage>), ApplyError> {
    let mut stage = client.stage;
    let mut fired: Option<Decision> = None;
    for event in events {
        if let Some(decision) = decide(stage, quotes, event) {
            stage = decision.target;
            fired = Some(decision);
        }
    }

    let Some(decision) = fired else {
        return Ok((false, None));
    };
    if stage == client.stage {
        return Ok((false, None));
    }

    if let Some(open) = storage
        .get_open_stage_history(snap, &client.client_id)
        .await
        .map_err(ApplyError::from_storage)?
    {
        let duration = (ctx.now - open.started_at).whole_seconds();
        storage
            .close_stage_history(snap, &open.id, ctx.now, duration)
            .await
            .map_err(ApplyError::from_storage)?;
    }
    storage
        .open_stage_history(
            snap,
            StageHistoryRecord {
                id: fresh_id("hist"),
                client_id: client.client_id.clone(),
                stage_name: stage,
                started_at: ctx.now,
                ended_at: None,
                duration_seconds: None,
                changed_by: ctx.author.clone(),
            },
        )
        .await
        .map_err(ApplyError::from_storage)?;
    storage
        .update_client_stage(snap, &client.client_id, client.version, stage, ctx.now)
        .await
        .map_err(ApplyError::from_storage)?;
    storage
        .append_audit(
            snap,
            AuditRecord {
                id: fresh_id("audit"),
                client_id: client.client_id.clone(),
                date: ctx.now,
                kind: "stage_change".to_string(),
                description: decision.rule.describe(quote_title),
                author: ctx.author.clone(),
                previous_status: client.stage,
                new_status: stage,
            },
        )
        .await
        .map_err(ApplyError::from_storage)?;

    tracing::info!(
        client_id = %client.client_id,
        from = %client.stage,
        to = %stage,
        rule = ?decision.rule,
        "stage transition"
    );

    Ok((true, Some(stage)))
}

fn fresh_id(prefix: &str) -> String {
    format!("{prefix}-{:016x}", rand::random::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chantier_storage::MemoryStorage;
    use time::macros::datetime;

    fn ctx() -> MutationContext {
        MutationContext {
            author: "tests".to_string(),
            now: datetime!(2026-03-01 09:00:00 UTC),
        }
    }

    fn later_ctx() -> MutationContext {
        MutationContext {
            author: "tests".to_string(),
            now: datetime!(2026-03-01 10:00:00 UTC),
        }
    }

    fn new_quote(title: &str) -> NewQuote {
        NewQuote {
            title: title.to_string(),
            montant: Decimal::new(1_250_000, 2),
            description: None,
            statut: None,
            notes: None,
            fichier: None,
            created_by: Some("tests".to_string()),
        }
    }

    async fn seed(stage: Stage) -> MemoryStorage {
        let storage = MemoryStorage::new();
        create_client(&storage, &ctx(), "client-1", stage)
            .await
            .unwrap();
        storage
    }

    async fn open_history_count(storage: &MemoryStorage) -> usize {
        storage
            .list_stage_history("client-1")
            .await
            .unwrap()
            .iter()
            .filter(|h| h.ended_at.is_none())
            .count()
    }

    // Scenario: negotiation + accept one quote -> accepted, one open history
    // row, one audit row.
    #[tokio::test]
    async fn accepting_a_quote_progresses_negotiation_to_accepted() {
        let storage = seed(Stage::Negotiation).await;
        let created = create_quote(&storage, &ctx(), "client-1", new_quote("Pergola"))
            .await
            .unwrap();
        assert!(!created.stage_progressed);

        let patched = patch_quote(
            &storage,
            &later_ctx(),
            "client-1",
            &created.quote.devis_id,
            QuotePatch {
                statut: Some(QuoteStatus::Accepted),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(patched.stage_progressed);
        assert_eq!(patched.new_stage, Some(Stage::Accepted));
        assert_eq!(patched.quote.validated_at, Some(later_ctx().now));

        let client = storage.get_client("client-1").await.unwrap();
        assert_eq!(client.stage, Stage::Accepted);
        assert_eq!(open_history_count(&storage).await, 1);

        let audit = storage.list_audit("client-1").await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].previous_status, Stage::Negotiation);
        assert_eq!(audit[0].new_status, Stage::Accepted);
        assert!(audit[0].description.contains("Pergola"));
    }

    // Scenario: two quotes, one already refused; refusing the second moves
    // the project to refused.
    #[tokio::test]
    async fn refusing_the_last_open_quote_moves_to_refused() {
        let storage = seed(Stage::Negotiation).await;
        let q1 = create_quote(&storage, &ctx(), "client-1", new_quote("Terrasse"))
            .await
            .unwrap();
        let q2 = create_quote(&storage, &ctx(), "client-1", new_quote("Cloture"))
            .await
            .unwrap();

        patch_quote(
            &storage,
            &ctx(),
            "client-1",
            &q1.quote.devis_id,
            QuotePatch {
                statut: Some(QuoteStatus::Refused),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let out = patch_quote(
            &storage,
            &later_ctx(),
            "client-1",
            &q2.quote.devis_id,
            QuotePatch {
                statut: Some(QuoteStatus::Refused),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(out.stage_progressed);
        assert_eq!(out.new_stage, Some(Stage::Refused));
        let client = storage.get_client("client-1").await.unwrap();
        assert_eq!(client.stage, Stage::Refused);
    }

    // Scenario: invoice_settled + clear the settlement flag -> back to
    // accepted.
    #[tokio::test]
    async fn clearing_settlement_reverts_invoice_settled_to_accepted() {
        let storage = seed(Stage::Accepted).await;
        let q = create_quote(&storage, &ctx(), "client-1", new_quote("Piscine"))
            .await
            .unwrap();
        patch_quote(
            &storage,
            &ctx(),
            "client-1",
            &q.quote.devis_id,
            QuotePatch {
                statut: Some(QuoteStatus::Accepted),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let settled = patch_quote(
            &storage,
            &ctx(),
            "client-1",
            &q.quote.devis_id,
            QuotePatch {
                facture_reglee: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(settled.new_stage, Some(Stage::InvoiceSettled));

        let cleared = patch_quote(
            &storage,
            &later_ctx(),
            "client-1",
            &q.quote.devis_id,
            QuotePatch {
                facture_reglee: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(cleared.stage_progressed);
        assert_eq!(cleared.new_stage, Some(Stage::Accepted));
        assert_eq!(open_history_count(&storage).await, 1);
    }

    // Scenario: single accepted quote at stage accepted; settling it
    // promotes to invoice_settled.
    #[tokio::test]
    async fn settling_all_accepted_quotes_promotes_to_invoice_settled() {
        let storage = seed(Stage::Negotiation).await;
        let q = create_quote(
            &storage,
            &ctx(),
            "client-1",
            NewQuote {
                statut: Some(QuoteStatus::Accepted),
                ..new_quote("Garage")
            },
        )
        .await
        .unwrap();
        // Accepted at creation runs the acceptance rule.
        assert_eq!(q.new_stage, Some(Stage::Accepted));
        assert_eq!(q.quote.validated_at, Some(ctx().now));

        let out = patch_quote(
            &storage,
            &later_ctx(),
            "client-1",
            &q.quote.devis_id,
            QuotePatch {
                facture_reglee: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(out.new_stage, Some(Stage::InvoiceSettled));

        let history = storage.list_stage_history("client-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].stage_name, Stage::Accepted);
        assert_eq!(history[0].duration_seconds, Some(3600));
        assert_eq!(history[1].stage_name, Stage::InvoiceSettled);
        assert!(history[1].ended_at.is_none());
    }

    // Scenario: accepted stage, revert the only accepted quote to pending
    // -> negotiation.
    #[tokio::test]
    async fn reverting_the_only_accepted_quote_rolls_back_to_negotiation() {
        let storage = seed(Stage::Negotiation).await;
        let q = create_quote(
            &storage,
            &ctx(),
            "client-1",
            NewQuote {
                statut: Some(QuoteStatus::Accepted),
                ..new_quote("Abri jardin")
            },
        )
        .await
        .unwrap();
        assert_eq!(q.new_stage, Some(Stage::Accepted));

        let out = patch_quote(
            &storage,
            &later_ctx(),
            "client-1",
            &q.quote.devis_id,
            QuotePatch {
                statut: Some(QuoteStatus::Pending),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(out.new_stage, Some(Stage::Negotiation));
        assert!(!out.quote.facture_reglee);
        // validated_at survives the revert.
        assert_eq!(out.quote.validated_at, Some(ctx().now));
    }

    // Scenario: LOCKED stage is immune to quote-driven regression.
    #[tokio::test]
    async fn locked_stage_survives_reverting_every_quote() {
        let storage = seed(Stage::SiteWork).await;
        let q = create_quote(
            &storage,
            &ctx(),
            "client-1",
            NewQuote {
                statut: Some(QuoteStatus::Accepted),
                ..new_quote("Gros oeuvre")
            },
        )
        .await
        .unwrap();
        // site_work is not an early stage, so acceptance changes nothing.
        assert!(!q.stage_progressed);

        let out = patch_quote(
            &storage,
            &later_ctx(),
            "client-1",
            &q.quote.devis_id,
            QuotePatch {
                statut: Some(QuoteStatus::Pending),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(!out.stage_progressed);
        let client = storage.get_client("client-1").await.unwrap();
        assert_eq!(client.stage, Stage::SiteWork);
        // No transition, no history rows, but last_modified_at moved.
        assert_eq!(storage.list_stage_history("client-1").await.unwrap().len(), 0);
        assert_eq!(client.last_modified_at, later_ctx().now);
    }

    // A patch that both reverts the settled quote and clears the flag in
    // one call: events apply sequentially, last match wins.
    #[tokio::test]
    async fn combined_status_and_settlement_patch_applies_events_in_order() {
        let storage = seed(Stage::Negotiation).await;
        let q = create_quote(
            &storage,
            &ctx(),
            "client-1",
            NewQuote {
                statut: Some(QuoteStatus::Accepted),
                ..new_quote("Extension")
            },
        )
        .await
        .unwrap();
        patch_quote(
            &storage,
            &ctx(),
            "client-1",
            &q.quote.devis_id,
            QuotePatch {
                facture_reglee: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Now at invoice_settled. Revert status and clear the flag together:
        // the revert event (rule A) fires first and moves the stage to
        // negotiation; the settlement event then finds no accepted quotes
        // and does not fire.
        let out = patch_quote(
            &storage,
            &later_ctx(),
            "client-1",
            &q.quote.devis_id,
            QuotePatch {
                statut: Some(QuoteStatus::Pending),
                facture_reglee: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(out.new_stage, Some(Stage::Negotiation));
        let audit = storage.list_audit("client-1").await.unwrap();
        // One audit row per stage change across the whole test.
        assert_eq!(audit.len(), 3);
    }

    #[tokio::test]
    async fn settling_a_pending_quote_is_a_validation_error() {
        let storage = seed(Stage::Negotiation).await;
        let q = create_quote(&storage, &ctx(), "client-1", new_quote("Veranda"))
            .await
            .unwrap();
        let err = patch_quote(
            &storage,
            &ctx(),
            "client-1",
            &q.quote.devis_id,
            QuotePatch {
                facture_reglee: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApplyError::Validation(_)));
        // The failed patch rolled back entirely.
        let quotes = storage.list_quotes_for_client("client-1").await.unwrap();
        assert!(!quotes[0].facture_reglee);
    }

    #[tokio::test]
    async fn deleting_a_quote_never_recomputes_the_stage() {
        let storage = seed(Stage::Negotiation).await;
        let q1 = create_quote(
            &storage,
            &ctx(),
            "client-1",
            NewQuote {
                statut: Some(QuoteStatus::Accepted),
                ..new_quote("Lot 1")
            },
        )
        .await
        .unwrap();
        assert_eq!(q1.new_stage, Some(Stage::Accepted));

        // Deleting the only accepted quote leaves the stage alone.
        delete_quote(&storage, &later_ctx(), "client-1", &q1.quote.devis_id)
            .await
            .unwrap();
        let client = storage.get_client("client-1").await.unwrap();
        assert_eq!(client.stage, Stage::Accepted);
        assert_eq!(client.last_modified_at, later_ctx().now);
        assert!(storage.list_quotes_for_client("client-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_client_and_quote_map_to_not_found() {
        let storage = seed(Stage::Negotiation).await;
        let err = create_quote(&storage, &ctx(), "client-9", new_quote("X"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplyError::ClientNotFound(_)));

        let err = patch_quote(
            &storage,
            &ctx(),
            "client-1",
            "devis-missing",
            QuotePatch::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApplyError::QuoteNotFound { .. }));

        let err = delete_quote(&storage, &ctx(), "client-1", "devis-missing")
            .await
            .unwrap_err();
        assert!(matches!(err, ApplyError::QuoteNotFound { .. }));
    }

    #[tokio::test]
    async fn create_client_twice_reports_already_exists() {
        let storage = seed(Stage::Negotiation).await;
        let err = create_client(&storage, &ctx(), "client-1", Stage::Qualified)
            .await
            .unwrap_err();
        assert!(matches!(err, ApplyError::ClientAlreadyExists(_)));
    }

    // Invariant: at most one open history row, and exactly one audit row
    // per stage change, across a chain of transitions.
    #[tokio::test]
    async fn history_and_audit_invariants_hold_across_a_transition_chain() {
        let storage = seed(Stage::Negotiation).await;
        let q = create_quote(&storage, &ctx(), "client-1", new_quote("Chain"))
            .await
            .unwrap();

        for (statut, settled) in [
            (Some(QuoteStatus::Accepted), None),       // negotiation -> accepted
            (None, Some(true)),                        // accepted -> invoice_settled
            (None, Some(false)),                       // invoice_settled -> accepted
            (Some(QuoteStatus::Pending), None),        // accepted -> negotiation
        ] {
            patch_quote(
                &storage,
                &later_ctx(),
                "client-1",
                &q.quote.devis_id,
                QuotePatch {
                    statut,
                    facture_reglee: settled,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
            assert_eq!(open_history_count(&storage).await, 1);
        }

        let audit = storage.list_audit("client-1").await.unwrap();
        assert_eq!(audit.len(), 4);
        for row in &audit {
            assert_eq!(row.kind, "stage_change");
        }
        let history = storage.list_stage_history("client-1").await.unwrap();
        assert_eq!(history.len(), 4);
    }
}
