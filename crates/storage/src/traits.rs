use async_trait::async_trait;
use time::OffsetDateTime;

use chantier_core::Stage;

use crate::error::StorageError;
use crate::record::{AuditRecord, ClientRecord, QuoteRecord, StageHistoryRecord};

/// The storage trait for Chantier pipeline backends.
///
/// A `ChantierStorage` implementation provides durable, transactional
/// storage for clients, their quotes (devis), the stage duration ledger,
/// and the audit trail.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing
/// an in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()` -- start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` -- commit and consume the transaction
///    OR `abort_snapshot(snapshot)` -- roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, the underlying transaction
/// MUST be rolled back (drop semantics on the underlying DB transaction).
///
/// Every mutation request runs in exactly one snapshot: the quote mutation,
/// the stage-history close/open, the client stage update, and the audit
/// append all commit together or not at all. Partial failure must never
/// leave a client with zero or multiple open stage-history rows.
///
/// ## Per-Client Serialization
///
/// `get_client_for_update` uses `SELECT ... FOR UPDATE` semantics on the
/// client row. Two concurrent requests mutating the same client serialize
/// on that lock, so both cannot read the same "before" quote set and
/// independently open a second stage-history row.
///
/// ## OCC Conflict Detection
///
/// `update_client_stage` performs an optimistic concurrency check:
/// `UPDATE WHERE version = expected_version`. If zero rows are affected,
/// the method returns `Err(StorageError::ConcurrentConflict { ... })`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait ChantierStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    ///
    /// Must be `Send` to allow passing across async task boundaries.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Client operations (within snapshot) ──────────────────────────────────

    /// Create a new client record at the given stage with version 0 and no
    /// open stage-history row (the first engine-driven transition opens one).
    ///
    /// Returns `Err(StorageError::AlreadyInitialized)` if the client exists.
    async fn initialize_client(
        &self,
        snapshot: &mut Self::Snapshot,
        client_id: &str,
        stage: Stage,
        now: OffsetDateTime,
    ) -> Result<(), StorageError>;

    /// Read a client's record, locking the row for update.
    ///
    /// Uses `SELECT ... FOR UPDATE` semantics to serialize concurrent
    /// mutations on the same client until the snapshot is committed or
    /// aborted.
    async fn get_client_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        client_id: &str,
    ) -> Result<ClientRecord, StorageError>;

    /// Apply a version-validated UPDATE to a client's stage (OCC).
    ///
    /// Also bumps `last_modified_at` to `now`. Returns the new version.
    async fn update_client_stage(
        &self,
        snapshot: &mut Self::Snapshot,
        client_id: &str,
        expected_version: i64,
        new_stage: Stage,
        now: OffsetDateTime,
    ) -> Result<i64, StorageError>;

    /// Bump a client's `last_modified_at` without touching its stage.
    async fn touch_client(
        &self,
        snapshot: &mut Self::Snapshot,
        client_id: &str,
        now: OffsetDateTime,
    ) -> Result<(), StorageError>;

    // ── Quote operations (within snapshot) ───────────────────────────────────

    /// Insert a new quote. The quote's `client_id` must reference an
    /// existing client.
    async fn insert_quote(
        &self,
        snapshot: &mut Self::Snapshot,
        record: QuoteRecord,
    ) -> Result<(), StorageError>;

    /// Overwrite an existing quote with the given record.
    ///
    /// Returns `Err(StorageError::QuoteNotFound)` if no quote with the
    /// record's `(client_id, devis_id)` exists.
    async fn update_quote(
        &self,
        snapshot: &mut Self::Snapshot,
        record: QuoteRecord,
    ) -> Result<(), StorageError>;

    /// Hard-delete a quote.
    async fn delete_quote(
        &self,
        snapshot: &mut Self::Snapshot,
        client_id: &str,
        devis_id: &str,
    ) -> Result<(), StorageError>;

    /// Read a single quote within the snapshot.
    async fn get_quote(
        &self,
        snapshot: &mut Self::Snapshot,
        client_id: &str,
        devis_id: &str,
    ) -> Result<QuoteRecord, StorageError>;

    /// Read the full, just-persisted quote set for a client within the
    /// snapshot. This is what the engine evaluates against.
    async fn list_quotes(
        &self,
        snapshot: &mut Self::Snapshot,
        client_id: &str,
    ) -> Result<Vec<QuoteRecord>, StorageError>;

    // ── Stage history and audit (within snapshot) ────────────────────────────

    /// Read the client's open stage-history row, if any.
    async fn get_open_stage_history(
        &self,
        snapshot: &mut Self::Snapshot,
        client_id: &str,
    ) -> Result<Option<StageHistoryRecord>, StorageError>;

    /// Insert a new open stage-history row.
    ///
    /// Returns `Err(StorageError::OpenHistoryViolation)` if the client
    /// already has an open row.
    async fn open_stage_history(
        &self,
        snapshot: &mut Self::Snapshot,
        record: StageHistoryRecord,
    ) -> Result<(), StorageError>;

    /// Close an open stage-history row, setting `ended_at` and
    /// `duration_seconds`.
    async fn close_stage_history(
        &self,
        snapshot: &mut Self::Snapshot,
        history_id: &str,
        ended_at: OffsetDateTime,
        duration_seconds: i64,
    ) -> Result<(), StorageError>;

    /// Append a row to the audit trail. Audit rows are never mutated or
    /// deleted.
    async fn append_audit(
        &self,
        snapshot: &mut Self::Snapshot,
        record: AuditRecord,
    ) -> Result<(), StorageError>;

    // ── Query operations (outside snapshot, against pool/connection) ──────────

    /// Read a client's record without locking.
    async fn get_client(&self, client_id: &str) -> Result<ClientRecord, StorageError>;

    /// List a client's quotes ordered by `date_creation` descending.
    async fn list_quotes_for_client(
        &self,
        client_id: &str,
    ) -> Result<Vec<QuoteRecord>, StorageError>;

    /// List a client's stage-history rows ordered by `started_at` ascending.
    async fn list_stage_history(
        &self,
        client_id: &str,
    ) -> Result<Vec<StageHistoryRecord>, StorageError>;

    /// List a client's audit rows ordered by `date` ascending.
    async fn list_audit(&self, client_id: &str) -> Result<Vec<AuditRecord>, StorageError>;
}
