/// All errors that can be returned by a ChantierStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No client record with the given id.
    #[error("client not found: {client_id}")]
    ClientNotFound { client_id: String },

    /// No quote with the given id under the given client. Also returned
    /// when the devis exists but belongs to a different client.
    #[error("quote not found: {devis_id} (client {client_id})")]
    QuoteNotFound { client_id: String, devis_id: String },

    /// A client record with this id already exists.
    #[error("client already initialized: {client_id}")]
    AlreadyInitialized { client_id: String },

    /// Optimistic concurrency control conflict -- another transaction
    /// modified the client concurrently. The expected version was not found.
    #[error("concurrent conflict on client {client_id}: expected version {expected_version}")]
    ConcurrentConflict {
        client_id: String,
        expected_version: i64,
    },

    /// The one-open-row stage-history invariant would be violated
    /// (a second open row for the same client, or closing a row that is
    /// already closed).
    #[error("stage history invariant violation for client {client_id}: {detail}")]
    OpenHistoryViolation { client_id: String, detail: String },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
