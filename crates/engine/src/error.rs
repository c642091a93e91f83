use chantier_storage::StorageError;

/// All errors that can be returned by the mutation orchestration.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// The referenced client does not exist.
    #[error("client not found: {0}")]
    ClientNotFound(String),

    /// The referenced quote does not exist under the given client.
    #[error("quote not found: {devis_id} (client {client_id})")]
    QuoteNotFound { client_id: String, devis_id: String },

    /// A client with this id already exists.
    #[error("client already exists: {0}")]
    ClientAlreadyExists(String),

    /// The mutation is semantically invalid (e.g. settling a quote that is
    /// not accepted).
    #[error("validation error: {0}")]
    Validation(String),

    /// The storage backend failed. The primary mutation and all secondary
    /// bookkeeping roll back together.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApplyError {
    /// Lift storage-level lookup failures into the orchestration taxonomy,
    /// so callers see `ClientNotFound`/`QuoteNotFound` rather than a
    /// backend error.
    pub(crate) fn from_storage(e: StorageError) -> Self {
        match e {
            StorageError::ClientNotFound { client_id } => ApplyError::ClientNotFound(client_id),
            StorageError::QuoteNotFound {
                client_id,
                devis_id,
            } => ApplyError::QuoteNotFound {
                client_id,
                devis_id,
            },
            StorageError::AlreadyInitialized { client_id } => {
                ApplyError::ClientAlreadyExists(client_id)
            }
            other => ApplyError::Storage(other),
        }
    }
}
