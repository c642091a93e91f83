//! Storage layer for the Chantier pipeline.
//!
//! Defines the [`ChantierStorage`] trait (snapshot/transaction semantics
//! over clients, quotes, stage history, and the audit trail), the persisted
//! record types, the error taxonomy, and [`MemoryStorage`], the in-memory
//! reference backend. The [`conformance`] module holds a backend-agnostic
//! test suite that any implementation can run.

pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::MemoryStorage;
pub use record::{AuditRecord, ClientRecord, QuoteRecord, StageHistoryRecord};
pub use traits::ChantierStorage;
