//! Chantier stage transition engine.
//!
//! Two layers:
//!
//! - [`decide`] -- the pure decision table. Given a client's current stage,
//!   the full just-persisted quote set, and the trigger event derived from
//!   the mutation, it answers whether the stage must change and to what.
//!   Unit-testable without any datastore.
//! - [`apply`] -- the mutation orchestration. Applies a quote/settlement
//!   mutation through a [`chantier_storage::ChantierStorage`] backend,
//!   re-reads the authoritative quote set, runs the decision table, and
//!   performs the stage-history close/open, client stage update, and audit
//!   append in the same snapshot (transaction).

pub mod apply;
pub mod decide;
mod error;

pub use apply::{
    create_client, create_quote, delete_quote, patch_quote, MutationContext, NewQuote,
    QuoteMutation, QuotePatch,
};
pub use decide::{decide, Decision, RuleId, TriggerEvent};
pub use error::ApplyError;
