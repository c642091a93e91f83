//! Chantier core library -- the shared vocabulary of the project pipeline.
//!
//! Defines the fixed [`Stage`] lifecycle enum with its classification sets
//! and the [`QuoteStatus`] enum for devis (quotes). Both types carry their
//! exact wire names; every other crate in the workspace speaks in these
//! types rather than raw strings.

mod quote;
mod stage;

pub use quote::QuoteStatus;
pub use stage::{Stage, StageParseError};
