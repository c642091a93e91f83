//! HTTP JSON API server for the Chantier pipeline.
//!
//! The binary entry point lives in `main.rs`; the serve module is exposed
//! as a library so router-level tests can drive the app with `tower`'s
//! `oneshot` without binding a socket.

pub mod serve;
