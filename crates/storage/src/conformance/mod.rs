//! Conformance test suite for `ChantierStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `ChantierStorage` implementation can run to verify correctness. The
//! suite covers:
//!
//! - **Initialization**: client creation, duplicate detection
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes visible
//! - **Atomic commit**: all-or-nothing semantics for multi-record snapshots
//! - **Version validation / OCC**: optimistic concurrency conflict detection
//! - **Stage history**: the one-open-row-per-client invariant
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function
//! that creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use chantier_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod history;
mod init;
mod snapshot;
mod version;

use std::fmt;
use std::future::Future;

use rust_decimal::Decimal;
use time::macros::datetime;
use time::OffsetDateTime;

use chantier_core::{QuoteStatus, Stage};

use crate::record::{QuoteRecord, StageHistoryRecord};
use crate::ChantierStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "init", "snapshot", "commit").
    pub category: String,
    /// Test name (e.g. "initialize_creates_client_at_version_0").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self {
                category: category.to_string(),
                name: name.to_string(),
                passed: true,
                message: None,
            },
            Err(msg) => Self {
                category: category.to_string(),
                name: name.to_string(),
                passed: false,
                message: Some(msg),
            },
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: ChantierStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(init::run_init_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(history::run_history_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn t0() -> OffsetDateTime {
    datetime!(2026-01-01 00:00:00 UTC)
}

fn make_quote(client_id: &str, devis_id: &str) -> QuoteRecord {
    QuoteRecord {
        devis_id: devis_id.to_string(),
        client_id: client_id.to_string(),
        title: "Renovation toiture".to_string(),
        montant: Decimal::new(420_000, 2),
        description: None,
        statut: QuoteStatus::Pending,
        facture_reglee: false,
        notes: None,
        fichier: None,
        created_by: Some("conformance".to_string()),
        date_creation: t0(),
        validated_at: None,
    }
}

fn make_open_history(id: &str, client_id: &str, stage: Stage) -> StageHistoryRecord {
    StageHistoryRecord {
        id: id.to_string(),
        client_id: client_id.to_string(),
        stage_name: stage,
        started_at: t0(),
        ended_at: None,
        duration_seconds: None,
        changed_by: "conformance".to_string(),
    }
}
