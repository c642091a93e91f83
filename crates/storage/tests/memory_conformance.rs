//! Runs the backend-agnostic conformance suite against `MemoryStorage`.

use chantier_storage::conformance::run_conformance_suite;
use chantier_storage::MemoryStorage;

#[tokio::test]
async fn memory_backend_passes_conformance() {
    let report = run_conformance_suite(|| async { MemoryStorage::new() }).await;
    assert_eq!(report.failed, 0, "{report}");
}
