//! In-memory reference backend.
//!
//! `MemoryStorage` holds the whole store behind one async mutex. A snapshot
//! takes the owned guard and stages a full copy of the data: mutations go to
//! the staged copy, commit writes it back through the guard, abort just
//! drops it. Every snapshot is therefore a fully serialized transaction,
//! which satisfies the per-client serialization requirement outright
//! (coarser than a row lock, but correct).

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use chantier_core::Stage;

use crate::error::StorageError;
use crate::record::{AuditRecord, ClientRecord, QuoteRecord, StageHistoryRecord};
use crate::traits::ChantierStorage;

#[derive(Default, Clone)]
struct StoreData {
    clients: Vec<ClientRecord>,
    quotes: Vec<QuoteRecord>,
    history: Vec<StageHistoryRecord>,
    audit: Vec<AuditRecord>,
}

/// In-memory `ChantierStorage` backend. Cheap to clone; clones share the
/// same underlying store.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<StoreData>>,
}

/// An in-progress transaction over a `MemoryStorage`.
///
/// Holds the store lock for its whole lifetime; dropping without commit
/// discards the staged copy (rollback).
pub struct MemorySnapshot {
    staged: StoreData,
    guard: OwnedMutexGuard<StoreData>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreData {
    fn client_mut(&mut self, client_id: &str) -> Result<&mut ClientRecord, StorageError> {
        self.clients
            .iter_mut()
            .find(|c| c.client_id == client_id)
            .ok_or_else(|| StorageError::ClientNotFound {
                client_id: client_id.to_string(),
            })
    }

    fn quote_index(&self, client_id: &str, devis_id: &str) -> Result<usize, StorageError> {
        self.quotes
            .iter()
            .position(|q| q.client_id == client_id && q.devis_id == devis_id)
            .ok_or_else(|| StorageError::QuoteNotFound {
                client_id: client_id.to_string(),
                devis_id: devis_id.to_string(),
            })
    }
}

#[async_trait]
impl ChantierStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        let guard = Arc::clone(&self.data).lock_owned().await;
        let staged = guard.clone();
        Ok(MemorySnapshot { staged, guard })
    }

    async fn commit_snapshot(&self, mut snapshot: MemorySnapshot) -> Result<(), StorageError> {
        *snapshot.guard = snapshot.staged;
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StorageError> {
        // Dropping the snapshot discards the staged copy and releases the lock.
        Ok(())
    }

    async fn initialize_client(
        &self,
        snapshot: &mut MemorySnapshot,
        client_id: &str,
        stage: Stage,
        now: OffsetDateTime,
    ) -> Result<(), StorageError> {
        let data = &mut snapshot.staged;
        if data.clients.iter().any(|c| c.client_id == client_id) {
            return Err(StorageError::AlreadyInitialized {
                client_id: client_id.to_string(),
            });
        }
        data.clients.push(ClientRecord {
            client_id: client_id.to_string(),
            stage,
            version: 0,
            last_modified_at: now,
        });
        Ok(())
    }

    async fn get_client_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        client_id: &str,
    ) -> Result<ClientRecord, StorageError> {
        // The snapshot already holds the store lock, so the row is
        // effectively locked for the whole transaction.
        snapshot.staged.client_mut(client_id).map(|c| c.clone())
    }

    async fn update_client_stage(
        &self,
        snapshot: &mut MemorySnapshot,
        client_id: &str,
        expected_version: i64,
        new_stage: Stage,
        now: OffsetDateTime,
    ) -> Result<i64, StorageError> {
        let client = snapshot.staged.client_mut(client_id)?;
        if client.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                client_id: client_id.to_string(),
                expected_version,
            });
        }
        client.stage = new_stage;
        client.version += 1;
        client.last_modified_at = now;
        Ok(client.version)
    }

    async fn touch_client(
        &self,
        snapshot: &mut MemorySnapshot,
        client_id: &str,
        now: OffsetDateTime,
    ) -> Result<(), StorageError> {
        let client = snapshot.staged.client_mut(client_id)?;
        client.last_modified_at = now;
        Ok(())
    }

    async fn insert_quote(
        &self,
        snapshot: &mut MemorySnapshot,
        record: QuoteRecord,
    ) -> Result<(), StorageError> {
        let data = &mut snapshot.staged;
        // FK: the client must exist.
        data.client_mut(&record.client_id)?;
        data.quotes.push(record);
        Ok(())
    }

    async fn update_quote(
        &self,
        snapshot: &mut MemorySnapshot,
        record: QuoteRecord,
    ) -> Result<(), StorageError> {
        let data = &mut snapshot.staged;
        let idx = data.quote_index(&record.client_id, &record.devis_id)?;
        data.quotes[idx] = record;
        Ok(())
    }

    async fn delete_quote(
        &self,
        snapshot: &mut MemorySnapshot,
        client_id: &str,
        devis_id: &str,
    ) -> Result<(), StorageError> {
        let data = &mut snapshot.staged;
        let idx = data.quote_index(client_id, devis_id)?;
        data.quotes.remove(idx);
        Ok(())
    }

    async fn get_quote(
        &self,
        snapshot: &mut MemorySnapshot,
        client_id: &str,
        devis_id: &str,
    ) -> Result<QuoteRecord, StorageError> {
        let data = &snapshot.staged;
        let idx = data.quote_index(client_id, devis_id)?;
        Ok(data.quotes[idx].clone())
    }

    async fn list_quotes(
        &self,
        snapshot: &mut MemorySnapshot,
        client_id: &str,
    ) -> Result<Vec<QuoteRecord>, StorageError> {
        let mut quotes: Vec<QuoteRecord> = snapshot
            .staged
            .quotes
            .iter()
            .filter(|q| q.client_id == client_id)
            .cloned()
            .collect();
        quotes.sort_by(|a, b| b.date_creation.cmp(&a.date_creation));
        Ok(quotes)
    }

    async fn get_open_stage_history(
        &self,
        snapshot: &mut MemorySnapshot,
        client_id: &str,
    ) -> Result<Option<StageHistoryRecord>, StorageError> {
        Ok(snapshot
            .staged
            .history
            .iter()
            .find(|h| h.client_id == client_id && h.ended_at.is_none())
            .cloned())
    }

    async fn open_stage_history(
        &self,
        snapshot: &mut MemorySnapshot,
        record: StageHistoryRecord,
    ) -> Result<(), StorageError> {
        let data = &mut snapshot.staged;
        if data
            .history
            .iter()
            .any(|h| h.client_id == record.client_id && h.ended_at.is_none())
        {
            return Err(StorageError::OpenHistoryViolation {
                client_id: record.client_id.clone(),
                detail: "client already has an open stage history row".to_string(),
            });
        }
        data.history.push(record);
        Ok(())
    }

    async fn close_stage_history(
        &self,
        snapshot: &mut MemorySnapshot,
        history_id: &str,
        ended_at: OffsetDateTime,
        duration_seconds: i64,
    ) -> Result<(), StorageError> {
        let data = &mut snapshot.staged;
        let row = data
            .history
            .iter_mut()
            .find(|h| h.id == history_id)
            .ok_or_else(|| StorageError::Backend(format!("no history row '{history_id}'")))?;
        if row.ended_at.is_some() {
            return Err(StorageError::OpenHistoryViolation {
                client_id: row.client_id.clone(),
                detail: format!("history row '{history_id}' is already closed"),
            });
        }
        row.ended_at = Some(ended_at);
        row.duration_seconds = Some(duration_seconds);
        Ok(())
    }

    async fn append_audit(
        &self,
        snapshot: &mut MemorySnapshot,
        record: AuditRecord,
    ) -> Result<(), StorageError> {
        snapshot.staged.audit.push(record);
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<ClientRecord, StorageError> {
        let data = self.data.lock().await;
        data.clients
            .iter()
            .find(|c| c.client_id == client_id)
            .cloned()
            .ok_or_else(|| StorageError::ClientNotFound {
                client_id: client_id.to_string(),
            })
    }

    async fn list_quotes_for_client(
        &self,
        client_id: &str,
    ) -> Result<Vec<QuoteRecord>, StorageError> {
        let data = self.data.lock().await;
        let mut quotes: Vec<QuoteRecord> = data
            .quotes
            .iter()
            .filter(|q| q.client_id == client_id)
            .cloned()
            .collect();
        quotes.sort_by(|a, b| b.date_creation.cmp(&a.date_creation));
        Ok(quotes)
    }

    async fn list_stage_history(
        &self,
        client_id: &str,
    ) -> Result<Vec<StageHistoryRecord>, StorageError> {
        let data = self.data.lock().await;
        let mut rows: Vec<StageHistoryRecord> = data
            .history
            .iter()
            .filter(|h| h.client_id == client_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(rows)
    }

    async fn list_audit(&self, client_id: &str) -> Result<Vec<AuditRecord>, StorageError> {
        let data = self.data.lock().await;
        let mut rows: Vec<AuditRecord> = data
            .audit
            .iter()
            .filter(|a| a.client_id == client_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chantier_core::QuoteStatus;
    use rust_decimal::Decimal;
    use time::macros::datetime;

    fn quote(client_id: &str, devis_id: &str, at: OffsetDateTime) -> QuoteRecord {
        QuoteRecord {
            devis_id: devis_id.to_string(),
            client_id: client_id.to_string(),
            title: "Extension garage".to_string(),
            montant: Decimal::new(150_000, 2),
            description: None,
            statut: QuoteStatus::Pending,
            facture_reglee: false,
            notes: None,
            fichier: None,
            created_by: None,
            date_creation: at,
            validated_at: None,
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible() {
        let storage = MemoryStorage::new();
        let now = datetime!(2026-01-01 00:00:00 UTC);

        let mut snap = storage.begin_snapshot().await.unwrap();
        storage
            .initialize_client(&mut snap, "c1", Stage::Qualified, now)
            .await
            .unwrap();
        storage.abort_snapshot(snap).await.unwrap();

        assert!(matches!(
            storage.get_client("c1").await,
            Err(StorageError::ClientNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn quotes_list_in_date_descending_order() {
        let storage = MemoryStorage::new();
        let now = datetime!(2026-01-01 00:00:00 UTC);

        let mut snap = storage.begin_snapshot().await.unwrap();
        storage
            .initialize_client(&mut snap, "c1", Stage::Qualified, now)
            .await
            .unwrap();
        storage
            .insert_quote(&mut snap, quote("c1", "d1", datetime!(2026-01-02 00:00:00 UTC)))
            .await
            .unwrap();
        storage
            .insert_quote(&mut snap, quote("c1", "d2", datetime!(2026-01-05 00:00:00 UTC)))
            .await
            .unwrap();
        storage.commit_snapshot(snap).await.unwrap();

        let quotes = storage.list_quotes_for_client("c1").await.unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].devis_id, "d2");
        assert_eq!(quotes[1].devis_id, "d1");
    }

    #[tokio::test]
    async fn quote_of_other_client_is_not_found() {
        let storage = MemoryStorage::new();
        let now = datetime!(2026-01-01 00:00:00 UTC);

        let mut snap = storage.begin_snapshot().await.unwrap();
        storage
            .initialize_client(&mut snap, "c1", Stage::Qualified, now)
            .await
            .unwrap();
        storage
            .initialize_client(&mut snap, "c2", Stage::Qualified, now)
            .await
            .unwrap();
        storage
            .insert_quote(&mut snap, quote("c1", "d1", now))
            .await
            .unwrap();
        let err = storage.get_quote(&mut snap, "c2", "d1").await.unwrap_err();
        assert!(matches!(err, StorageError::QuoteNotFound { .. }));
    }
}
