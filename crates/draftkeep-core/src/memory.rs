use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::model::{BackupRecord, EditableDocument, NewBackup};
use crate::retention::{newest_first, RetentionPolicy};
use crate::store::DocumentStore;

/// In-process document store.
///
/// Used when nothing needs to survive the process, and as the reference
/// store in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// document_id -> current version
    documents: DashMap<String, EditableDocument>,
    /// document_id -> backups in insertion order
    backups: DashMap<String, Vec<BackupRecord>>,
    /// Last assigned backup id
    last_backup_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a document. Its backups are kept.
    pub fn delete_document(&self, id: &str) -> bool {
        self.documents.remove(id).is_some()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_document(&self, id: &str) -> Result<Option<EditableDocument>, StoreError> {
        Ok(self.documents.get(id).map(|d| d.clone()))
    }

    #[instrument(skip(self, document), level = "debug", fields(document_id = %document.id))]
    async fn update_document(&self, document: &EditableDocument) -> Result<(), StoreError> {
        self.documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    #[instrument(skip(self, backup), level = "debug", fields(document_id = %backup.document_id, kind = %backup.kind))]
    async fn insert_backup(&self, backup: NewBackup) -> Result<BackupRecord, StoreError> {
        if !self.documents.contains_key(&backup.document_id) {
            return Err(StoreError::DocumentNotFound(backup.document_id.clone()));
        }

        let id = self.last_backup_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = backup.into_record(id);
        self.backups
            .entry(record.document_id.clone())
            .or_default()
            .push(record.clone());

        debug!("Inserted backup {} for document {}", id, record.document_id);
        Ok(record)
    }

    async fn list_backups_newest_first(
        &self,
        document_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<BackupRecord>, StoreError> {
        let mut records = self
            .backups
            .get(document_id)
            .map(|r| r.clone())
            .unwrap_or_default();
        records.sort_by(newest_first);
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn delete_backup(&self, backup: &BackupRecord) -> Result<bool, StoreError> {
        let Some(mut records) = self.backups.get_mut(&backup.document_id) else {
            return Ok(false);
        };
        let before = records.len();
        records.retain(|b| b.id != backup.id);
        Ok(records.len() < before)
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_backups_except_newest(
        &self,
        document_id: &str,
        keep_count: usize,
    ) -> Result<u64, StoreError> {
        let Some(mut records) = self.backups.get_mut(document_id) else {
            return Ok(0);
        };

        let expired: Vec<u64> = RetentionPolicy::keep_newest(keep_count)
            .select_expired(&records)
            .iter()
            .map(|b| b.id)
            .collect();
        records.retain(|b| !expired.contains(&b.id));

        if !expired.is_empty() {
            debug!(
                "Removed {} expired backups for document {}",
                expired.len(),
                document_id
            );
        }
        Ok(expired.len() as u64)
    }

    async fn count_backups(&self, document_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .backups
            .get(document_id)
            .map(|r| r.len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackupKind, RichText};

    async fn setup() -> (MemoryStore, EditableDocument) {
        let store = MemoryStore::new();
        let doc = EditableDocument::new("Chapter 1")
            .with_content(&RichText::plain("first draft"), chrono::Utc::now())
            .unwrap();
        store.update_document(&doc).await.unwrap();
        (store, doc)
    }

    #[tokio::test]
    async fn test_document_roundtrip() {
        let (store, doc) = setup().await;
        let loaded = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded, doc);
        assert!(store.get_document("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backup_ids_follow_insertion_order() {
        let (store, doc) = setup().await;
        let b1 = store.insert_backup(NewBackup::auto(&doc)).await.unwrap();
        let b2 = store.insert_backup(NewBackup::manual(&doc, None)).await.unwrap();
        assert!(b2.id > b1.id);
        assert_eq!(b2.kind, BackupKind::Manual);

        let listed = store.list_backups_newest_first(&doc.id, None).await.unwrap();
        assert_eq!(listed.iter().map(|b| b.id).collect::<Vec<_>>(), vec![b2.id, b1.id]);

        let limited = store.list_backups_newest_first(&doc.id, Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, b2.id);
    }

    #[tokio::test]
    async fn test_insert_backup_requires_document() {
        let store = MemoryStore::new();
        let orphan = EditableDocument::new("never saved");
        let err = store.insert_backup(NewBackup::auto(&orphan)).await.unwrap_err();
        assert!(matches!(err, StoreError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn test_retention_keeps_two_newest() {
        let (store, doc) = setup().await;
        let _b1 = store.insert_backup(NewBackup::auto(&doc)).await.unwrap();
        let b2 = store.insert_backup(NewBackup::auto(&doc)).await.unwrap();
        let b3 = store.insert_backup(NewBackup::auto(&doc)).await.unwrap();

        let removed = store.delete_backups_except_newest(&doc.id, 2).await.unwrap();
        assert_eq!(removed, 1);

        let remaining = store.list_backups_newest_first(&doc.id, None).await.unwrap();
        assert_eq!(remaining.iter().map(|b| b.id).collect::<Vec<_>>(), vec![b3.id, b2.id]);

        // Running again is a no-op
        assert_eq!(store.delete_backups_except_newest(&doc.id, 2).await.unwrap(), 0);
        assert_eq!(store.count_backups(&doc.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_backup() {
        let (store, doc) = setup().await;
        let b1 = store.insert_backup(NewBackup::auto(&doc)).await.unwrap();

        assert!(store.delete_backup(&b1).await.unwrap());
        assert!(!store.delete_backup(&b1).await.unwrap());
        assert_eq!(store.count_backups(&doc.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_backups_survive_document_deletion() {
        let (store, doc) = setup().await;
        store.insert_backup(NewBackup::auto(&doc)).await.unwrap();

        assert!(store.delete_document(&doc.id));
        assert!(store.get_document(&doc.id).await.unwrap().is_none());
        assert_eq!(store.count_backups(&doc.id).await.unwrap(), 1);
    }
}
