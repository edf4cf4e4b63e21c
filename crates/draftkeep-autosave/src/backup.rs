use std::sync::Arc;

use chrono::Utc;
use draftkeep_core::{BackupRecord, DocumentStore, EditableDocument, NewBackup, RichText};
use tracing::{debug, info, instrument, warn};

use crate::error::{AutoSaveError, Result};
use crate::settings::AutoSaveSettings;

/// User-facing backup operations: manual snapshots, restore, delete, listing,
/// and retention cleanup.
///
/// Unlike the automatic backups taken by the scheduler, every failure here is
/// returned to the caller.
#[derive(Clone)]
pub struct BackupManager {
    store: Arc<dyn DocumentStore>,
    settings: AutoSaveSettings,
}

impl std::fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupManager")
            .field("store", &self.store.backend_name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl BackupManager {
    pub fn new(store: Arc<dyn DocumentStore>, settings: AutoSaveSettings) -> Self {
        Self { store, settings }
    }

    /// Snapshot `content` as a Manual backup, then apply retention.
    ///
    /// Not subject to the automatic backup interval. An `Err` means no backup
    /// was stored; a retention failure after the insert is only logged.
    #[instrument(skip(self, document, content), level = "debug", fields(document_id = %document.id))]
    pub async fn create_manual_backup(
        &self,
        document: &EditableDocument,
        content: &RichText,
        description: Option<String>,
    ) -> Result<BackupRecord> {
        let snapshot = document.with_content(content, Utc::now())?;
        let record = self
            .store
            .insert_backup(NewBackup::manual(&snapshot, description))
            .await?;
        self.retain_after_insert(&record).await;

        info!("Created manual backup {} for document {}", record.id, document.id);
        Ok(record)
    }

    /// Snapshot `content` as a PreEdit backup, then apply retention.
    ///
    /// Callers about to overwrite a document (e.g. before a restore) use this
    /// to keep the state being replaced. Restore never does it on its own.
    /// Retention failures are handled as in [`BackupManager::create_manual_backup`].
    #[instrument(skip(self, document, content), level = "debug", fields(document_id = %document.id))]
    pub async fn snapshot_pre_edit(
        &self,
        document: &EditableDocument,
        content: &RichText,
        description: Option<String>,
    ) -> Result<BackupRecord> {
        let snapshot = document.with_content(content, Utc::now())?;
        let record = self
            .store
            .insert_backup(NewBackup::pre_edit(&snapshot, description))
            .await?;
        self.retain_after_insert(&record).await;

        debug!("Created pre-edit backup {} for document {}", record.id, document.id);
        Ok(record)
    }

    /// Overwrite the document with the backup's snapshot and persist it immediately.
    ///
    /// The backup itself is kept. Nothing is written if the backup belongs to
    /// another document or its content cannot be decoded.
    #[instrument(skip(self, document, backup), level = "debug", fields(document_id = %document.id, backup_id = backup.id))]
    pub async fn restore_from_backup(
        &self,
        document: &EditableDocument,
        backup: &BackupRecord,
    ) -> Result<(EditableDocument, RichText)> {
        if backup.document_id != document.id {
            return Err(AutoSaveError::BackupMismatch {
                backup_id: backup.id,
                expected: document.id.clone(),
                actual: backup.document_id.clone(),
            });
        }

        let content =
            RichText::from_payload(&backup.content).map_err(|e| AutoSaveError::MalformedBackup {
                backup_id: backup.id,
                reason: e.to_string(),
            })?;

        let restored = EditableDocument {
            id: document.id.clone(),
            title: backup.title.clone(),
            content: backup.content.clone(),
            word_count: backup.word_count,
            updated_at: document.next_timestamp(Utc::now()),
        };
        self.store.update_document(&restored).await?;

        info!(
            "Restored document {} from {} backup {}",
            document.id, backup.kind, backup.id
        );
        Ok((restored, content))
    }

    /// Delete one backup. No retention side effects.
    #[instrument(skip(self, backup), level = "debug", fields(backup_id = backup.id))]
    pub async fn delete_backup(&self, backup: &BackupRecord) -> Result<()> {
        let existed = self.store.delete_backup(backup).await?;
        debug!("Deleted backup {} (existed: {})", backup.id, existed);
        Ok(())
    }

    /// A document's backups, newest first.
    pub async fn list_backups(
        &self,
        document_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<BackupRecord>> {
        Ok(self
            .store
            .list_backups_newest_first(document_id, limit)
            .await?)
    }

    pub async fn count_backups(&self, document_id: &str) -> Result<u64> {
        Ok(self.store.count_backups(document_id).await?)
    }

    /// Retention after a successful insert. Failures are logged since the
    /// record is already stored.
    async fn retain_after_insert(&self, record: &BackupRecord) {
        let max_backups = self.settings.current().max_backups();
        if let Err(e) = self.enforce_retention(&record.document_id, max_backups).await {
            warn!(
                "Backup {} stored but retention for document {} failed: {}",
                record.id, record.document_id, e
            );
        }
    }

    /// Keep the `max_backups` newest backups of a document and delete the rest.
    pub async fn enforce_retention(&self, document_id: &str, max_backups: usize) -> Result<u64> {
        let removed = self
            .store
            .delete_backups_except_newest(document_id, max_backups)
            .await?;
        if removed > 0 {
            debug!(
                "Retention removed {} backups of document {} (cap {})",
                removed, document_id, max_backups
            );
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftkeep_core::{AutoSaveConfig, BackupKind, MemoryStore, StoreError};

    async fn setup(max_backups: u32) -> (BackupManager, Arc<MemoryStore>, EditableDocument) {
        let store = Arc::new(MemoryStore::new());
        let settings = AutoSaveSettings::new(AutoSaveConfig {
            max_backups,
            ..AutoSaveConfig::default()
        });
        let doc = EditableDocument::new("Chapter 1")
            .with_content(&RichText::plain("the original"), Utc::now())
            .unwrap();
        store.update_document(&doc).await.unwrap();
        (BackupManager::new(store.clone(), settings), store, doc)
    }

    #[tokio::test]
    async fn test_manual_backups_bypass_interval() {
        let (manager, _store, doc) = setup(10).await;
        let content = RichText::plain("the original");

        let b1 = manager.create_manual_backup(&doc, &content, None).await.unwrap();
        let b2 = manager
            .create_manual_backup(&doc, &content, Some("again".to_string()))
            .await
            .unwrap();

        assert_ne!(b1.id, b2.id);
        assert_eq!(b1.kind, BackupKind::Manual);
        assert_eq!(b2.description.as_deref(), Some("again"));
        assert_eq!(manager.count_backups(&doc.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_manual_backup_applies_retention() {
        let (manager, _store, doc) = setup(2).await;
        let mut created = Vec::new();
        for i in 0..4 {
            let content = RichText::plain(format!("version {}", i));
            created.push(manager.create_manual_backup(&doc, &content, None).await.unwrap());
        }

        let remaining = manager.list_backups(&doc.id, None).await.unwrap();
        assert_eq!(
            remaining.iter().map(|b| b.id).collect::<Vec<_>>(),
            vec![created[3].id, created[2].id]
        );
    }

    #[tokio::test]
    async fn test_manual_backup_failure_is_surfaced() {
        let (manager, _store, _doc) = setup(10).await;
        let unsaved = EditableDocument::new("not in the store");

        let result = manager
            .create_manual_backup(&unsaved, &RichText::plain("x"), None)
            .await;
        assert!(matches!(result, Err(AutoSaveError::Store(_))));
    }

    /// Memory store whose retention cleanup always fails.
    #[derive(Default)]
    struct StuckRetentionStore {
        inner: MemoryStore,
    }

    #[async_trait::async_trait]
    impl DocumentStore for StuckRetentionStore {
        fn backend_name(&self) -> &'static str {
            "stuck-retention"
        }

        async fn get_document(&self, id: &str) -> std::result::Result<Option<EditableDocument>, StoreError> {
            self.inner.get_document(id).await
        }

        async fn update_document(&self, document: &EditableDocument) -> std::result::Result<(), StoreError> {
            self.inner.update_document(document).await
        }

        async fn insert_backup(&self, backup: NewBackup) -> std::result::Result<BackupRecord, StoreError> {
            self.inner.insert_backup(backup).await
        }

        async fn list_backups_newest_first(
            &self,
            document_id: &str,
            limit: Option<usize>,
        ) -> std::result::Result<Vec<BackupRecord>, StoreError> {
            self.inner.list_backups_newest_first(document_id, limit).await
        }

        async fn delete_backup(&self, backup: &BackupRecord) -> std::result::Result<bool, StoreError> {
            self.inner.delete_backup(backup).await
        }

        async fn delete_backups_except_newest(
            &self,
            _document_id: &str,
            _keep_count: usize,
        ) -> std::result::Result<u64, StoreError> {
            Err(StoreError::Io("permission denied".to_string()))
        }

        async fn count_backups(&self, document_id: &str) -> std::result::Result<u64, StoreError> {
            self.inner.count_backups(document_id).await
        }
    }

    #[tokio::test]
    async fn test_stored_backup_survives_retention_failure() {
        let store = Arc::new(StuckRetentionStore::default());
        let doc = EditableDocument::new("Chapter 1");
        store.update_document(&doc).await.unwrap();
        let manager = BackupManager::new(
            store.clone(),
            AutoSaveSettings::new(AutoSaveConfig {
                max_backups: 1,
                ..AutoSaveConfig::default()
            }),
        );

        let manual = manager
            .create_manual_backup(&doc, &RichText::plain("one"), None)
            .await
            .unwrap();
        let pre_edit = manager
            .snapshot_pre_edit(&doc, &RichText::plain("two"), None)
            .await
            .unwrap();

        // Both inserts are reported even though nothing could be pruned
        let ids: Vec<_> = manager
            .list_backups(&doc.id, None)
            .await
            .unwrap()
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec![pre_edit.id, manual.id]);
    }

    #[tokio::test]
    async fn test_restore_overwrites_and_keeps_backup() {
        let (manager, store, doc) = setup(10).await;
        let backup = manager
            .create_manual_backup(&doc, &RichText::plain("the original"), None)
            .await
            .unwrap();

        let edited = doc
            .with_content(&RichText::plain("something else entirely"), Utc::now())
            .unwrap();
        let edited = EditableDocument {
            title: "Renamed".to_string(),
            ..edited
        };
        store.update_document(&edited).await.unwrap();

        let (restored, content) = manager.restore_from_backup(&edited, &backup).await.unwrap();
        assert_eq!(restored.title, "Chapter 1");
        assert_eq!(restored.word_count, 2);
        assert_eq!(content, RichText::plain("the original"));
        assert!(restored.updated_at > edited.updated_at);

        let stored = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(stored, restored);
        assert_eq!(manager.count_backups(&doc.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_restore_twice_is_idempotent() {
        let (manager, store, doc) = setup(10).await;
        let backup = manager
            .create_manual_backup(&doc, &RichText::plain("keep me"), None)
            .await
            .unwrap();

        let (first, first_content) = manager.restore_from_backup(&doc, &backup).await.unwrap();
        let (second, second_content) = manager.restore_from_backup(&first, &backup).await.unwrap();

        assert_eq!(first.content, second.content);
        assert_eq!(first.title, second.title);
        assert_eq!(first_content, second_content);
        assert_eq!(store.get_document(&doc.id).await.unwrap().unwrap().content, second.content);
    }

    #[tokio::test]
    async fn test_restore_rejects_malformed_content() {
        let (manager, store, doc) = setup(10).await;
        let mut backup = manager
            .create_manual_backup(&doc, &RichText::plain("fine"), None)
            .await
            .unwrap();
        backup.content = "{broken".to_string();

        let err = manager.restore_from_backup(&doc, &backup).await.unwrap_err();
        assert!(matches!(err, AutoSaveError::MalformedBackup { .. }));

        // Document untouched
        let stored = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(stored, doc);
    }

    #[tokio::test]
    async fn test_restore_rejects_foreign_backup() {
        let (manager, store, doc) = setup(10).await;
        let other = EditableDocument::new("Chapter 2");
        store.update_document(&other).await.unwrap();
        let backup = manager
            .create_manual_backup(&other, &RichText::plain("other"), None)
            .await
            .unwrap();

        let err = manager.restore_from_backup(&doc, &backup).await.unwrap_err();
        assert!(matches!(err, AutoSaveError::BackupMismatch { .. }));
    }

    #[tokio::test]
    async fn test_pre_edit_snapshot() {
        let (manager, _store, doc) = setup(10).await;
        let record = manager
            .snapshot_pre_edit(&doc, &RichText::plain("the original"), Some("before restore".to_string()))
            .await
            .unwrap();
        assert_eq!(record.kind, BackupKind::PreEdit);
        assert_eq!(record.word_count, 2);
    }

    #[tokio::test]
    async fn test_delete_backup_has_no_retention_side_effects() {
        let (manager, _store, doc) = setup(10).await;
        let content = RichText::plain("x");
        let b1 = manager.create_manual_backup(&doc, &content, None).await.unwrap();
        let b2 = manager.create_manual_backup(&doc, &content, None).await.unwrap();

        manager.delete_backup(&b1).await.unwrap();
        // Deleting again is not an error
        manager.delete_backup(&b1).await.unwrap();

        let remaining = manager.list_backups(&doc.id, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b2.id);
    }
}
