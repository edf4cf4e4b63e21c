use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{BackupRecord, EditableDocument, NewBackup};

/// Record store holding the current version of each document and its backups.
///
/// The autosave engine only ever talks to persistence through this trait.
/// Implementations decide the physical layout; ordering and retention rules
/// are shared through [`crate::retention`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the backend identifier (e.g., "memory", "local").
    fn backend_name(&self) -> &'static str;

    // =========================================================================
    // Document Operations
    // =========================================================================

    /// Load the current version of a document.
    async fn get_document(&self, id: &str) -> Result<Option<EditableDocument>, StoreError>;

    /// Replace the current version of a document (creating it if absent).
    async fn update_document(&self, document: &EditableDocument) -> Result<(), StoreError>;

    // =========================================================================
    // Backup Operations
    // =========================================================================

    /// Append a backup and return it with its assigned id.
    ///
    /// Fails with [`StoreError::DocumentNotFound`] if the parent document does not exist.
    async fn insert_backup(&self, backup: NewBackup) -> Result<BackupRecord, StoreError>;

    /// List a document's backups, newest first. `None` returns all of them.
    async fn list_backups_newest_first(
        &self,
        document_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<BackupRecord>, StoreError>;

    /// Delete a single backup. Returns whether it existed.
    async fn delete_backup(&self, backup: &BackupRecord) -> Result<bool, StoreError>;

    /// Delete every backup of a document except the `keep_count` newest.
    /// Returns the number of records removed.
    async fn delete_backups_except_newest(
        &self,
        document_id: &str,
        keep_count: usize,
    ) -> Result<u64, StoreError>;

    /// Number of backups held for a document.
    async fn count_backups(&self, document_id: &str) -> Result<u64, StoreError>;
}
