use std::path::{Path, PathBuf};

use async_trait::async_trait;
use draftkeep_core::retention::{newest_first, RetentionPolicy};
use draftkeep_core::{BackupRecord, DocumentStore, EditableDocument, NewBackup, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Local filesystem document store.
///
/// Layout:
/// ```text
/// {base_dir}/
///   documents/
///     {document_id}.json
///   backups.seq
///   backups/
///     {document_id}/
///       {backup_id:020}.json
/// ```
#[derive(Debug)]
pub struct LocalStore {
    base_dir: PathBuf,
    /// Held while allocating a backup id from the sequence file
    sequence_lock: Mutex<()>,
}

impl LocalStore {
    /// Create a new LocalStore with the given base directory.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            sequence_lock: Mutex::new(()),
        }
    }

    fn documents_dir(&self) -> PathBuf {
        self.base_dir.join("documents")
    }

    fn document_path(&self, document_id: &str) -> PathBuf {
        self.documents_dir().join(format!("{}.json", document_id))
    }

    /// Get the backups directory of a document.
    fn backups_dir(&self, document_id: &str) -> PathBuf {
        self.base_dir.join("backups").join(document_id)
    }

    fn backup_path(&self, document_id: &str, backup_id: u64) -> PathBuf {
        self.backups_dir(document_id)
            .join(format!("{:020}.json", backup_id))
    }

    fn sequence_path(&self) -> PathBuf {
        self.base_dir.join("backups.seq")
    }

    /// Document ids become file names, so only a safe alphabet is accepted.
    fn validate_id(document_id: &str) -> Result<(), StoreError> {
        let valid = !document_id.is_empty()
            && document_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(())
        } else {
            Err(StoreError::InvalidId(document_id.to_string()))
        }
    }

    /// Remove a document's current version. Its backups are kept.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete_document(&self, document_id: &str) -> Result<bool, StoreError> {
        Self::validate_id(document_id)?;
        let path = self.document_path(document_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Allocate the next backup id. Caller must hold `sequence_lock`.
    async fn next_backup_id(&self) -> Result<u64, StoreError> {
        let path = self.sequence_path();
        let last = match fs::read_to_string(&path).await {
            Ok(text) => text.trim().parse::<u64>().map_err(|e| {
                StoreError::Serialization(format!(
                    "Corrupt backup sequence {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => {
                return Err(StoreError::Io(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let next = last + 1;
        write_atomic(&path, next.to_string().as_bytes()).await?;
        Ok(next)
    }

    /// Read every backup of a document, in no particular order.
    async fn load_backups(&self, document_id: &str) -> Result<Vec<BackupRecord>, StoreError> {
        let dir = self.backups_dir(document_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(StoreError::Io(format!(
                    "Failed to read dir {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            StoreError::Io(format!("Failed to read dir entry: {}", e))
        })? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            match read_json::<BackupRecord>(&path).await {
                Ok(Some(record)) => backups.push(record),
                Ok(None) => warn!("Backup {} vanished while listing", path.display()),
                Err(StoreError::Serialization(e)) => {
                    warn!("Skipping unreadable backup: {}", e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(backups)
    }
}

/// Write via a temp file and rename, creating parent directories.
///
/// Every call gets its own temp file, so concurrent writes to one path never
/// share one; the last rename wins.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            StoreError::Io(format!("Failed to create dir {}: {}", parent.display(), e))
        })?;
    }

    let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
    fs::write(&temp_path, data).await.map_err(|e| {
        StoreError::Io(format!("Failed to write {}: {}", temp_path.display(), e))
    })?;
    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(StoreError::Io(format!(
            "Failed to rename to {}: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}

pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| {
        StoreError::Serialization(format!("Failed to serialize {}: {}", path.display(), e))
    })?;
    write_atomic(path, &json).await
}

/// `Ok(None)` if the file does not exist.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read(path).await {
        Ok(data) => serde_json::from_slice(&data).map(Some).map_err(|e| {
            StoreError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::Io(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

#[async_trait]
impl DocumentStore for LocalStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    // =========================================================================
    // Document Operations
    // =========================================================================

    #[instrument(skip(self), level = "debug")]
    async fn get_document(&self, id: &str) -> Result<Option<EditableDocument>, StoreError> {
        Self::validate_id(id)?;
        read_json(&self.document_path(id)).await
    }

    #[instrument(skip(self, document), level = "debug", fields(document_id = %document.id, words = document.word_count))]
    async fn update_document(&self, document: &EditableDocument) -> Result<(), StoreError> {
        Self::validate_id(&document.id)?;
        write_json(&self.document_path(&document.id), document).await?;
        debug!("Saved document {}", document.id);
        Ok(())
    }

    // =========================================================================
    // Backup Operations
    // =========================================================================

    #[instrument(skip(self, backup), level = "debug", fields(document_id = %backup.document_id, kind = %backup.kind))]
    async fn insert_backup(&self, backup: NewBackup) -> Result<BackupRecord, StoreError> {
        Self::validate_id(&backup.document_id)?;
        let exists = fs::try_exists(self.document_path(&backup.document_id))
            .await
            .map_err(|e| StoreError::Io(format!("Failed to stat document: {}", e)))?;
        if !exists {
            return Err(StoreError::DocumentNotFound(backup.document_id.clone()));
        }

        let _guard = self.sequence_lock.lock().await;
        let id = self.next_backup_id().await?;
        let record = backup.into_record(id);
        write_json(&self.backup_path(&record.document_id, id), &record).await?;

        debug!("Inserted backup {} for document {}", id, record.document_id);
        Ok(record)
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_backups_newest_first(
        &self,
        document_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<BackupRecord>, StoreError> {
        Self::validate_id(document_id)?;
        let mut backups = self.load_backups(document_id).await?;
        backups.sort_by(newest_first);
        if let Some(limit) = limit {
            backups.truncate(limit);
        }
        debug!("Listed {} backups for document {}", backups.len(), document_id);
        Ok(backups)
    }

    #[instrument(skip(self, backup), level = "debug", fields(backup_id = backup.id))]
    async fn delete_backup(&self, backup: &BackupRecord) -> Result<bool, StoreError> {
        Self::validate_id(&backup.document_id)?;
        let path = self.backup_path(&backup.document_id, backup.id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_backups_except_newest(
        &self,
        document_id: &str,
        keep_count: usize,
    ) -> Result<u64, StoreError> {
        Self::validate_id(document_id)?;
        let backups = self.load_backups(document_id).await?;

        let mut removed = 0u64;
        for backup in RetentionPolicy::keep_newest(keep_count).select_expired(&backups) {
            if self.delete_backup(backup).await? {
                removed += 1;
            }
        }

        debug!(
            "Removed {} of {} backups for document {} (keep {})",
            removed,
            backups.len(),
            document_id,
            keep_count
        );
        Ok(removed)
    }

    #[instrument(skip(self), level = "debug")]
    async fn count_backups(&self, document_id: &str) -> Result<u64, StoreError> {
        Self::validate_id(document_id)?;
        let dir = self.backups_dir(document_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(StoreError::Io(format!(
                    "Failed to read dir {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut count = 0u64;
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            StoreError::Io(format!("Failed to read dir entry: {}", e))
        })? {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }
        Ok(count)
    }
}
