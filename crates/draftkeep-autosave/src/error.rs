use draftkeep_core::StoreError;
use thiserror::Error;

/// Errors surfaced by the autosave engine.
///
/// Cancellation is not an error and never appears here.
#[derive(Error, Debug)]
pub enum AutoSaveError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Backup {backup_id} has malformed content: {reason}")]
    MalformedBackup { backup_id: u64, reason: String },

    #[error("Backup {backup_id} belongs to document {actual}, not {expected}")]
    BackupMismatch {
        backup_id: u64,
        expected: String,
        actual: String,
    },
}

pub type Result<T> = std::result::Result<T, AutoSaveError>;
