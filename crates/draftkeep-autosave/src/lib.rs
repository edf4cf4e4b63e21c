//! Debounced autosave and versioned backups.
//!
//! - `AutoSaveScheduler`: collapses bursts of edits into one write per quiet
//!   period and snapshots automatic backups at a bounded rate
//! - `BackupManager`: manual backups, restore, delete and retention
//! - `SaveStatus`: the observable save state for the UI
//! - `AutoSaveSettings`: runtime-mutable configuration
//!
//! Failures of automatic backups are logged and never fail the save they follow.

mod backup;
mod error;
mod scheduler;
mod settings;
mod status;

pub use backup::BackupManager;
pub use draftkeep_core::{AutoSaveConfig, SaveState};
pub use error::{AutoSaveError, Result};
pub use scheduler::{AutoSaveScheduler, SaveTicket, DEFAULT_DISPLAY_DELAY};
pub use settings::AutoSaveSettings;
pub use status::SaveStatus;
