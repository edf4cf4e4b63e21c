//! Core traits and types for the draftkeep autosave engine.
//!
//! This crate defines what is shared between the scheduler and the store backends:
//! - `EditableDocument`, `BackupRecord`, `RichText`: the data model
//! - `SaveState`: the pure save-progress transition table
//! - `RetentionPolicy`: which backups survive cleanup
//! - `DocumentStore`: the narrow persistence contract
//! - `MemoryStore`: an in-process `DocumentStore`

mod config;
mod error;
mod memory;
mod model;
pub mod retention;
mod state;
mod store;

pub use config::AutoSaveConfig;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use model::{BackupKind, BackupRecord, EditableDocument, NewBackup, RichText};
pub use retention::RetentionPolicy;
pub use state::{SaveEvent, SaveState};
pub use store::DocumentStore;
