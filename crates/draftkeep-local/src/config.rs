use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use draftkeep_core::AutoSaveConfig;

/// Configuration for the draftkeep command-line tool.
#[derive(Parser, Debug, Clone)]
#[command(name = "draftkeep")]
#[command(about = "Debounced autosave and versioned backups for chapter drafts")]
pub struct Config {
    /// Base directory for documents, backups and settings
    #[arg(long, global = true, env = "DRAFTKEEP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    /// Get the effective data directory.
    pub fn effective_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("draftkeep")
        })
    }

    /// Location of the persisted autosave settings.
    pub fn settings_path(&self) -> PathBuf {
        self.effective_data_dir().join("autosave.json")
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create an empty document and print its id
    New {
        #[arg(long)]
        title: String,
    },

    /// Print a document
    Show { document: String },

    /// Append stdin lines to a document, autosaving as you type
    Edit { document: String },

    /// Delete a document's current version (its backups are kept)
    Delete { document: String },

    /// Take a manual backup of a document
    Backup {
        document: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// List a document's backups, newest first
    Backups {
        document: String,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Overwrite a document with one of its backups
    Restore {
        document: String,
        backup: u64,
        /// Snapshot the current version as a pre-edit backup first
        #[arg(long)]
        keep_current: bool,
    },

    /// Delete one backup
    DeleteBackup { document: String, backup: u64 },

    /// Show or change autosave settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    Show,
    Set(ConfigOverrides),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    #[arg(long)]
    pub enabled: Option<bool>,

    #[arg(long)]
    pub content_debounce_ms: Option<u64>,

    #[arg(long)]
    pub title_debounce_ms: Option<u64>,

    #[arg(long)]
    pub max_backups: Option<u32>,

    #[arg(long)]
    pub backup_interval_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Apply every provided value, leaving the rest untouched.
    pub fn apply(&self, config: &mut AutoSaveConfig) {
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(ms) = self.content_debounce_ms {
            config.content_debounce_ms = ms;
        }
        if let Some(ms) = self.title_debounce_ms {
            config.title_debounce_ms = ms;
        }
        if let Some(max) = self.max_backups {
            config.max_backups = max;
        }
        if let Some(ms) = self.backup_interval_ms {
            config.backup_interval_ms = ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edit() {
        let config = Config::parse_from(["draftkeep", "--data-dir", "/tmp/dk", "edit", "abc-123"]);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/dk")));
        assert_eq!(config.settings_path(), PathBuf::from("/tmp/dk/autosave.json"));
        assert!(matches!(config.command, Command::Edit { ref document } if document == "abc-123"));
    }

    #[test]
    fn test_overrides_apply_only_given_fields() {
        let config = Config::parse_from([
            "draftkeep",
            "config",
            "set",
            "--max-backups",
            "5",
            "--enabled",
            "false",
        ]);
        let Command::Config {
            action: ConfigAction::Set(overrides),
        } = config.command
        else {
            panic!("expected config set");
        };

        let mut autosave = AutoSaveConfig::default();
        overrides.apply(&mut autosave);
        assert!(!autosave.enabled);
        assert_eq!(autosave.max_backups, 5);
        assert_eq!(autosave.content_debounce_ms, AutoSaveConfig::default().content_debounce_ms);
    }
}
