use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Autosave tuning, shared by every editing session of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSaveConfig {
    /// When false, scheduling a save is a no-op
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Quiet period before a content edit is written
    #[serde(default = "default_content_debounce_ms")]
    pub content_debounce_ms: u64,
    /// Quiet period before a title edit is written
    #[serde(default = "default_title_debounce_ms")]
    pub title_debounce_ms: u64,
    /// Retention cap per document (0 keeps none)
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    /// Minimum spacing between automatic backups of one document
    #[serde(default = "default_backup_interval_ms")]
    pub backup_interval_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_content_debounce_ms() -> u64 {
    1_500
}

fn default_title_debounce_ms() -> u64 {
    500
}

fn default_max_backups() -> u32 {
    20
}

fn default_backup_interval_ms() -> u64 {
    5 * 60 * 1_000
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            content_debounce_ms: default_content_debounce_ms(),
            title_debounce_ms: default_title_debounce_ms(),
            max_backups: default_max_backups(),
            backup_interval_ms: default_backup_interval_ms(),
        }
    }
}

impl AutoSaveConfig {
    pub fn content_debounce(&self) -> Duration {
        Duration::from_millis(self.content_debounce_ms)
    }

    pub fn title_debounce(&self) -> Duration {
        Duration::from_millis(self.title_debounce_ms)
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_millis(self.backup_interval_ms)
    }

    pub fn max_backups(&self) -> usize {
        self.max_backups as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AutoSaveConfig =
            serde_json::from_str(r#"{"enabled": false, "max_backups": 3}"#).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.max_backups(), 3);
        assert_eq!(config.content_debounce(), Duration::from_millis(1_500));
        assert_eq!(config.backup_interval(), Duration::from_secs(300));
    }
}
