use std::path::Path;

use draftkeep_core::{AutoSaveConfig, StoreError};
use tracing::debug;

use crate::storage::{read_json, write_json};

/// Load persisted autosave settings. A missing file yields the defaults.
pub async fn load_settings(path: &Path) -> Result<AutoSaveConfig, StoreError> {
    let config = read_json::<AutoSaveConfig>(path).await?;
    debug!(
        "Loaded autosave settings from {} (found: {})",
        path.display(),
        config.is_some()
    );
    Ok(config.unwrap_or_default())
}

pub async fn save_settings(path: &Path, config: &AutoSaveConfig) -> Result<(), StoreError> {
    write_json(path, config).await?;
    debug!("Saved autosave settings to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = load_settings(&temp.path().join("autosave.json")).await.unwrap();
        assert_eq!(config, AutoSaveConfig::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("autosave.json");
        let config = AutoSaveConfig {
            enabled: false,
            max_backups: 4,
            backup_interval_ms: 60_000,
            ..AutoSaveConfig::default()
        };

        save_settings(&path, &config).await.unwrap();
        assert_eq!(load_settings(&path).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("autosave.json");
        tokio::fs::write(&path, "max_backups = 3").await.unwrap();

        let err = load_settings(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
