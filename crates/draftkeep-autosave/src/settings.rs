use std::sync::Arc;

use draftkeep_core::AutoSaveConfig;
use tokio::sync::watch;
use tracing::debug;

/// Process-wide, runtime-mutable autosave configuration.
///
/// Cloning shares the same underlying value. Readers take a snapshot with
/// [`AutoSaveSettings::current`]; the scheduler does so each time a save is
/// scheduled, so a change only affects jobs scheduled after it.
#[derive(Debug, Clone)]
pub struct AutoSaveSettings {
    tx: Arc<watch::Sender<AutoSaveConfig>>,
}

impl AutoSaveSettings {
    pub fn new(config: AutoSaveConfig) -> Self {
        let (tx, _rx) = watch::channel(config);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> AutoSaveConfig {
        self.tx.borrow().clone()
    }

    /// Observe configuration changes.
    pub fn subscribe(&self) -> watch::Receiver<AutoSaveConfig> {
        self.tx.subscribe()
    }

    pub fn replace(&self, config: AutoSaveConfig) {
        debug!(?config, "Replacing autosave config");
        self.tx.send_replace(config);
    }

    /// Modify the configuration in place. Subscribers are only notified on an actual change.
    pub fn update(&self, f: impl FnOnce(&mut AutoSaveConfig)) {
        self.tx.send_if_modified(|config| {
            let before = config.clone();
            f(config);
            *config != before
        });
    }
}

impl Default for AutoSaveSettings {
    fn default() -> Self {
        Self::new(AutoSaveConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_notifies_subscribers() {
        let settings = AutoSaveSettings::default();
        let mut rx = settings.subscribe();

        settings.update(|c| c.max_backups = 3);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().max_backups, 3);

        // No-op update does not notify
        settings.update(|c| c.max_backups = 3);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_clones_share_state() {
        let settings = AutoSaveSettings::default();
        let other = settings.clone();
        other.replace(AutoSaveConfig {
            enabled: false,
            ..AutoSaveConfig::default()
        });
        assert!(!settings.current().enabled);
    }
}
