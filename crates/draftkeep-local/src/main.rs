mod commands;
mod config;
mod settings_file;
mod storage;

use std::sync::Arc;

use clap::Parser;
use draftkeep_autosave::AutoSaveSettings;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use config::{Command, Config, ConfigAction};
use settings_file::load_settings;
use storage::LocalStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Status lines and logs go to stderr; stdout carries command output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    let dir = config.effective_data_dir();
    debug!("Data dir: {}", dir.display());
    let store = Arc::new(LocalStore::new(&dir));

    let settings_path = config.settings_path();
    let settings = AutoSaveSettings::new(load_settings(&settings_path).await?);

    match config.command {
        Command::New { title } => commands::new_document(&store, title).await?,
        Command::Show { document } => commands::show(&store, &document).await?,
        Command::Edit { document } => commands::edit(store, settings, &document).await?,
        Command::Delete { document } => commands::delete(&store, &document).await?,
        Command::Backup {
            document,
            description,
        } => commands::backup(store, settings, &document, description).await?,
        Command::Backups { document, limit } => {
            commands::list_backups(&store, &document, limit).await?
        }
        Command::Restore {
            document,
            backup,
            keep_current,
        } => commands::restore(store, settings, &document, backup, keep_current).await?,
        Command::DeleteBackup { document, backup } => {
            commands::delete_backup(store, settings, &document, backup).await?
        }
        Command::Config { action } => match action {
            ConfigAction::Show => commands::show_config(&settings.current())?,
            ConfigAction::Set(overrides) => {
                commands::set_config(&settings_path, &settings, &overrides).await?;
                info!("Saved settings to {}", settings_path.display());
            }
        },
    }

    Ok(())
}
