use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use draftkeep_autosave::{AutoSaveScheduler, AutoSaveSettings, BackupManager};
use draftkeep_core::{AutoSaveConfig, BackupRecord, DocumentStore, EditableDocument, RichText};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::config::ConfigOverrides;
use crate::settings_file::save_settings;
use crate::storage::LocalStore;

async fn require_document(store: &LocalStore, id: &str) -> anyhow::Result<EditableDocument> {
    store
        .get_document(id)
        .await?
        .ok_or_else(|| anyhow!("Document {} not found", id))
}

/// Plain-text view of a document body.
fn body_text(content: &RichText) -> String {
    match content.as_value() {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub async fn new_document(store: &LocalStore, title: String) -> anyhow::Result<()> {
    let document = EditableDocument::new(title);
    store.update_document(&document).await?;
    info!("Created document {}", document.id);
    println!("{}", document.id);
    Ok(())
}

pub async fn show(store: &LocalStore, id: &str) -> anyhow::Result<()> {
    let document = require_document(store, id).await?;
    let content = document.rich_text()?;
    println!("{} ({})", document.title, document.id);
    println!(
        "{} words, updated {}",
        document.word_count,
        document.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!();
    println!("{}", body_text(&content));
    Ok(())
}

pub async fn delete(store: &LocalStore, id: &str) -> anyhow::Result<()> {
    if store.delete_document(id).await? {
        println!("Deleted document {} (backups kept)", id);
    } else {
        println!("Document {} did not exist", id);
    }
    Ok(())
}

/// Interactive editing session on stdin.
pub async fn edit(
    store: Arc<LocalStore>,
    settings: AutoSaveSettings,
    id: &str,
) -> anyhow::Result<()> {
    let document = require_document(&store, id).await?;

    let scheduler = AutoSaveScheduler::new(store, settings, Handle::current());
    let mut status_rx = scheduler.status().subscribe();
    let status_printer = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let text = status_rx.borrow_and_update().status_text();
            if !text.is_empty() {
                eprintln!("[{}]", text);
            }
        }
    });

    let saved = run_edit_session(
        &scheduler,
        &document,
        BufReader::new(tokio::io::stdin()),
        tokio::signal::ctrl_c(),
    )
    .await;
    status_printer.abort();

    match saved? {
        Some(saved) => println!("Saved {} ({} words)", saved.id, saved.word_count),
        None => println!("No changes"),
    }
    Ok(())
}

/// Append every input line to the body and schedule it as a content save.
///
/// At EOF the last scheduled save is awaited; with autosave disabled the body
/// is force-saved instead. `interrupt` cancels the pending save and writes the
/// body immediately. Returns `None` if nothing was edited.
async fn run_edit_session<R, I>(
    scheduler: &AutoSaveScheduler,
    document: &EditableDocument,
    input: R,
    interrupt: I,
) -> anyhow::Result<Option<EditableDocument>>
where
    R: AsyncBufRead + Unpin,
    I: Future<Output = std::io::Result<()>>,
{
    let mut body = body_text(&document.rich_text()?);
    let mut lines = input.lines();
    tokio::pin!(interrupt);

    let mut last_ticket = None;
    let mut dirty = false;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                if !body.is_empty() {
                    body.push('\n');
                }
                body.push_str(&line);
                dirty = true;
                last_ticket =
                    scheduler.schedule_content_save(document.clone(), RichText::plain(body.clone()));
            }
            _ = &mut interrupt => {
                info!("Interrupted, saving immediately");
                scheduler.cancel_pending_save();
                let content = RichText::plain(std::mem::take(&mut body));
                return Ok(Some(scheduler.force_save(document, &content).await?));
            }
        }
    }

    let saved = match last_ticket {
        Some(ticket) => ticket.outcome().await.transpose()?,
        None => None,
    };
    match saved {
        Some(saved) => Ok(Some(saved)),
        // Autosave disabled: don't drop the session's edits
        None if dirty => Ok(Some(
            scheduler.force_save(document, &RichText::plain(body)).await?,
        )),
        None => Ok(None),
    }
}

pub async fn backup(
    store: Arc<LocalStore>,
    settings: AutoSaveSettings,
    id: &str,
    description: Option<String>,
) -> anyhow::Result<()> {
    let document = require_document(&store, id).await?;
    let content = document.rich_text()?;
    let manager = BackupManager::new(store, settings);

    let record = manager
        .create_manual_backup(&document, &content, description)
        .await?;
    println!("Created backup {} ({} words)", record.id, record.word_count);
    Ok(())
}

pub async fn list_backups(
    store: &LocalStore,
    id: &str,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let backups = store.list_backups_newest_first(id, limit).await?;
    if backups.is_empty() {
        println!("No backups for {}", id);
        return Ok(());
    }

    for backup in backups {
        println!(
            "{:>6}  {:<8}  {}  {:>6} words  {}{}",
            backup.id,
            backup.kind,
            backup.created_at.format("%Y-%m-%d %H:%M:%S"),
            backup.word_count,
            backup.title,
            backup
                .description
                .map(|d| format!(" - {}", d))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn find_backup(
    manager: &BackupManager,
    id: &str,
    backup_id: u64,
) -> anyhow::Result<BackupRecord> {
    manager
        .list_backups(id, None)
        .await?
        .into_iter()
        .find(|b| b.id == backup_id)
        .ok_or_else(|| anyhow!("Backup {} not found for document {}", backup_id, id))
}

pub async fn restore(
    store: Arc<LocalStore>,
    settings: AutoSaveSettings,
    id: &str,
    backup_id: u64,
    keep_current: bool,
) -> anyhow::Result<()> {
    let document = require_document(&store, id).await?;
    let manager = BackupManager::new(store, settings);
    let backup = find_backup(&manager, id, backup_id).await?;

    if keep_current {
        let current = document.rich_text()?;
        let snapshot = manager
            .snapshot_pre_edit(&document, &current, Some(format!("before restoring {}", backup_id)))
            .await?;
        println!("Kept current version as backup {}", snapshot.id);
    }

    let (restored, _content) = manager.restore_from_backup(&document, &backup).await?;
    println!(
        "Restored {} from backup {} ({} words)",
        restored.id, backup.id, restored.word_count
    );
    Ok(())
}

pub async fn delete_backup(
    store: Arc<LocalStore>,
    settings: AutoSaveSettings,
    id: &str,
    backup_id: u64,
) -> anyhow::Result<()> {
    let manager = BackupManager::new(store, settings);
    let backup = find_backup(&manager, id, backup_id).await?;

    manager.delete_backup(&backup).await?;
    println!("Deleted backup {}", backup_id);
    Ok(())
}

pub fn show_config(config: &AutoSaveConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

pub async fn set_config(
    path: &Path,
    settings: &AutoSaveSettings,
    overrides: &ConfigOverrides,
) -> anyhow::Result<()> {
    settings.update(|config| overrides.apply(config));
    let config = settings.current();
    save_settings(path, &config).await?;
    debug!(?config, "Updated autosave settings");
    show_config(&config)
}
