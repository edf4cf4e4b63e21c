use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use draftkeep_core::{
    AutoSaveConfig, DocumentStore, EditableDocument, NewBackup, RichText, SaveEvent,
};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::backup::BackupManager;
use crate::error::Result;
use crate::settings::AutoSaveSettings;
use crate::status::SaveStatus;

/// How long Saved / Save failed stays visible before returning to Idle.
pub const DEFAULT_DISPLAY_DELAY: Duration = Duration::from_secs(2);

/// Completion channel of one scheduled save.
///
/// Dropping the ticket does not cancel the save.
#[derive(Debug)]
pub struct SaveTicket {
    rx: oneshot::Receiver<Result<EditableDocument>>,
}

impl SaveTicket {
    /// Wait for the save to finish.
    ///
    /// Returns `None` if the save was superseded or cancelled before it wrote
    /// anything; otherwise the saved document or the write error.
    pub async fn outcome(self) -> Option<Result<EditableDocument>> {
        self.rx.await.ok()
    }
}

struct SaveJob {
    document: EditableDocument,
    content: RichText,
    debounce: Duration,
    /// Snapshot taken when the save was scheduled
    config: AutoSaveConfig,
    display_delay: Duration,
    token: CancellationToken,
    completion: oneshot::Sender<Result<EditableDocument>>,
}

/// State shared between the scheduler and its spawned jobs.
struct JobContext {
    store: Arc<dyn DocumentStore>,
    backups: BackupManager,
    status: SaveStatus,
    /// Cancellation handle of the single outstanding job
    slot: Mutex<Option<CancellationToken>>,
    /// Serializes scheduled writes; a superseded job already writing finishes first
    write_gate: tokio::sync::Mutex<()>,
    /// document_id -> when its last automatic backup was taken
    last_auto_backup: DashMap<String, Instant>,
}

impl JobContext {
    async fn run(self: Arc<Self>, job: SaveJob) {
        let SaveJob {
            document,
            content,
            debounce,
            config,
            display_delay,
            token,
            completion,
        } = job;

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(document_id = %document.id, "Save superseded before firing");
                return;
            }
            _ = tokio::time::sleep(debounce) => {}
        }

        if !self.try_fire(&token) {
            debug!(document_id = %document.id, "Save cancelled before writing");
            return;
        }

        // Past this point the write runs to completion even if cancelled
        let gate = self.write_gate.lock().await;
        let result = self.persist(&document, &content).await;
        let event = match &result {
            Ok(saved) => {
                self.auto_backup(saved, &config).await;
                SaveEvent::Succeeded
            }
            Err(e) => {
                warn!("Autosave of document {} failed: {}", document.id, e);
                SaveEvent::Failed
            }
        };
        drop(gate);

        let revision = self.apply_if_current(&token, event);
        let _ = completion.send(result);

        if let Some(revision) = revision {
            tokio::time::sleep(display_delay).await;
            self.status.settle(revision);
        }
    }

    /// Enter Saving unless the job was cancelled. Atomic with respect to scheduling.
    fn try_fire(&self, token: &CancellationToken) -> bool {
        let _slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if token.is_cancelled() {
            return false;
        }
        self.status.apply(SaveEvent::Fired);
        true
    }

    /// A job that was superseded while writing leaves the state to its successor.
    fn apply_if_current(&self, token: &CancellationToken, event: SaveEvent) -> Option<u64> {
        let _slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if token.is_cancelled() {
            return None;
        }
        self.status.apply(event)
    }

    #[instrument(skip(self, document, content), level = "debug", fields(document_id = %document.id))]
    async fn persist(
        &self,
        document: &EditableDocument,
        content: &RichText,
    ) -> Result<EditableDocument> {
        let saved = document.with_content(content, Utc::now())?;
        self.store.update_document(&saved).await?;
        debug!(
            "Saved document {} ({} words)",
            saved.id, saved.word_count
        );
        Ok(saved)
    }

    /// Best effort: failures are logged and never affect the save result.
    async fn auto_backup(&self, saved: &EditableDocument, config: &AutoSaveConfig) {
        let now = Instant::now();
        if let Some(last) = self.last_auto_backup.get(&saved.id) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < config.backup_interval() {
                debug!(
                    "Skipping automatic backup of document {} ({:?} since last)",
                    saved.id, elapsed
                );
                return;
            }
        }

        let record = match self.store.insert_backup(NewBackup::auto(saved)).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Automatic backup of document {} failed: {}", saved.id, e);
                return;
            }
        };
        self.last_auto_backup.insert(saved.id.clone(), now);
        debug!("Created automatic backup {} for document {}", record.id, saved.id);

        if let Err(e) = self
            .backups
            .enforce_retention(&saved.id, config.max_backups())
            .await
        {
            warn!("Backup retention for document {} failed: {}", saved.id, e);
        }
    }
}

/// Debounced autosave for one editing session.
///
/// Bursts of edits collapse into a single write of the latest content. At most
/// one save is outstanding: scheduling a new one cancels the previous one if
/// it has not started writing. After each scheduled write an automatic backup
/// is taken when the configured interval has elapsed since the last one.
///
/// Jobs run on the runtime passed to [`AutoSaveScheduler::new`]. One scheduler
/// per open document; two schedulers writing the same document are not
/// coordinated.
pub struct AutoSaveScheduler {
    ctx: Arc<JobContext>,
    settings: AutoSaveSettings,
    runtime: Handle,
    display_delay: Duration,
}

impl std::fmt::Debug for AutoSaveScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoSaveScheduler")
            .field("store", &self.ctx.store.backend_name())
            .field("state", &self.ctx.status.current())
            .field("display_delay", &self.display_delay)
            .finish_non_exhaustive()
    }
}

impl AutoSaveScheduler {
    pub fn new(store: Arc<dyn DocumentStore>, settings: AutoSaveSettings, runtime: Handle) -> Self {
        let backups = BackupManager::new(store.clone(), settings.clone());
        Self {
            ctx: Arc::new(JobContext {
                store,
                backups,
                status: SaveStatus::new(),
                slot: Mutex::new(None),
                write_gate: tokio::sync::Mutex::new(()),
                last_auto_backup: DashMap::new(),
            }),
            settings,
            runtime,
            display_delay: DEFAULT_DISPLAY_DELAY,
        }
    }

    /// Override how long Saved / Save failed stays visible.
    pub fn with_display_delay(mut self, delay: Duration) -> Self {
        self.display_delay = delay;
        self
    }

    pub fn status(&self) -> &SaveStatus {
        &self.ctx.status
    }

    pub fn settings(&self) -> &AutoSaveSettings {
        &self.settings
    }

    pub fn backups(&self) -> &BackupManager {
        &self.ctx.backups
    }

    /// Save `content` into `document` once `debounce` passes without another call.
    ///
    /// Returns immediately with the state set to Pending. A zero debounce still
    /// defers the write to the runtime, so the save can always be cancelled.
    /// Returns `None` without touching the state when autosave is disabled.
    pub fn schedule_save(
        &self,
        document: EditableDocument,
        content: RichText,
        debounce: Duration,
    ) -> Option<SaveTicket> {
        let config = self.settings.current();
        if !config.enabled {
            debug!(document_id = %document.id, "Autosave disabled, not scheduling");
            return None;
        }

        let token = CancellationToken::new();
        {
            let mut slot = self.ctx.slot.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = slot.replace(token.clone()) {
                previous.cancel();
            }
            self.ctx.status.apply(SaveEvent::Scheduled);
        }

        let (completion, rx) = oneshot::channel();
        debug!(document_id = %document.id, ?debounce, "Scheduled save");
        let job = SaveJob {
            document,
            content,
            debounce,
            config,
            display_delay: self.display_delay,
            token,
            completion,
        };
        self.runtime.spawn(self.ctx.clone().run(job));

        Some(SaveTicket { rx })
    }

    /// Schedule a body edit with the configured content debounce.
    pub fn schedule_content_save(
        &self,
        document: EditableDocument,
        content: RichText,
    ) -> Option<SaveTicket> {
        let debounce = self.settings.current().content_debounce();
        self.schedule_save(document, content, debounce)
    }

    /// Schedule a title edit (carried by `document`) with the configured title debounce.
    pub fn schedule_title_save(
        &self,
        document: EditableDocument,
        content: RichText,
    ) -> Option<SaveTicket> {
        let debounce = self.settings.current().title_debounce();
        self.schedule_save(document, content, debounce)
    }

    /// Write immediately, bypassing the debounce and automatic backups.
    ///
    /// Waits for a scheduled write that is already in progress, so after
    /// [`AutoSaveScheduler::cancel_pending_save`] this write lands last. A save
    /// still waiting on its debounce is not cancelled here and may overwrite
    /// this one when it fires.
    pub async fn force_save(
        &self,
        document: &EditableDocument,
        content: &RichText,
    ) -> Result<EditableDocument> {
        let _gate = self.ctx.write_gate.lock().await;
        self.ctx.persist(document, content).await
    }

    /// Cancel the outstanding save, if any, and return to Idle.
    /// A write that already started still completes.
    pub fn cancel_pending_save(&self) {
        let mut slot = self.ctx.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = slot.take() {
            token.cancel();
            debug!("Cancelled pending save");
        }
        self.ctx.status.apply(SaveEvent::Cancelled);
    }
}

impl Drop for AutoSaveScheduler {
    fn drop(&mut self) {
        let slot = self.ctx.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = slot.as_ref() {
            token.cancel();
        }
    }
}
