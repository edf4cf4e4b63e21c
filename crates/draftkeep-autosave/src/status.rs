use std::sync::{Mutex, PoisonError};

use draftkeep_core::{SaveEvent, SaveState};
use tokio::sync::{broadcast, watch};
use tracing::trace;

const TRANSITION_CAPACITY: usize = 64;

/// Observable save state of one scheduler.
///
/// Applies [`SaveState::transition`] and publishes the result twice: the latest
/// value on a `watch` channel for rendering, and every applied transition on a
/// `broadcast` channel for consumers that must not miss intermediate states.
#[derive(Debug)]
pub struct SaveStatus {
    /// Bumped on every applied transition
    revision: Mutex<u64>,
    state_tx: watch::Sender<SaveState>,
    transitions_tx: broadcast::Sender<SaveState>,
}

impl SaveStatus {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(SaveState::Idle);
        let (transitions_tx, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            revision: Mutex::new(0),
            state_tx,
            transitions_tx,
        }
    }

    pub fn current(&self) -> SaveState {
        *self.state_tx.borrow()
    }

    /// Human-readable text for the current state.
    pub fn status_text(&self) -> &'static str {
        self.current().status_text()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_transitions(&self) -> broadcast::Receiver<SaveState> {
        self.transitions_tx.subscribe()
    }

    /// Apply an event. Returns the new revision, or `None` if the event does
    /// not apply to the current state.
    pub fn apply(&self, event: SaveEvent) -> Option<u64> {
        let mut revision = self.revision.lock().unwrap_or_else(PoisonError::into_inner);
        self.apply_locked(&mut revision, event)
    }

    /// Return to Idle after a Saved/Error display delay, unless something else
    /// happened since `revision` was observed.
    pub fn settle(&self, revision: u64) -> bool {
        let mut current = self.revision.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != revision {
            trace!(expected = revision, actual = *current, "Skipping stale settle");
            return false;
        }
        self.apply_locked(&mut current, SaveEvent::Settled).is_some()
    }

    fn apply_locked(&self, revision: &mut u64, event: SaveEvent) -> Option<u64> {
        let from = self.current();
        let Some(to) = from.transition(event) else {
            trace!(%from, ?event, "Ignoring transition");
            return None;
        };

        *revision += 1;
        self.state_tx.send_replace(to);
        // No receivers is fine
        let _ = self.transitions_tx.send(to);
        trace!(%from, %to, ?event, revision = *revision, "Save state changed");
        Some(*revision)
    }
}

impl Default for SaveStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        let status = SaveStatus::new();
        assert_eq!(status.current(), SaveState::Idle);
        assert_eq!(status.status_text(), "");
    }

    #[test]
    fn test_rejected_event_keeps_state() {
        let status = SaveStatus::new();
        assert!(status.apply(SaveEvent::Fired).is_none());
        assert_eq!(status.current(), SaveState::Idle);
    }

    #[test]
    fn test_transitions_are_broadcast() {
        let status = SaveStatus::new();
        let mut rx = status.subscribe_transitions();

        status.apply(SaveEvent::Scheduled);
        status.apply(SaveEvent::Scheduled);
        status.apply(SaveEvent::Fired);

        assert_eq!(rx.try_recv().unwrap(), SaveState::Pending);
        assert_eq!(rx.try_recv().unwrap(), SaveState::Pending);
        assert_eq!(rx.try_recv().unwrap(), SaveState::Saving);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_settle_after_success() {
        let status = SaveStatus::new();
        status.apply(SaveEvent::Scheduled);
        status.apply(SaveEvent::Fired);
        let revision = status.apply(SaveEvent::Succeeded).unwrap();
        assert_eq!(status.status_text(), "Saved");

        assert!(status.settle(revision));
        assert_eq!(status.current(), SaveState::Idle);
    }

    #[test]
    fn test_stale_settle_is_ignored() {
        let status = SaveStatus::new();
        status.apply(SaveEvent::Scheduled);
        status.apply(SaveEvent::Fired);
        let revision = status.apply(SaveEvent::Failed).unwrap();

        // A new edit arrives during the display delay
        status.apply(SaveEvent::Scheduled);

        assert!(!status.settle(revision));
        assert_eq!(status.current(), SaveState::Pending);
    }
}
