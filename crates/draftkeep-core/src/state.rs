use serde::{Deserialize, Serialize};

/// Save progress shown to the user. Never persisted; every process starts Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveState {
    #[default]
    Idle,
    Pending,
    Saving,
    Saved,
    Error,
}

/// What happened to the scheduler's job slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveEvent {
    /// A save was scheduled (possibly superseding an older one)
    Scheduled,
    /// The debounce timer expired and the write is starting
    Fired,
    Succeeded,
    Failed,
    /// The pending save was cancelled explicitly
    Cancelled,
    /// The Saved/Error display delay elapsed
    Settled,
}

impl SaveState {
    /// Pure transition table. `None` means the event does not apply in this state.
    pub fn transition(self, event: SaveEvent) -> Option<SaveState> {
        use SaveEvent::*;
        use SaveState::*;

        match (self, event) {
            (_, Scheduled) => Some(Pending),
            (Pending, Fired) => Some(Saving),
            (Saving, Succeeded) => Some(Saved),
            (Saving, Failed) => Some(Error),
            (_, Cancelled) => Some(Idle),
            (Saved | Error, Settled) => Some(Idle),
            _ => None,
        }
    }

    pub fn status_text(self) -> &'static str {
        match self {
            SaveState::Idle => "",
            SaveState::Pending => "Changes pending...",
            SaveState::Saving => "Saving...",
            SaveState::Saved => "Saved",
            SaveState::Error => "Save failed",
        }
    }
}

impl std::fmt::Display for SaveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveState::Idle => write!(f, "idle"),
            SaveState::Pending => write!(f, "pending"),
            SaveState::Saving => write!(f, "saving"),
            SaveState::Saved => write!(f, "saved"),
            SaveState::Error => write!(f, "error"),
        }
    }
}
