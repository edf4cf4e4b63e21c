use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::StoreError;

/// The in-memory rich-text value edited by the user.
///
/// The store never looks inside it: it only keeps the serialized payload
/// produced by [`RichText::to_payload`] and the derived word count.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RichText(Value);

impl RichText {
    /// Wrap an already-structured rich-text tree.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// A rich-text value holding a single run of plain text.
    pub fn plain(text: impl Into<String>) -> Self {
        Self(Value::String(text.into()))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Count words across every text leaf of the tree. Object keys are markup, not text.
    pub fn word_count(&self) -> u64 {
        fn count(value: &Value) -> u64 {
            match value {
                Value::String(s) => s.unicode_words().count() as u64,
                Value::Array(items) => items.iter().map(count).sum(),
                Value::Object(map) => map.values().map(count).sum(),
                _ => 0,
            }
        }
        count(&self.0)
    }

    /// Serialize to the payload stored alongside documents and backups.
    pub fn to_payload(&self) -> Result<String, StoreError> {
        serde_json::to_string(&self.0).map_err(|e| {
            StoreError::Serialization(format!("Failed to serialize rich text: {}", e))
        })
    }

    /// Parse a stored payload. An empty payload is an empty document.
    pub fn from_payload(payload: &str) -> Result<Self, StoreError> {
        if payload.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(payload).map(Self).map_err(|e| {
            StoreError::Serialization(format!("Failed to parse rich text payload: {}", e))
        })
    }
}

/// The current, editable version of a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditableDocument {
    pub id: String,
    pub title: String,
    /// Serialized rich-text payload
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub word_count: u64,
    pub updated_at: DateTime<Utc>,
}

impl EditableDocument {
    /// Create an empty document with a fresh id.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            content: String::new(),
            word_count: 0,
            updated_at: Utc::now(),
        }
    }

    /// Decode the stored content payload.
    pub fn rich_text(&self) -> Result<RichText, StoreError> {
        RichText::from_payload(&self.content)
    }

    /// The persisted form of this document after replacing its content at `now`.
    pub fn with_content(&self, content: &RichText, now: DateTime<Utc>) -> Result<Self, StoreError> {
        Ok(Self {
            id: self.id.clone(),
            title: self.title.clone(),
            content: content.to_payload()?,
            word_count: content.word_count(),
            updated_at: self.next_timestamp(now),
        })
    }

    /// `updated_at` never moves backwards, even if the wall clock does.
    pub fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::milliseconds(1)
        }
    }
}

/// Why a backup snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Auto,
    Manual,
    PreEdit,
}

impl std::fmt::Display for BackupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackupKind::Auto => "auto",
            BackupKind::Manual => "manual",
            BackupKind::PreEdit => "pre-edit",
        };
        f.pad(name)
    }
}

/// A backup that has not been persisted yet. The store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBackup {
    pub document_id: String,
    pub kind: BackupKind,
    pub title: String,
    pub content: String,
    pub word_count: u64,
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
}

impl NewBackup {
    fn snapshot(document: &EditableDocument, kind: BackupKind, description: Option<String>) -> Self {
        Self {
            document_id: document.id.clone(),
            kind,
            title: document.title.clone(),
            content: document.content.clone(),
            word_count: document.word_count,
            created_at: Utc::now(),
            description,
        }
    }

    /// Snapshot taken by the scheduler after a successful save.
    pub fn auto(document: &EditableDocument) -> Self {
        Self::snapshot(document, BackupKind::Auto, None)
    }

    /// Snapshot explicitly requested by the user.
    pub fn manual(document: &EditableDocument, description: Option<String>) -> Self {
        Self::snapshot(document, BackupKind::Manual, description)
    }

    /// Snapshot of the state about to be overwritten.
    pub fn pre_edit(document: &EditableDocument, description: Option<String>) -> Self {
        Self::snapshot(document, BackupKind::PreEdit, description)
    }

    /// Attach the store-assigned id.
    pub fn into_record(self, id: u64) -> BackupRecord {
        BackupRecord {
            id,
            document_id: self.document_id,
            kind: self.kind,
            title: self.title,
            content: self.content,
            word_count: self.word_count,
            created_at: self.created_at,
            description: self.description,
        }
    }
}

/// An immutable snapshot of a document.
///
/// Records are append-only: they are only ever inserted or deleted, and they
/// outlive the document they were taken from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Assigned by the store on insert, increasing in insertion order
    pub id: u64,
    pub document_id: String,
    pub kind: BackupKind,
    pub title: String,
    pub content: String,
    pub word_count: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
