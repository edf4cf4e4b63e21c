//! Backup retention.
//!
//! Keeps the `n` most recently created backups of a document. Records with equal
//! `created_at` are ordered by id, so the one inserted last is treated as newer.

use std::cmp::Ordering;

use crate::model::BackupRecord;

/// Newest first: `created_at` descending, then id descending.
pub fn newest_first(a: &BackupRecord, b: &BackupRecord) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// Retention rule for the backups of a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    max_backups: usize,
}

impl RetentionPolicy {
    pub fn keep_newest(max_backups: usize) -> Self {
        Self { max_backups }
    }

    pub fn max_backups(&self) -> usize {
        self.max_backups
    }

    /// Records that fall outside the retained window, oldest last.
    ///
    /// The input may be in any order. Running the policy again over its own
    /// survivors selects nothing.
    pub fn select_expired<'a>(&self, backups: &'a [BackupRecord]) -> Vec<&'a BackupRecord> {
        if backups.len() <= self.max_backups {
            return Vec::new();
        }

        let mut ordered: Vec<&BackupRecord> = backups.iter().collect();
        ordered.sort_by(|a, b| newest_first(a, b));
        ordered.split_off(self.max_backups)
    }
}
