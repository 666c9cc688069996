//! Durable retry queue for observations that failed remote delivery.
//!
//! The on-disk JSON file is the source of truth; the in-memory vector is
//! rebuilt from it on open and every mutation is persisted (atomic write +
//! fsync) before returning. Items are unique by record id — re-adding an
//! existing id increments its retry count instead of duplicating. Items at
//! or past [`MAX_RETRIES`] are dead-lettered: retained for diagnostics and
//! manual intervention, excluded from active retry.
//!
//! Exactly one poller process owns the queue file at a time (enforced by
//! the lifecycle lock), so no cross-process write protocol is needed.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

use super::types::ObservationRecord;

/// Retry attempts before an item is dead-lettered.
pub const MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: i64,
    pub observation: ObservationRecord,
    /// ISO 8601 timestamp of first enqueue.
    pub added_at: String,
    pub retry_count: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueFile {
    items: Vec<QueueItem>,
}

pub struct RetryQueue {
    path: PathBuf,
    items: Vec<QueueItem>,
}

impl RetryQueue {
    /// Open the queue, rebuilding the in-memory cache from disk.
    ///
    /// A missing file is an empty queue. An unreadable file is logged and
    /// treated as empty; the damaged file is overwritten on the next
    /// mutation.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let items = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<QueueFile>(&contents) {
                Ok(file) => file.items,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "queue file is unreadable, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read queue file {}", path.display()))
            }
        };

        Ok(Self { path, items })
    }

    /// Insert a record, or increment the retry count of an existing entry
    /// with the same id.
    ///
    /// Dead-lettered entries are terminal: re-adding one (the batch path
    /// re-adds the same frontier ids on every cycle of an outage) must not
    /// grow its counter or rewrite the file.
    pub fn add(&mut self, record: &ObservationRecord) -> Result<()> {
        match self.items.iter_mut().find(|i| i.id == record.id) {
            Some(item) if item.retry_count >= MAX_RETRIES => return Ok(()),
            Some(item) => item.retry_count += 1,
            None => self.items.push(QueueItem {
                id: record.id,
                observation: record.clone(),
                added_at: chrono::Utc::now().to_rfc3339(),
                retry_count: 0,
            }),
        }
        self.persist()
    }

    /// Insert a permanently rejected record directly at the retry bound so
    /// it is visible in diagnostics but never auto-retried.
    pub fn add_dead_letter(&mut self, record: &ObservationRecord) -> Result<()> {
        match self.items.iter_mut().find(|i| i.id == record.id) {
            Some(item) => item.retry_count = MAX_RETRIES,
            None => self.items.push(QueueItem {
                id: record.id,
                observation: record.clone(),
                added_at: chrono::Utc::now().to_rfc3339(),
                retry_count: MAX_RETRIES,
            }),
        }
        self.persist()
    }

    /// Delete the entry with the given id, if present.
    pub fn remove(&mut self, id: i64) -> Result<()> {
        self.items.retain(|i| i.id != id);
        self.persist()
    }

    /// Bump the retry count after a failed retry attempt.
    pub fn increment_retry(&mut self, id: i64) -> Result<()> {
        if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
            item.retry_count += 1;
        }
        self.persist()
    }

    /// Move an existing entry straight to the dead-letter partition.
    pub fn dead_letter(&mut self, id: i64) -> Result<()> {
        if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
            item.retry_count = MAX_RETRIES;
        }
        self.persist()
    }

    /// Entries still eligible for automatic retry.
    pub fn retry_items(&self) -> Vec<QueueItem> {
        self.items
            .iter()
            .filter(|i| i.retry_count < MAX_RETRIES)
            .cloned()
            .collect()
    }

    /// Dead-lettered entries, exposed for diagnostics and manual cleanup.
    pub fn failed_items(&self) -> Vec<QueueItem> {
        self.items
            .iter()
            .filter(|i| i.retry_count >= MAX_RETRIES)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.items.clear();
        self.persist()
    }

    pub fn clear_failed(&mut self) -> Result<()> {
        self.items.retain(|i| i.retry_count < MAX_RETRIES);
        self.persist()
    }

    /// Write the whole queue file atomically and fsync before returning.
    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }

        let file = QueueFile {
            items: self.items.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let tmp_path = self.path.with_extension("tmp");
        let mut tmp = std::fs::File::create(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        tmp.write_all(json.as_bytes())?;
        tmp.sync_all()?;
        drop(tmp);

        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename into {}", self.path.display()))?;
        Ok(())
    }
}
