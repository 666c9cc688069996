//! Persisted sync watermark: the last confirmed-synced id per record type.
//!
//! The watermark is the crash-recovery resume point. It only advances after
//! a batch reports zero failures, so the next poll cycle re-reads anything
//! that was not fully confirmed. Writes are whole-file atomic (temp file +
//! rename) so readers never observe a partial state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    pub last_observation_id: i64,
    pub last_summary_id: i64,
    /// ISO 8601 timestamp of the last save.
    pub updated_at: String,
}

/// File-backed store for a single [`Watermark`] tuple.
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the persisted watermark.
    ///
    /// Absence and parse failure both return `None`; the caller falls back
    /// to the first-run seed policy. A parse failure is logged since it
    /// means re-seeding will skip any rows written since the last good save.
    pub fn load(&self) -> Result<Option<Watermark>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to read watermark file {}", self.path.display())
                })
            }
        };

        match serde_json::from_str(&contents) {
            Ok(watermark) => Ok(Some(watermark)),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "watermark file is unreadable, falling back to seed"
                );
                Ok(None)
            }
        }
    }

    /// Overwrite the persisted tuple atomically, stamping `updatedAt`.
    pub fn save(&self, last_observation_id: i64, last_summary_id: i64) -> Result<Watermark> {
        let watermark = Watermark {
            last_observation_id,
            last_summary_id,
            updated_at: chrono::Utc::now().to_rfc3339(),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(&watermark)?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, json)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename into {}", self.path.display()))?;

        Ok(watermark)
    }
}
