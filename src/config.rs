//! Sync configuration and on-disk paths.
//!
//! The config file is JSON, written by the host application's setup flow and
//! only consumed here. Resolution prefers the canonical user-level path
//! (`~/.memrelay/sync.json`) and falls back to the legacy project-level path
//! (`./.memrelay/sync.json`).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

#[derive(Debug, Deserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// API key sent as the `X-API-Key` header on every push.
    pub api_key: String,
    /// Base URL of the remote memory service.
    pub server_url: String,
    /// Master switch — when false, every sync operation short-circuits.
    pub sync_enabled: bool,
    /// Poll interval in milliseconds.
    pub poll_interval: u64,
    /// Informational role label written by the setup flow; not interpreted.
    pub role: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            server_url: String::new(),
            sync_enabled: false,
            poll_interval: DEFAULT_POLL_INTERVAL_MS,
            role: None,
        }
    }
}

impl SyncConfig {
    /// Load config from the resolved path, or defaults (sync disabled) when
    /// no config file exists anywhere.
    pub fn load() -> Result<Self> {
        match resolve_config_path() {
            Some(path) => Self::load_from(path),
            None => {
                info!("no sync config found, sync disabled");
                Ok(SyncConfig::default())
            }
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config JSON {}", path.display()))
    }

    /// True when sync is enabled and both the API key and server URL are set.
    pub fn is_configured(&self) -> bool {
        self.sync_enabled && !self.api_key.is_empty() && !self.server_url.is_empty()
    }

    /// Poll interval with a 100ms floor; a zeroed config must not spin.
    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval.max(100)
    }
}

/// Returns `~/.memrelay/`, overridable via `MEMRELAY_DIR`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MEMRELAY_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".memrelay")
}

/// Canonical user-level config path: `~/.memrelay/sync.json`.
pub fn user_config_path() -> PathBuf {
    data_dir().join("sync.json")
}

/// Legacy project-level config path: `./.memrelay/sync.json`.
pub fn legacy_config_path() -> PathBuf {
    PathBuf::from(".memrelay").join("sync.json")
}

/// First existing config path, canonical before legacy.
pub fn resolve_config_path() -> Option<PathBuf> {
    let user = user_config_path();
    if user.exists() {
        return Some(user);
    }
    let legacy = legacy_config_path();
    if legacy.exists() {
        return Some(legacy);
    }
    None
}

/// Path of the upstream observation database, overridable via `MEMRELAY_DB`.
pub fn db_path() -> PathBuf {
    if let Ok(path) = std::env::var("MEMRELAY_DB") {
        return PathBuf::from(path);
    }
    data_dir().join("memory.db")
}

/// Watermark file: last confirmed-synced ids per record type.
pub fn watermark_path(data_dir: &Path) -> PathBuf {
    data_dir.join("sync-watermark.json")
}

/// Durable retry queue file.
pub fn queue_path(data_dir: &Path) -> PathBuf {
    data_dir.join("sync-queue.json")
}

/// PID file describing the running poller.
pub fn pid_path(data_dir: &Path) -> PathBuf {
    data_dir.join("sync.pid.json")
}

/// Advisory lock file held by the poller for its lifetime.
pub fn lock_path(data_dir: &Path) -> PathBuf {
    data_dir.join("sync.lock")
}

/// Log file the detached poller's stdout/stderr are appended to.
pub fn log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("sync.log")
}
