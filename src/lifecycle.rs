//! Poller process lifecycle: spawn, probe, stop.
//!
//! Exactly one poller may run per data directory, because the watermark and
//! queue files have no multi-writer protocol. The guarantee comes from an
//! OS advisory lock: the poller acquires an exclusive lock on `sync.lock`
//! at startup and holds it for its lifetime. Liveness probing attempts the
//! same lock — if it can be taken, the recorded owner is dead and stale
//! files are cleaned up. The PID file exists for reporting and signalling,
//! not for mutual exclusion.

use anyhow::{bail, ensure, Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{info, warn};

use crate::config::{self, SyncConfig};

/// Contents of the PID file describing the running poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PidInfo {
    pub pid: u32,
    /// ISO 8601 timestamp of the spawn.
    pub started_at: String,
    /// Directory of the binary that spawned the poller.
    pub plugin_root: String,
}

/// Result of a `start` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStatus {
    Started(u32),
    AlreadyRunning(u32),
}

/// Result of a `stop` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStatus {
    Stopped(u32),
    NotRunning,
}

/// Acquire the exclusive poller lock, held for the process lifetime.
///
/// Called by the `run` worker before it touches the watermark or queue
/// files. The returned handle must be kept alive; dropping it releases the
/// lock.
pub fn acquire_lock(data_dir: &Path) -> Result<File> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create directory {}", data_dir.display()))?;

    let path = config::lock_path(data_dir);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&path)
        .with_context(|| format!("failed to open lock file {}", path.display()))?;

    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(ref e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
            bail!("another sync poller already holds {}", path.display())
        }
        Err(e) => Err(e).with_context(|| format!("failed to lock {}", path.display())),
    }
}

/// True when a live poller holds the lock.
fn lock_is_held(data_dir: &Path) -> Result<bool> {
    let path = config::lock_path(data_dir);
    if !path.exists() {
        return Ok(false);
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("failed to open lock file {}", path.display()))?;

    match file.try_lock_exclusive() {
        Ok(()) => {
            let _ = FileExt::unlock(&file);
            Ok(false)
        }
        Err(ref e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(true),
        Err(e) => Err(e).with_context(|| format!("failed to probe lock {}", path.display())),
    }
}

/// Detect a running poller. Cleans up a stale PID file as a side effect
/// when the lock turns out to be free.
pub fn poller_running(data_dir: &Path) -> Result<Option<PidInfo>> {
    let pid_file = config::pid_path(data_dir);

    if !lock_is_held(data_dir)? {
        if pid_file.exists() {
            info!(path = %pid_file.display(), "removing stale PID file");
            let _ = std::fs::remove_file(&pid_file);
        }
        return Ok(None);
    }

    // Lock held but PID file unreadable means the poller is still starting
    // up; report not-yet-running rather than a half-truth.
    Ok(read_pid_file(&pid_file))
}

/// Spawn the poller as a detached background process.
///
/// Validates the config up front, refuses when a live poller holds the
/// lock, redirects the child's stdout/stderr to the log file, writes the
/// PID file, and returns without waiting on the child.
pub fn start(data_dir: &Path, config: &SyncConfig) -> Result<StartStatus> {
    ensure!(
        config.sync_enabled,
        "sync is disabled — set syncEnabled to true in the config before starting"
    );
    ensure!(
        !config.api_key.is_empty() && !config.server_url.is_empty(),
        "sync config is missing apiKey or serverUrl"
    );

    if let Some(info) = poller_running(data_dir)? {
        return Ok(StartStatus::AlreadyRunning(info.pid));
    }

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create directory {}", data_dir.display()))?;

    let exe = std::env::current_exe().context("failed to resolve current executable")?;
    let log_path = config::log_path(data_dir);
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let mut command = Command::new(&exe);
    command
        .arg("run")
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log));

    // Detach from the controlling terminal's process group so a ctrl-c in
    // the shell does not reach the poller.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command
        .spawn()
        .with_context(|| format!("failed to spawn poller ({})", exe.display()))?;

    let info = PidInfo {
        pid: child.id(),
        started_at: chrono::Utc::now().to_rfc3339(),
        plugin_root: exe
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
    };
    write_pid_file(data_dir, &info)?;

    info!(pid = info.pid, log = %log_path.display(), "poller started");
    Ok(StartStatus::Started(info.pid))
}

/// Signal the recorded poller to stop. The PID file is deleted regardless
/// of signal outcome; the lock is released by the exiting process itself.
pub fn stop(data_dir: &Path) -> Result<StopStatus> {
    let pid_file = config::pid_path(data_dir);
    let info = read_pid_file(&pid_file);
    let running = lock_is_held(data_dir)?;

    let status = match info {
        Some(info) if running => {
            terminate(info.pid)?;
            StopStatus::Stopped(info.pid)
        }
        _ => StopStatus::NotRunning,
    };

    let _ = std::fs::remove_file(&pid_file);
    Ok(status)
}

#[cfg(unix)]
fn terminate(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => Ok(()),
        // Exited between probe and signal
        Err(nix::errno::Errno::ESRCH) => {
            warn!(pid, "poller exited before it could be signalled");
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("failed to signal pid {pid}")),
    }
}

#[cfg(not(unix))]
fn terminate(_pid: u32) -> Result<()> {
    bail!("stopping the poller is only supported on unix")
}

/// Rewrite the PID file with the worker's own identity once the lock is
/// held. Makes the recorded pid authoritative even if the spawning CLI
/// raced or died.
pub fn write_own_pid(data_dir: &Path) -> Result<()> {
    let exe = std::env::current_exe().context("failed to resolve current executable")?;
    let info = PidInfo {
        pid: std::process::id(),
        started_at: chrono::Utc::now().to_rfc3339(),
        plugin_root: exe
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
    };
    write_pid_file(data_dir, &info)
}

/// Delete the PID file (graceful worker exit).
pub fn remove_pid_file(data_dir: &Path) {
    let _ = std::fs::remove_file(config::pid_path(data_dir));
}

fn write_pid_file(data_dir: &Path, info: &PidInfo) -> Result<()> {
    let path = config::pid_path(data_dir);
    let json = serde_json::to_string_pretty(info)?;
    std::fs::write(&path, json)
        .with_context(|| format!("failed to write PID file {}", path.display()))
}

fn read_pid_file(path: &Path) -> Option<PidInfo> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}
