//! Timer-driven database watcher.
//!
//! The poller diffs the upstream tables against the persisted watermark on
//! a fixed interval, pushes new rows in batch, and drains the retry queue
//! each cycle. The source database offers no change-notification
//! mechanism, so detection is timer-driven polling.
//!
//! Lifecycle: refuse to start when unconfigured; wait for the database
//! file to appear; open it read-only; restore or seed the watermark; then
//! tick until SIGINT/SIGTERM. The watermark for a record type advances
//! only when that type's batch reports zero failures, so a partially
//! failed range is re-read on the next cycle — at-least-once delivery,
//! with the server deduplicating by record id.

use anyhow::{ensure, Context, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db;

use super::client::SyncClient;
use super::queue::RetryQueue;
use super::watermark::{Watermark, WatermarkStore};

/// Re-check interval while waiting for the database file to appear.
const DB_WAIT_INTERVAL: Duration = Duration::from_secs(5);

pub struct ChangePoller {
    db_path: PathBuf,
    client: SyncClient,
    queue: RetryQueue,
    watermarks: WatermarkStore,
    poll_interval: Duration,
}

impl ChangePoller {
    pub fn new(
        db_path: impl Into<PathBuf>,
        client: SyncClient,
        queue: RetryQueue,
        watermarks: WatermarkStore,
        poll_interval: Duration,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            client,
            queue,
            watermarks,
            poll_interval,
        }
    }

    /// Run until SIGINT/SIGTERM.
    pub async fn run(mut self) -> Result<()> {
        ensure!(
            self.client.is_configured(),
            "sync is not configured (missing API key or server URL, or sync disabled) — \
             nothing to poll for"
        );

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        let conn = tokio::select! {
            conn = self.wait_for_database() => conn?,
            _ = &mut shutdown => {
                info!("shutdown requested before database appeared");
                return Ok(());
            }
        };

        let mut watermark = self.restore_watermark(&conn)?;
        info!(
            last_observation_id = watermark.last_observation_id,
            last_summary_id = watermark.last_summary_id,
            interval_ms = self.poll_interval.as_millis() as u64,
            "polling started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // A failed cycle (locked database, queue I/O) must not
                    // take the poller down; the next tick retries.
                    if let Err(e) = self.run_cycle(&conn, &mut watermark).await {
                        warn!(error = %e, "poll cycle failed");
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        self.shutdown(&watermark)
    }

    /// WAITING_FOR_DB: re-check for the database file until it exists.
    async fn wait_for_database(&self) -> Result<Connection> {
        if !self.db_path.exists() {
            info!(path = %self.db_path.display(), "database not found, waiting");
        }
        loop {
            if self.db_path.exists() {
                return db::open_readonly(&self.db_path);
            }
            tokio::time::sleep(DB_WAIT_INTERVAL).await;
        }
    }

    /// Restore the persisted watermark, or seed it from `MAX(id)` of each
    /// tracked table. Seeding means rows that existed before the first
    /// launch are not backfilled to the remote.
    pub fn restore_watermark(&self, conn: &Connection) -> Result<Watermark> {
        if let Some(watermark) = self.watermarks.load()? {
            return Ok(watermark);
        }

        let last_observation_id = db::queries::max_observation_id(conn)?;
        let last_summary_id = db::queries::max_summary_id(conn)?;
        let watermark = self
            .watermarks
            .save(last_observation_id, last_summary_id)
            .context("failed to persist seeded watermark")?;
        info!(
            last_observation_id,
            last_summary_id, "seeded watermark, existing history will not be backfilled"
        );
        Ok(watermark)
    }

    /// One poll cycle: new observations, new summaries, retry drain.
    pub async fn run_cycle(&mut self, conn: &Connection, watermark: &mut Watermark) -> Result<()> {
        let observations = db::queries::observations_after(conn, watermark.last_observation_id)?;
        if !observations.is_empty() {
            let max_id = observations.last().map(|r| r.id).unwrap_or_default();
            let outcome = self.client.sync_batch(&observations, &mut self.queue).await;
            if outcome.failed == 0 {
                *watermark = self
                    .watermarks
                    .save(max_id, watermark.last_summary_id)
                    .context("failed to persist watermark")?;
                info!(synced = outcome.synced, watermark = max_id, "observations synced");
            } else {
                // Keep the watermark at the last fully confirmed point so
                // the unsynced tail is re-read next cycle.
                warn!(
                    synced = outcome.synced,
                    failed = outcome.failed,
                    "observation batch partially failed, watermark not advanced"
                );
            }
        }

        let summaries = db::queries::summaries_after(conn, watermark.last_summary_id)?;
        if !summaries.is_empty() {
            let max_id = summaries.last().map(|r| r.id).unwrap_or_default();
            let outcome = self.client.sync_summaries(&summaries).await;
            if outcome.failed == 0 {
                *watermark = self
                    .watermarks
                    .save(watermark.last_observation_id, max_id)
                    .context("failed to persist watermark")?;
                info!(synced = outcome.synced, watermark = max_id, "summaries synced");
            } else {
                warn!(
                    synced = outcome.synced,
                    failed = outcome.failed,
                    "summary batch partially failed, watermark not advanced"
                );
            }
        }

        let retried = self.client.retry_pending(&mut self.queue).await;
        if retried > 0 {
            info!(count = retried, "drained retry queue items");
        } else {
            debug!(pending = self.queue.retry_items().len(), "nothing drained");
        }

        Ok(())
    }

    /// STOPPED: persist the resume point and surface any undelivered work.
    fn shutdown(self, watermark: &Watermark) -> Result<()> {
        self.watermarks
            .save(watermark.last_observation_id, watermark.last_summary_id)
            .context("failed to persist watermark at shutdown")?;

        let outstanding = self.queue.len();
        if outstanding > 0 {
            warn!(outstanding, "stopping with undelivered items in the retry queue");
        }
        info!("poller stopped");
        Ok(())
    }

    pub fn queue(&self) -> &RetryQueue {
        &self.queue
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
