//! The `run` worker: assemble the sync subsystem and poll until signalled.
//!
//! Invoked by `start` as a detached child; runnable directly in the
//! foreground for debugging. All collaborators are constructed here and
//! handed to the poller — nothing in the subsystem reaches for globals.

use anyhow::Result;
use std::time::Duration;

use crate::config;
use crate::lifecycle;
use crate::sync::client::SyncClient;
use crate::sync::poller::ChangePoller;
use crate::sync::queue::RetryQueue;
use crate::sync::watermark::WatermarkStore;

pub async fn run() -> Result<()> {
    let data_dir = config::data_dir();

    // Single-instance guarantee: hold the advisory lock for the process
    // lifetime. Everything touching the watermark/queue files comes after.
    let _lock = lifecycle::acquire_lock(&data_dir)?;
    lifecycle::write_own_pid(&data_dir)?;

    let client = SyncClient::from_resolved_config()?;
    let poll_interval = Duration::from_millis(client.config().poll_interval_ms());
    let queue = RetryQueue::open(config::queue_path(&data_dir))?;
    let watermarks = WatermarkStore::new(config::watermark_path(&data_dir));

    let poller = ChangePoller::new(config::db_path(), client, queue, watermarks, poll_interval);
    let result = poller.run().await;

    lifecycle::remove_pid_file(&data_dir);
    result
}
