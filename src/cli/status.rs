//! CLI `status` command — plain-text report of the poller and sync lag.

use anyhow::Result;

use crate::config;
use crate::lifecycle;
use crate::sync::queue::RetryQueue;
use crate::sync::watermark::WatermarkStore;

pub fn status() -> Result<()> {
    let data_dir = config::data_dir();

    match lifecycle::poller_running(&data_dir)? {
        Some(info) => {
            println!("Sync poller:   running (pid {})", info.pid);
            println!("Started at:    {}", info.started_at);
        }
        None => println!("Sync poller:   not running"),
    }

    let watermarks = WatermarkStore::new(config::watermark_path(&data_dir));
    match watermarks.load()? {
        Some(wm) => {
            println!(
                "Watermark:     observations {}, summaries {}",
                wm.last_observation_id, wm.last_summary_id
            );
            println!("Last synced:   {}", wm.updated_at);
        }
        None => println!("Watermark:     not yet seeded (poller has not connected)"),
    }

    let queue = RetryQueue::open(config::queue_path(&data_dir))?;
    println!(
        "Retry queue:   {} pending, {} dead-lettered",
        queue.retry_items().len(),
        queue.failed_items().len()
    );

    Ok(())
}
