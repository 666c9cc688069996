//! CLI `queue` commands — inspect and prune the durable retry queue.
//!
//! Dead-lettered items are never retried automatically; this is the manual
//! intervention surface for them.

use anyhow::Result;

use crate::config;
use crate::sync::queue::{QueueItem, RetryQueue, MAX_RETRIES};

fn open_queue() -> Result<RetryQueue> {
    let data_dir = config::data_dir();
    RetryQueue::open(config::queue_path(&data_dir))
}

pub fn list() -> Result<()> {
    let queue = open_queue()?;
    if queue.is_empty() {
        println!("Retry queue is empty.");
        return Ok(());
    }

    let pending = queue.retry_items();
    let failed = queue.failed_items();

    if !pending.is_empty() {
        println!("Pending ({} of {} attempts used):", pending.len(), MAX_RETRIES);
        for item in &pending {
            print_item(item);
        }
    }

    if !failed.is_empty() {
        println!("Dead-lettered (retry budget exhausted):");
        for item in &failed {
            print_item(item);
        }
        println!();
        println!("Dead-lettered items are never retried automatically.");
        println!("Run `memrelay queue clear-failed` to drop them.");
    }

    Ok(())
}

fn print_item(item: &QueueItem) {
    let title = item.observation.title.as_deref().unwrap_or("(untitled)");
    println!(
        "  #{:<8} retries {}/{}  added {}  {}",
        item.id, item.retry_count, MAX_RETRIES, item.added_at, title
    );
}

pub fn clear() -> Result<()> {
    let mut queue = open_queue()?;
    let count = queue.len();
    queue.clear()?;
    println!("Cleared {count} queued item(s).");
    Ok(())
}

pub fn clear_failed() -> Result<()> {
    let mut queue = open_queue()?;
    let count = queue.failed_items().len();
    queue.clear_failed()?;
    println!("Cleared {count} dead-lettered item(s).");
    Ok(())
}
