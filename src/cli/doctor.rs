//! CLI `doctor` command — run sync diagnostics and print a health report.

use anyhow::Result;

use crate::config::{self, SyncConfig};
use crate::db;
use crate::lifecycle;
use crate::sync::client::SyncClient;
use crate::sync::queue::RetryQueue;
use crate::sync::watermark::WatermarkStore;

pub async fn doctor() -> Result<()> {
    let data_dir = config::data_dir();

    println!("Memrelay Health Report");
    println!("======================");
    println!();

    let config_path = config::resolve_config_path();
    let config = match &config_path {
        Some(path) => {
            println!("Config:            {}", path.display());
            SyncConfig::load_from(path)?
        }
        None => {
            println!("Config:            not found");
            println!(
                "                   expected {} or {}",
                config::user_config_path().display(),
                config::legacy_config_path().display()
            );
            SyncConfig::default()
        }
    };
    println!(
        "Sync enabled:      {}",
        if config.sync_enabled { "yes" } else { "no" }
    );
    println!(
        "Server URL:        {}",
        if config.server_url.is_empty() {
            "(not set)"
        } else {
            &config.server_url
        }
    );
    println!(
        "API key:           {}",
        if config.api_key.is_empty() {
            "(not set)"
        } else {
            "set"
        }
    );
    if let Some(role) = &config.role {
        println!("Role:              {role}");
    }
    println!("Poll interval:     {} ms", config.poll_interval_ms());
    println!();

    match lifecycle::poller_running(&data_dir)? {
        Some(info) => println!("Poller:            running (pid {}, since {})", info.pid, info.started_at),
        None => println!("Poller:            not running"),
    }
    println!();

    let db_path = config::db_path();
    if db_path.exists() {
        println!("Database:          {}", db_path.display());
        let conn = db::open_readonly(&db_path)?;
        let observations = db::queries::max_observation_id(&conn)?;
        let summaries = db::queries::max_summary_id(&conn)?;
        println!("  Observations:    up to id {observations}");
        println!("  Summaries:       up to id {summaries}");
    } else {
        println!("Database:          not found at {}", db_path.display());
        println!("                   the poller waits for the upstream application to create it");
    }
    println!();

    let watermarks = WatermarkStore::new(config::watermark_path(&data_dir));
    match watermarks.load()? {
        Some(wm) => println!(
            "Watermark:         observations {}, summaries {} (updated {})",
            wm.last_observation_id, wm.last_summary_id, wm.updated_at
        ),
        None => println!("Watermark:         not yet seeded"),
    }

    let queue = RetryQueue::open(config::queue_path(&data_dir))?;
    println!(
        "Retry queue:       {} pending, {} dead-lettered",
        queue.retry_items().len(),
        queue.failed_items().len()
    );
    println!();

    if config.is_configured() {
        let client = SyncClient::new(config);
        match client.check_health().await {
            Ok(()) => println!("Remote service:    reachable"),
            Err(e) => {
                println!("Remote service:    UNREACHABLE ({e})");
                println!();
                println!("Recovery steps:");
                println!("  1. Check the server URL and API key in the config file");
                println!("  2. Verify the service is up: curl {}/api/health", client.config().server_url.trim_end_matches('/'));
            }
        }
    } else {
        println!("Remote service:    skipped (sync not configured)");
    }

    Ok(())
}
