mod cli;
mod config;
mod db;
mod lifecycle;
mod sync;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "memrelay",
    version,
    about = "Sync daemon bridging a local agent observation log to a remote memory service"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the background sync poller
    Start,
    /// Stop the background sync poller
    Stop,
    /// Report poller, watermark, and retry queue state
    Status,
    /// Run the poller in the foreground (spawned by `start`)
    #[command(hide = true)]
    Run,
    /// Run sync diagnostics and print a health report
    Doctor,
    /// Inspect or prune the durable retry queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// List pending and dead-lettered items
    List,
    /// Drop every queued item
    Clear,
    /// Drop only dead-lettered items
    ClearFailed,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Log to stderr; the detached poller's stderr is redirected to the log
    // file by `start`.
    let filter =
        EnvFilter::try_from_env("MEMRELAY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = config::data_dir();

    match cli.command {
        Command::Start => {
            let sync_config = config::SyncConfig::load()?;
            match lifecycle::start(&data_dir, &sync_config)? {
                lifecycle::StartStatus::Started(pid) => {
                    println!(
                        "{}",
                        json!({
                            "status": "started",
                            "pid": pid,
                            "log": config::log_path(&data_dir).display().to_string(),
                        })
                    );
                }
                lifecycle::StartStatus::AlreadyRunning(pid) => {
                    println!("{}", json!({ "status": "already-running", "pid": pid }));
                }
            }
        }
        Command::Stop => match lifecycle::stop(&data_dir)? {
            lifecycle::StopStatus::Stopped(pid) => {
                println!("{}", json!({ "status": "stopped", "pid": pid }));
            }
            lifecycle::StopStatus::NotRunning => {
                println!("{}", json!({ "status": "not-running" }));
            }
        },
        Command::Status => cli::status::status()?,
        Command::Run => cli::run::run().await?,
        Command::Doctor => cli::doctor::doctor().await?,
        Command::Queue { action } => match action {
            QueueAction::List => cli::queue::list()?,
            QueueAction::Clear => cli::queue::clear()?,
            QueueAction::ClearFailed => cli::queue::clear_failed()?,
        },
    }

    Ok(())
}
