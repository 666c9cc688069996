//! Client-side synchronization for an agent observation log.
//!
//! Memrelay watches a local append-only SQLite database written by an
//! upstream AI-agent application and ships new rows to a remote memory
//! service over HTTP, with at-least-once delivery:
//!
//! - **Watermark** — the last confirmed-synced id per record type,
//!   persisted so polling resumes after a restart without re-sending
//!   confirmed records
//! - **Durable retry queue** — records that failed delivery survive
//!   process restarts and are retried up to a bound; exhausted items are
//!   dead-lettered for manual inspection
//! - **Change poller** — a fixed-interval watcher that diffs the database
//!   against the watermark, pushes batches, and drains the retry queue
//! - **Lifecycle** — one detached poller per data directory, enforced by
//!   an OS advisory lock and tracked via a PID file
//!
//! The database is opened strictly read-only; the upstream application is
//! its sole writer.
//!
//! # Modules
//!
//! - [`config`] — JSON sync config loading and on-disk path resolution
//! - [`db`] — read-only database access and polling queries
//! - [`sync`] — watermark store, retry queue, push client, change poller
//! - [`lifecycle`] — start/stop/probe of the background poller process

pub mod config;
pub mod db;
pub mod lifecycle;
pub mod sync;
