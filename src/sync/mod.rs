//! The sync subsystem: watermark store, durable retry queue, remote push
//! client, and the change poller that drives them.

pub mod client;
pub mod poller;
pub mod queue;
pub mod types;
pub mod watermark;
