//! HTTP transport to the remote memory service's push endpoint.
//!
//! The client is stateless per call: each operation POSTs a batch body to
//! `{serverUrl}/api/sync/push` with the API key header and a per-call
//! timeout, and routes failures into the [`RetryQueue`]. Timeouts differ by
//! shape — single-record and status operations get 30 s, batch operations
//! 60 s because the server generates embeddings before acknowledging.

use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{self, SyncConfig};

use super::queue::RetryQueue;
use super::types::{BatchOutcome, ObservationRecord, SummaryRecord, SyncOutcome};

const API_KEY_HEADER: &str = "X-API-Key";
const SINGLE_TIMEOUT: Duration = Duration::from_secs(30);
const BATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest error-body excerpt carried into logs and queue diagnostics.
const MAX_ERROR_BODY: usize = 200;

/// A push failure, classified for retry policy.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// Sync is disabled or the API key / server URL is missing.
    #[error("sync is not configured")]
    NotConfigured,
    /// The server answered with a non-2xx status.
    #[error("server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    /// The request never produced a response (timeout, refused, DNS).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl PushError {
    /// Permanent rejections will never succeed on retry and are
    /// dead-lettered immediately: 4xx except 408 (timeout) and 429
    /// (rate limit).
    pub fn is_permanent(&self) -> bool {
        match self {
            PushError::Status { status, .. } => {
                status.is_client_error()
                    && *status != reqwest::StatusCode::REQUEST_TIMEOUT
                    && *status != reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

/// Per-record outcome counts the server reports for an accepted batch.
#[derive(Debug, Default, Deserialize)]
struct PushCounts {
    #[serde(default)]
    inserted: u64,
    #[serde(default)]
    updated: u64,
}

#[derive(Debug, Default, Deserialize)]
struct PushResponse {
    observations: Option<PushCounts>,
    summaries: Option<PushCounts>,
}

/// Client for the remote push endpoint.
pub struct SyncClient {
    http: reqwest::Client,
    config: SyncConfig,
    config_path: Option<PathBuf>,
}

impl SyncClient {
    /// Build a client around an already-loaded config (dependency
    /// injection; `reload_config` becomes a no-op refresh of the same
    /// values unless a path is known).
    pub fn new(config: SyncConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            config_path: None,
        }
    }

    /// Build a client from the resolved config path (canonical user-level
    /// path preferred, legacy project-level fallback).
    pub fn from_resolved_config() -> anyhow::Result<Self> {
        let config_path = config::resolve_config_path();
        let config = match &config_path {
            Some(path) => SyncConfig::load_from(path)?,
            None => SyncConfig::default(),
        };
        Ok(Self {
            http: reqwest::Client::new(),
            config,
            config_path,
        })
    }

    /// Re-read the config file this client was constructed from.
    pub fn reload_config(&mut self) -> anyhow::Result<()> {
        if let Some(path) = &self.config_path {
            self.config = SyncConfig::load_from(path)?;
        }
        Ok(())
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn push_url(&self) -> String {
        format!(
            "{}/api/sync/push",
            self.config.server_url.trim_end_matches('/')
        )
    }

    /// POST a batch body; the only network path in this module.
    async fn push(
        &self,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<PushResponse, PushError> {
        if !self.is_configured() {
            return Err(PushError::NotConfigured);
        }

        let response = self
            .http
            .post(self.push_url())
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(body)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(PushError::Status { status, body });
        }

        // Missing or malformed counts are tolerated; the caller falls back
        // to the batch size.
        Ok(response.json().await.unwrap_or_default())
    }

    /// Push a single observation as a one-element batch.
    ///
    /// Failures are enqueued: transient errors into the retry partition,
    /// permanent rejections straight to dead-letter.
    pub async fn sync_observation(
        &self,
        record: &ObservationRecord,
        queue: &mut RetryQueue,
    ) -> SyncOutcome {
        match self
            .push(&json!({ "observations": [record] }), SINGLE_TIMEOUT)
            .await
        {
            Ok(_) => SyncOutcome::ok(),
            Err(PushError::NotConfigured) => SyncOutcome::failed("sync is not configured"),
            Err(e) => {
                let enqueue = if e.is_permanent() {
                    queue.add_dead_letter(record)
                } else {
                    queue.add(record)
                };
                if let Err(qe) = enqueue {
                    warn!(id = record.id, error = %qe, "failed to persist retry queue");
                }
                SyncOutcome::failed(e.to_string())
            }
        }
    }

    /// Push a batch of observations.
    ///
    /// On a non-2xx response the batch degrades to per-record sync so one
    /// bad record cannot silently fail the rest. On a transport error the
    /// batch is treated as atomically lost — the client cannot know what
    /// the server received — and every record is enqueued.
    pub async fn sync_batch(
        &self,
        records: &[ObservationRecord],
        queue: &mut RetryQueue,
    ) -> BatchOutcome {
        if records.is_empty() {
            return BatchOutcome::default();
        }

        match self
            .push(&json!({ "observations": records }), BATCH_TIMEOUT)
            .await
        {
            Ok(response) => reconcile(response.observations.as_ref(), records.len()),
            Err(PushError::NotConfigured) => {
                debug!("sync not configured, skipping batch");
                BatchOutcome {
                    synced: 0,
                    failed: records.len(),
                }
            }
            Err(PushError::Status { status, body }) => {
                warn!(%status, body = %body, "batch push rejected, retrying records individually");
                let mut outcome = BatchOutcome::default();
                for record in records {
                    if self.sync_observation(record, queue).await.success {
                        outcome.synced += 1;
                    } else {
                        outcome.failed += 1;
                    }
                }
                outcome
            }
            Err(e) => {
                warn!(error = %e, count = records.len(), "batch lost in transit, queueing all records");
                for record in records {
                    if let Err(qe) = queue.add(record) {
                        warn!(id = record.id, error = %qe, "failed to persist retry queue");
                    }
                }
                BatchOutcome {
                    synced: 0,
                    failed: records.len(),
                }
            }
        }
    }

    /// Push a batch of session summaries.
    ///
    /// Summaries are not enqueued on failure: the queue format is
    /// observation-typed and a failed batch is re-read on the next cycle
    /// because the summary watermark does not advance.
    pub async fn sync_summaries(&self, records: &[SummaryRecord]) -> BatchOutcome {
        if records.is_empty() {
            return BatchOutcome::default();
        }

        match self
            .push(&json!({ "summaries": records }), BATCH_TIMEOUT)
            .await
        {
            Ok(response) => reconcile(response.summaries.as_ref(), records.len()),
            Err(e) => {
                warn!(error = %e, count = records.len(), "summary batch failed");
                BatchOutcome {
                    synced: 0,
                    failed: records.len(),
                }
            }
        }
    }

    /// Drain retry-eligible queue items, one record per request.
    ///
    /// Success removes the item; a transient failure bumps its retry count;
    /// a permanent rejection dead-letters it. Returns the number of newly
    /// synced items.
    pub async fn retry_pending(&self, queue: &mut RetryQueue) -> usize {
        let items = queue.retry_items();
        if items.is_empty() {
            return 0;
        }

        let mut synced = 0;
        for item in items {
            match self
                .push(&json!({ "observations": [&item.observation] }), SINGLE_TIMEOUT)
                .await
            {
                Ok(_) => {
                    if let Err(e) = queue.remove(item.id) {
                        warn!(id = item.id, error = %e, "failed to persist retry queue");
                    }
                    synced += 1;
                }
                Err(PushError::NotConfigured) => break,
                Err(e) => {
                    let update = if e.is_permanent() {
                        warn!(id = item.id, error = %e, "permanent rejection, dead-lettering");
                        queue.dead_letter(item.id)
                    } else {
                        debug!(id = item.id, error = %e, "retry attempt failed");
                        queue.increment_retry(item.id)
                    };
                    if let Err(qe) = update {
                        warn!(id = item.id, error = %qe, "failed to persist retry queue");
                    }
                }
            }
        }
        synced
    }

    /// Probe the remote service's health endpoint (used by `doctor`).
    pub async fn check_health(&self) -> Result<(), PushError> {
        if !self.is_configured() {
            return Err(PushError::NotConfigured);
        }

        let url = format!(
            "{}/api/health",
            self.config.server_url.trim_end_matches('/')
        );
        let response = self
            .http
            .get(url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .timeout(SINGLE_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(PushError::Status { status, body });
        }
        Ok(())
    }
}

/// Synced count from the server's `inserted + updated` figures when
/// present, else the full batch size (the server is allowed to omit
/// counts).
fn reconcile(counts: Option<&PushCounts>, batch_len: usize) -> BatchOutcome {
    let synced = counts
        .map(|c| (c.inserted + c.updated) as usize)
        .unwrap_or(batch_len)
        .min(batch_len);
    BatchOutcome {
        synced,
        failed: batch_len - synced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::EMPTY_LIST;
    use tempfile::TempDir;

    fn observation(id: i64) -> ObservationRecord {
        ObservationRecord {
            id,
            kind: "observation".into(),
            title: None,
            subtitle: None,
            text: None,
            project: None,
            facts: EMPTY_LIST.into(),
            concepts: EMPTY_LIST.into(),
            files: EMPTY_LIST.into(),
            created_at: "2026-08-04T12:00:00Z".into(),
            created_at_epoch: 1_786_190_400,
            prompt_number: 0,
            tokens: 0,
            session_id: 1,
        }
    }

    fn configured(server_url: &str) -> SyncClient {
        SyncClient::new(SyncConfig {
            api_key: "test-key".into(),
            server_url: server_url.into(),
            sync_enabled: true,
            ..SyncConfig::default()
        })
    }

    #[test]
    fn push_url_strips_trailing_slash() {
        let client = configured("https://memory.example.com/");
        assert_eq!(client.push_url(), "https://memory.example.com/api/sync/push");
    }

    #[test]
    fn status_classification() {
        let permanent = PushError::Status {
            status: reqwest::StatusCode::BAD_REQUEST,
            body: String::new(),
        };
        assert!(permanent.is_permanent());

        for retriable in [
            reqwest::StatusCode::REQUEST_TIMEOUT,
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            reqwest::StatusCode::BAD_GATEWAY,
        ] {
            let err = PushError::Status {
                status: retriable,
                body: String::new(),
            };
            assert!(!err.is_permanent(), "{retriable} should be retriable");
        }
    }

    #[test]
    fn reconcile_prefers_server_counts() {
        let counts = PushCounts {
            inserted: 2,
            updated: 1,
        };
        let outcome = reconcile(Some(&counts), 5);
        assert_eq!(outcome, BatchOutcome { synced: 3, failed: 2 });
    }

    #[test]
    fn reconcile_defaults_to_batch_size() {
        let outcome = reconcile(None, 4);
        assert_eq!(outcome, BatchOutcome { synced: 4, failed: 0 });
    }

    #[test]
    fn reload_config_rereads_the_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sync.json");
        std::fs::write(
            &path,
            r#"{"apiKey": "k1", "serverUrl": "https://a.example.com", "syncEnabled": true}"#,
        )
        .unwrap();

        let mut client = SyncClient {
            http: reqwest::Client::new(),
            config: SyncConfig::load_from(&path).unwrap(),
            config_path: Some(path.clone()),
        };
        assert_eq!(client.config().api_key, "k1");

        std::fs::write(
            &path,
            r#"{"apiKey": "k2", "serverUrl": "https://a.example.com", "syncEnabled": true}"#,
        )
        .unwrap();
        client.reload_config().unwrap();
        assert_eq!(client.config().api_key, "k2");
    }

    #[tokio::test]
    async fn unconfigured_client_short_circuits_without_enqueue() {
        let tmp = TempDir::new().unwrap();
        let mut queue = RetryQueue::open(tmp.path().join("sync-queue.json")).unwrap();
        let client = SyncClient::new(SyncConfig::default());

        let single = client.sync_observation(&observation(1), &mut queue).await;
        assert!(!single.success);
        assert_eq!(single.error.as_deref(), Some("sync is not configured"));

        let batch = client
            .sync_batch(&[observation(2), observation(3)], &mut queue)
            .await;
        assert_eq!(batch.failed, 2);
        assert_eq!(batch.synced, 0);

        // No network attempt, so nothing to retry later
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn transport_error_queues_whole_batch() {
        let tmp = TempDir::new().unwrap();
        let mut queue = RetryQueue::open(tmp.path().join("sync-queue.json")).unwrap();
        // Nothing listens on this port
        let client = configured("http://127.0.0.1:9");

        let records = [observation(11), observation(12), observation(13)];
        let outcome = client.sync_batch(&records, &mut queue).await;

        assert_eq!(outcome, BatchOutcome { synced: 0, failed: 3 });
        assert_eq!(queue.len(), 3);
        for item in queue.retry_items() {
            assert_eq!(item.retry_count, 0);
        }
    }
}
