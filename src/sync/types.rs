//! Wire record types for the push endpoint.
//!
//! Field names and shapes mirror the upstream database schema; the remote
//! service accepts them verbatim inside `{"observations": [...]}` or
//! `{"summaries": [...]}` batch bodies.

use serde::{Deserialize, Serialize};

/// Empty-array sentinel for absent serialized-list columns.
pub const EMPTY_LIST: &str = "[]";

/// An immutable observation produced by the upstream application.
///
/// The `facts`, `concepts`, and `files` fields carry JSON-serialized arrays
/// as opaque strings; absent columns default to [`EMPTY_LIST`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    /// Monotonic primary key assigned by the local database.
    pub id: i64,
    /// Observation type tag (e.g. `"decision"`, `"bugfix"`).
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    /// Narrative body text.
    pub text: Option<String>,
    /// Owning project name.
    pub project: Option<String>,
    pub facts: String,
    pub concepts: String,
    pub files: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// Creation time in epoch seconds.
    pub created_at_epoch: i64,
    pub prompt_number: i64,
    pub tokens: i64,
    /// Numeric session reference resolved via the `sdk_sessions` side table.
    pub session_id: i64,
}

/// End-of-session summary, synced as a parallel stream to observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub id: i64,
    pub request: Option<String>,
    pub investigated: Option<String>,
    pub learned: Option<String>,
    pub completed: Option<String>,
    pub next_steps: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub created_at_epoch: i64,
    pub session_id: i64,
}

/// Outcome of syncing a single observation.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Outcome of syncing a batch: per-record success/failure tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub synced: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(id: i64) -> ObservationRecord {
        ObservationRecord {
            id,
            kind: "decision".into(),
            title: Some("Chose rusqlite".into()),
            subtitle: None,
            text: Some("Bundled SQLite keeps the install simple".into()),
            project: Some("memrelay".into()),
            facts: r#"["bundled sqlite"]"#.into(),
            concepts: EMPTY_LIST.into(),
            files: EMPTY_LIST.into(),
            created_at: "2026-08-04T12:00:00Z".into(),
            created_at_epoch: 1_786_190_400,
            prompt_number: 3,
            tokens: 180,
            session_id: 1,
        }
    }

    #[test]
    fn observation_serializes_type_tag() {
        let json = serde_json::to_value(observation(7)).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["type"], "decision");
        assert_eq!(json["facts"], r#"["bundled sqlite"]"#);
        // `kind` is an internal name only
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn observation_round_trips() {
        let record = observation(42);
        let json = serde_json::to_string(&record).unwrap();
        let back: ObservationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
