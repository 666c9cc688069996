//! Polling queries over the upstream tables.
//!
//! Two independent streams are tracked: `observations` and
//! `session_summaries`, each keyed by a monotonic integer primary key. Rows
//! are returned in ascending id order so the watermark can advance to the
//! batch maximum. The string session identifier is resolved to a numeric
//! reference through the `sdk_sessions` side table; rows without a match
//! fall back to session reference `1`.

use anyhow::Result;
use rusqlite::{params, Connection, Row};

use crate::sync::types::{ObservationRecord, SummaryRecord, EMPTY_LIST};

/// Observations with `id > after_id`, ascending.
pub fn observations_after(conn: &Connection, after_id: i64) -> Result<Vec<ObservationRecord>> {
    let mut stmt = conn.prepare(
        "SELECT o.id, o.type, o.title, o.subtitle, o.text, o.project, \
                o.facts, o.concepts, o.files, o.created_at, o.created_at_epoch, \
                o.prompt_number, o.tokens, COALESCE(s.id, 1) \
         FROM observations o \
         LEFT JOIN sdk_sessions s ON s.memory_session_id = o.memory_session_id \
         WHERE o.id > ?1 \
         ORDER BY o.id ASC",
    )?;

    let records = stmt
        .query_map(params![after_id], |row| map_observation(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Session summaries with `id > after_id`, ascending.
pub fn summaries_after(conn: &Connection, after_id: i64) -> Result<Vec<SummaryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.request, m.investigated, m.learned, m.completed, \
                m.next_steps, m.notes, m.created_at, m.created_at_epoch, \
                COALESCE(s.id, 1) \
         FROM session_summaries m \
         LEFT JOIN sdk_sessions s ON s.memory_session_id = m.memory_session_id \
         WHERE m.id > ?1 \
         ORDER BY m.id ASC",
    )?;

    let records = stmt
        .query_map(params![after_id], |row| map_summary(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Highest observation id, or 0 for an empty table. First-run watermark seed.
pub fn max_observation_id(conn: &Connection) -> Result<i64> {
    let id = conn.query_row("SELECT COALESCE(MAX(id), 0) FROM observations", [], |row| {
        row.get(0)
    })?;
    Ok(id)
}

/// Highest session summary id, or 0 for an empty table.
pub fn max_summary_id(conn: &Connection) -> Result<i64> {
    let id = conn.query_row(
        "SELECT COALESCE(MAX(id), 0) FROM session_summaries",
        [],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn map_observation(row: &Row) -> rusqlite::Result<ObservationRecord> {
    Ok(ObservationRecord {
        id: row.get(0)?,
        kind: row
            .get::<_, Option<String>>(1)?
            .unwrap_or_else(|| "observation".into()),
        title: row.get(2)?,
        subtitle: row.get(3)?,
        text: row.get(4)?,
        project: row.get(5)?,
        facts: serialized_list(row.get(6)?),
        concepts: serialized_list(row.get(7)?),
        files: serialized_list(row.get(8)?),
        created_at: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
        created_at_epoch: row.get::<_, Option<i64>>(10)?.unwrap_or(0),
        prompt_number: row.get::<_, Option<i64>>(11)?.unwrap_or(0),
        tokens: row.get::<_, Option<i64>>(12)?.unwrap_or(0),
        session_id: row.get(13)?,
    })
}

fn map_summary(row: &Row) -> rusqlite::Result<SummaryRecord> {
    Ok(SummaryRecord {
        id: row.get(0)?,
        request: row.get(1)?,
        investigated: row.get(2)?,
        learned: row.get(3)?,
        completed: row.get(4)?,
        next_steps: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        created_at_epoch: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
        session_id: row.get(9)?,
    })
}

/// Serialized-array columns default to the empty-array sentinel.
fn serialized_list(value: Option<String>) -> String {
    value.unwrap_or_else(|| EMPTY_LIST.into())
}
