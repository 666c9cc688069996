//! Read-only access to the upstream observation database.
//!
//! The database is owned by the upstream application; this subsystem never
//! writes to it. Connections are opened with `SQLITE_OPEN_READ_ONLY` so a
//! stray write is an error rather than a corruption risk, and a busy
//! timeout absorbs short lock windows from the concurrent writer.

pub mod queries;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// Open the upstream database read-only.
pub fn open_readonly(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open database at {}", path.display()))?;

    conn.pragma_update(None, "busy_timeout", 5000)?;

    tracing::info!(path = %path.display(), "database opened read-only");
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_readonly_rejects_writes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("memory.db");

        // Upstream writer creates the file
        let writer = Connection::open(&path).unwrap();
        writer
            .execute_batch("CREATE TABLE observations (id INTEGER PRIMARY KEY)")
            .unwrap();
        drop(writer);

        let conn = open_readonly(&path).unwrap();
        let err = conn.execute("INSERT INTO observations (id) VALUES (1)", []);
        assert!(err.is_err());
    }

    #[test]
    fn open_readonly_missing_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(open_readonly(tmp.path().join("absent.db")).is_err());
    }

    #[test]
    fn busy_timeout_is_set() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("memory.db");
        Connection::open(&path).unwrap();

        let conn = open_readonly(&path).unwrap();
        let timeout: i64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, 5000);
    }
}
