//! Shared SQLite connection tuning
//!
//! Every connection opened by the store goes through here so the writer and
//! the reader agree on journal mode and timeouts.

use rusqlite::Connection;
use std::time::Duration;

/// Busy timeout applied to every connection
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pages between automatic WAL checkpoints
pub const WAL_AUTOCHECKPOINT_PAGES: i64 = 1000;

/// Apply the standard PRAGMA set for a file-backed database
///
/// WAL lets the query connection read while ingestion writes. Pragmas that
/// echo their new value go through `pragma_update_and_check`.
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;

    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        log::warn!("⚠️  SQLite refused WAL mode, running with journal_mode={}", mode);
    }

    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    let _: i64 = conn.pragma_update_and_check(
        None,
        "wal_autocheckpoint",
        WAL_AUTOCHECKPOINT_PAGES,
        |row| row.get(0),
    )?;

    Ok(())
}

/// Minimal PRAGMA set for `:memory:` databases (no WAL available)
pub fn apply_memory_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_wal_enabled_on_file_database() {
        let dir = tempdir().unwrap();
        let conn = Connection::open(dir.path().join("pragma.db")).unwrap();
        apply_optimized_pragmas(&conn).unwrap();

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");

        let checkpoint: i64 = conn
            .query_row("PRAGMA wal_autocheckpoint", [], |row| row.get(0))
            .unwrap();
        assert_eq!(checkpoint, WAL_AUTOCHECKPOINT_PAGES);
    }

    #[test]
    fn test_memory_pragmas() {
        let conn = Connection::open_in_memory().unwrap();
        apply_memory_pragmas(&conn).unwrap();
        let temp_store: i64 = conn
            .query_row("PRAGMA temp_store", [], |row| row.get(0))
            .unwrap();
        assert_eq!(temp_store, 2);
    }
}
