//! SQLite-backed decision logging.
//!
//! Every terminal disposition is logged with its timestamp, method, target,
//! action (allow/deny/ask-allow/ask-deny/error), and reason. The database is
//! accessed through an [`r2d2`] connection pool ([`DbPool`]) for thread-safe
//! concurrent writes from async tasks. Logging failures never affect the
//! request outcome.
//!
//! The [`export`] submodule provides JSON and CSV export.

pub mod export;

use rusqlite::Connection;

use crate::error::Result;

/// SQLite connection pool type alias (r2d2 + r2d2-sqlite).
pub type DbPool = r2d2::Pool<r2d2_sqlite::SqliteConnectionManager>;

/// Open a connection pool for the given database file path.
///
/// Creates the database and `decisions` table if they don't exist.
pub fn open_pool(path: &std::path::Path) -> Result<DbPool> {
    let manager = r2d2_sqlite::SqliteConnectionManager::file(path);
    let pool = r2d2::Pool::builder()
        .max_size(4)
        .build(manager)
        .map_err(|e| crate::error::WardenError::Proxy(e.to_string()))?;
    let conn = pool
        .get()
        .map_err(|e| crate::error::WardenError::Proxy(e.to_string()))?;
    init_db(&conn)?;
    Ok(pool)
}

/// Open an in-memory connection pool (for testing).
pub fn open_memory_pool() -> Result<DbPool> {
    let manager = r2d2_sqlite::SqliteConnectionManager::memory();
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| crate::error::WardenError::Proxy(e.to_string()))?;
    let conn = pool
        .get()
        .map_err(|e| crate::error::WardenError::Proxy(e.to_string()))?;
    init_db(&conn)?;
    Ok(pool)
}

/// A single logged decision stored in the `decisions` table.
#[derive(Debug, Clone)]
pub struct DecisionRecord {
    /// Auto-incremented row ID (`None` for new records before insert).
    pub id: Option<i64>,
    /// ISO 8601 timestamp (e.g., `"2026-08-30T10:00:00Z"`).
    pub timestamp: String,
    /// HTTP method (e.g., `"GET"`, `"CONNECT"`).
    pub method: String,
    /// Raw request target (authority or absolute URI).
    pub target: String,
    /// Decision taken: `"allow"`, `"deny"`, `"ask-allow"`, `"ask-deny"`, `"error"`.
    pub action: String,
    /// Human-readable reason for the decision.
    pub reason: String,
}

/// Initialize the SQLite database and create the decisions table if needed.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS decisions (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            method    TEXT NOT NULL,
            target    TEXT NOT NULL,
            action    TEXT NOT NULL,
            reason    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_decisions_timestamp ON decisions(timestamp);
        CREATE INDEX IF NOT EXISTS idx_decisions_target ON decisions(target);",
    )?;
    Ok(())
}

/// Log a decision to the database.
pub fn record_decision(conn: &Connection, record: &DecisionRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO decisions (timestamp, method, target, action, reason)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            record.timestamp,
            record.method,
            record.target,
            record.action,
            record.reason,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Query the most recent N decisions.
pub fn query_recent(conn: &Connection, limit: usize) -> Result<Vec<DecisionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, method, target, action, reason
         FROM decisions ORDER BY id DESC LIMIT ?1",
    )?;

    let rows = stmt.query_map(rusqlite::params![limit as i64], |row| {
        Ok(DecisionRecord {
            id: Some(row.get(0)?),
            timestamp: row.get(1)?,
            method: row.get(2)?,
            target: row.get(3)?,
            action: row.get(4)?,
            reason: row.get(5)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// Aggregated decision counts from the `decisions` table.
#[derive(Debug, Clone, Default)]
pub struct DecisionStats {
    /// Total number of logged decisions.
    pub total: usize,
    /// Requests allowed by rule.
    pub allowed: usize,
    /// Requests denied by rule (including malformed targets).
    pub denied: usize,
    /// Requests allowed through a prompt.
    pub ask_allowed: usize,
    /// Requests denied through a prompt.
    pub ask_denied: usize,
    /// Requests rejected because no decision could be obtained.
    pub errors: usize,
}

/// Query aggregated decision counts grouped by action.
pub fn query_stats(conn: &Connection) -> Result<DecisionStats> {
    let mut stmt = conn.prepare("SELECT action, COUNT(*) FROM decisions GROUP BY action")?;
    let rows = stmt.query_map([], |row| {
        let action: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok((action, count as usize))
    })?;

    let mut stats = DecisionStats::default();
    for row in rows {
        let (action, count) = row?;
        stats.total += count;
        match action.as_str() {
            "allow" => stats.allowed = count,
            "deny" => stats.denied = count,
            "ask-allow" => stats.ask_allowed = count,
            "ask-deny" => stats.ask_denied = count,
            "error" => stats.errors = count,
            _ => {} // unknown actions still count in total
        }
    }
    Ok(stats)
}

/// Open or create a SQLite database at the given path.
pub fn open_db(path: &std::path::Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    init_db(&conn)?;
    Ok(conn)
}

/// Open an in-memory SQLite database (for testing).
pub fn open_memory_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_db(&conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(target: &str, method: &str, action: &str) -> DecisionRecord {
        DecisionRecord {
            id: None,
            timestamp: "2026-08-30T10:00:00Z".to_string(),
            method: method.to_string(),
            target: target.to_string(),
            action: action.to_string(),
            reason: "test reason".to_string(),
        }
    }

    #[test]
    fn init_and_insert() {
        let conn = open_memory_db().unwrap();
        let id = record_decision(&conn, &sample("example.com:443", "CONNECT", "allow")).unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn query_recent_returns_in_desc_order() {
        let conn = open_memory_db().unwrap();
        record_decision(&conn, &sample("first.com", "GET", "allow")).unwrap();
        record_decision(&conn, &sample("second.com", "POST", "deny")).unwrap();
        record_decision(&conn, &sample("third.com", "CONNECT", "ask-allow")).unwrap();

        let records = query_recent(&conn, 2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].target, "third.com");
        assert_eq!(records[1].target, "second.com");
    }

    #[test]
    fn query_recent_with_limit_larger_than_data() {
        let conn = open_memory_db().unwrap();
        record_decision(&conn, &sample("only.com", "GET", "allow")).unwrap();
        assert_eq!(query_recent(&conn, 100).unwrap().len(), 1);
    }

    #[test]
    fn pool_concurrent_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("concurrent.db");
        let pool = open_pool(&db_path).unwrap();

        for i in 0..10 {
            let conn = pool.get().unwrap();
            record_decision(&conn, &sample(&format!("host{}.com", i), "GET", "allow")).unwrap();
        }

        let conn = pool.get().unwrap();
        assert_eq!(query_recent(&conn, 100).unwrap().len(), 10);
    }

    #[test]
    fn open_memory_pool_works() {
        let pool = open_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        record_decision(&conn, &sample("mem.com", "POST", "deny")).unwrap();
        let records = query_recent(&conn, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target, "mem.com");
    }

    #[test]
    fn query_stats_mixed_entries() {
        let conn = open_memory_db().unwrap();
        record_decision(&conn, &sample("a.com", "GET", "allow")).unwrap();
        record_decision(&conn, &sample("b.com", "GET", "allow")).unwrap();
        record_decision(&conn, &sample("c.com", "POST", "deny")).unwrap();
        record_decision(&conn, &sample("d.com", "CONNECT", "ask-allow")).unwrap();
        record_decision(&conn, &sample("e.com", "CONNECT", "ask-deny")).unwrap();
        record_decision(&conn, &sample("f.com", "GET", "error")).unwrap();
        record_decision(&conn, &sample("g.com", "GET", "deny")).unwrap();

        let stats = query_stats(&conn).unwrap();
        assert_eq!(stats.total, 7);
        assert_eq!(stats.allowed, 2);
        assert_eq!(stats.denied, 2);
        assert_eq!(stats.ask_allowed, 1);
        assert_eq!(stats.ask_denied, 1);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn query_stats_empty_db() {
        let conn = open_memory_db().unwrap();
        let stats = query_stats(&conn).unwrap();
        assert_eq!(stats.total, 0);
    }

    #[test]
    fn open_db_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let conn = open_db(&db_path).unwrap();
        record_decision(&conn, &sample("test.com", "GET", "allow")).unwrap();

        let conn2 = open_db(&db_path).unwrap();
        let records = query_recent(&conn2, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target, "test.com");
    }
}
