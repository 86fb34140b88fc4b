use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::SecondsFormat;
use rusqlite::{params, Connection};

use super::{AccessEntry, AccessLogRow, AccessQuery};

/// Maximum rows a single query returns.
const MAX_QUERY_ROWS: usize = 10_000;

fn format_timestamp(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// SQLite-backed access log.
///
/// The background writer inserts entries in batches; operators and tests read
/// them back with [`AccessLogStore::query`].
pub struct AccessLogStore {
    db: Mutex<Connection>,
}

impl AccessLogStore {
    /// Open (or create) the access log database in the given data directory.
    pub fn open(data_dir: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(data_dir.join("access_log.db"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS access_log (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp  TEXT    NOT NULL,
                api_key    TEXT    NOT NULL,
                client_ip  TEXT    NOT NULL,
                operation  TEXT    NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_access_timestamp ON access_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_access_operation ON access_log(operation);
            CREATE INDEX IF NOT EXISTS idx_access_api_key   ON access_log(api_key);
            ",
        )?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a batch of entries in a single transaction.
    pub fn insert_batch(&self, entries: &[AccessEntry]) -> rusqlite::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO access_log (timestamp, api_key, client_ip, operation)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    format_timestamp(entry.timestamp),
                    entry.api_key,
                    entry.client_ip,
                    entry.operation,
                ])?;
            }
        }
        tx.commit()
    }

    /// Query the log with optional filters, newest first.
    pub fn query(&self, q: &AccessQuery) -> rusqlite::Result<Vec<AccessLogRow>> {
        let conn = self.lock();

        let mut sql =
            String::from("SELECT id, timestamp, api_key, client_ip, operation FROM access_log");
        let mut conditions: Vec<String> = Vec::new();
        let mut param_values: Vec<&dyn rusqlite::types::ToSql> = Vec::new();

        if let Some(ref operation) = q.operation {
            param_values.push(operation);
            conditions.push(format!("operation = ?{}", param_values.len()));
        }
        if let Some(ref api_key) = q.api_key {
            param_values.push(api_key);
            conditions.push(format!("api_key = ?{}", param_values.len()));
        }
        if let Some(ref since) = q.since {
            param_values.push(since);
            conditions.push(format!("timestamp >= ?{}", param_values.len()));
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let limit = q.limit.unwrap_or(100).min(MAX_QUERY_ROWS);
        sql.push_str(&format!(" ORDER BY timestamp DESC, id DESC LIMIT {}", limit));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_values.as_slice(), |row| {
            Ok(AccessLogRow {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                api_key: row.get(2)?,
                client_ip: row.get(3)?,
                operation: row.get(4)?,
            })
        })?;

        rows.collect()
    }

    /// Total number of entries.
    pub fn count(&self) -> rusqlite::Result<usize> {
        self.lock()
            .query_row("SELECT COUNT(*) FROM access_log", [], |row| row.get(0))
    }

    /// Delete entries older than `ttl`. Returns the number of deleted rows.
    /// A `ttl` reaching past the representable time range deletes nothing.
    pub fn cleanup_old(&self, ttl: Duration) -> rusqlite::Result<usize> {
        let Some(cutoff) = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| chrono::Utc::now().checked_sub_signed(ttl))
        else {
            return Ok(0);
        };
        self.lock().execute(
            "DELETE FROM access_log WHERE timestamp < ?1",
            params![format_timestamp(cutoff)],
        )
    }
}
