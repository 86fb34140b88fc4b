//! API access log.
//!
//! Every successful call through the public API is recorded as
//! `(api key, client IP, operation, timestamp)` for audit purposes.
//!
//! The write path is non-blocking: the middleware pushes entries into a
//! bounded mpsc channel via [`writer::AccessLogWriter`], and a background task
//! batch-inserts into SQLite. A failed insert is logged and dropped; it never
//! reaches the client that made the request.

pub mod store;
pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::AccessLogStore;
pub use writer::AccessLogWriter;

/// One served request.
#[derive(Debug, Clone)]
pub struct AccessEntry {
    pub api_key: String,
    pub client_ip: String,
    /// Operation name, e.g. `getAllSubjects`.
    pub operation: String,
    pub timestamp: DateTime<Utc>,
}

impl AccessEntry {
    pub fn now(api_key: &str, client_ip: &str, operation: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            client_ip: client_ip.to_string(),
            operation: operation.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// A row returned from access log queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogRow {
    pub id: i64,
    pub timestamp: String,
    pub api_key: String,
    pub client_ip: String,
    pub operation: String,
}

/// Filters for reading the access log. Results are newest first.
#[derive(Debug, Default, Deserialize)]
pub struct AccessQuery {
    pub operation: Option<String>,
    pub api_key: Option<String>,
    pub since: Option<String>,
    pub limit: Option<usize>,
}
