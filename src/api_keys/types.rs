//! API key record as stored in the `api_keys` collection.

use serde::Serialize;
use serde_json::Value;

use crate::store::Document;

/// Number of leading key characters that are safe to show in logs.
const DISPLAY_PREFIX_LEN: usize = 8;

/// A stored API key. The raw key is the document id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiKeyRecord {
    pub key: String,
    /// Only `active: true` admits requests. A missing or non-boolean flag
    /// counts as inactive.
    pub active: bool,
    /// Human-readable label, e.g. "Default" or "Frontend".
    pub name: Option<String>,
    pub created_at: Option<String>,
}

impl ApiKeyRecord {
    pub fn from_document(doc: Document) -> Self {
        Self {
            active: doc.get("active").and_then(Value::as_bool).unwrap_or(false),
            name: doc.get_str("name").map(str::to_string),
            created_at: doc.get_str("createdAt").map(str::to_string),
            key: doc.id,
        }
    }

    pub fn prefix(&self) -> &str {
        key_prefix(&self.key)
    }
}

/// First few characters of a key for log lines. Never log full keys.
pub fn key_prefix(key: &str) -> &str {
    match key.char_indices().nth(DISPLAY_PREFIX_LEN) {
        Some((idx, _)) => &key[..idx],
        None => key,
    }
}
