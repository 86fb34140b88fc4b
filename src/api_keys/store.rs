//! Key lookup, validation, and first-launch key generation.
//!
//! # Key format
//!
//! Generated keys are `tqk_` + 40 Base62 characters (44 chars total,
//! `log2(62^40) ≈ 238` bits). Keys provisioned by hand in the `api_keys`
//! collection may use any format; lookup is by exact document id.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde_json::{json, Map, Value};

use super::types::{key_prefix, ApiKeyRecord};
use crate::store::{collections, DocumentStore, StoreError, StoreResult};

/// Prefix for keys generated by this service.
const KEY_PREFIX: &str = "tqk_";

/// Number of random Base62 characters after the prefix.
const KEY_RANDOM_LEN: usize = 40;

const BASE62_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// File in the data directory holding the raw default key.
const DEFAULT_KEY_FILE: &str = "default_api_key";

/// Generate a raw API key: `tqk_` + 40 random Base62 characters.
fn generate_raw_key() -> String {
    let mut rng = rand::rng();
    let random_part: String = (0..KEY_RANDOM_LEN)
        .map(|_| {
            let idx = rng.random_range(0..BASE62_CHARS.len());
            BASE62_CHARS[idx] as char
        })
        .collect();
    format!("{}{}", KEY_PREFIX, random_part)
}

/// Source of API key records.
#[async_trait]
pub trait KeyRegistry: Send + Sync {
    /// Look up a raw key. `Ok(None)` if no record exists.
    async fn lookup(&self, key: &str) -> StoreResult<Option<ApiKeyRecord>>;
}

/// [`KeyRegistry`] over the `api_keys` collection of a document store.
#[derive(Clone)]
pub struct StoreKeyRegistry {
    store: Arc<dyn DocumentStore>,
}

impl StoreKeyRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl KeyRegistry for StoreKeyRegistry {
    async fn lookup(&self, key: &str) -> StoreResult<Option<ApiKeyRecord>> {
        Ok(self
            .store
            .get(collections::API_KEYS, key)
            .await?
            .map(ApiKeyRecord::from_document))
    }
}

/// Why a request's key was refused.
#[derive(Debug, thiserror::Error)]
pub enum KeyRejection {
    #[error("Missing API key")]
    Missing,

    #[error("Invalid or inactive API key")]
    Invalid,

    #[error("key lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// Validate a presented key. An absent or blank header is `Missing` and never
/// touches the registry.
pub async fn validate_key(
    registry: &dyn KeyRegistry,
    presented: Option<&str>,
) -> Result<ApiKeyRecord, KeyRejection> {
    let key = match presented.map(str::trim) {
        Some(k) if !k.is_empty() => k,
        _ => return Err(KeyRejection::Missing),
    };

    match registry.lookup(key).await? {
        Some(record) if record.active => Ok(record),
        _ => Err(KeyRejection::Invalid),
    }
}

/// Create a default key if the registry is empty.
///
/// The raw key is written to `<data_dir>/default_api_key` so an operator can
/// pick it up once. Returns the new key, or `None` if keys already exist.
pub async fn ensure_default_key(
    store: &dyn DocumentStore,
    data_dir: &Path,
) -> StoreResult<Option<String>> {
    if !store.list(collections::API_KEYS).await?.is_empty() {
        return Ok(None);
    }

    let raw = generate_raw_key();
    let mut data = Map::new();
    data.insert("active".to_string(), Value::Bool(true));
    data.insert("name".to_string(), json!("Default"));
    data.insert("createdAt".to_string(), json!(Utc::now().to_rfc3339()));
    store.set(collections::API_KEYS, &raw, data).await?;

    if let Err(e) = atomic_write(&data_dir.join(DEFAULT_KEY_FILE), raw.as_bytes()) {
        log::warn!("Failed to write default API key file: {}", e);
    }
    log::info!(
        "Generated default API key {}... (full key in {})",
        key_prefix(&raw),
        data_dir.join(DEFAULT_KEY_FILE).display()
    );
    Ok(Some(raw))
}

/// Write atomically via temp-file + rename.
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
