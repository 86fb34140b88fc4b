//! Document store abstraction.
//!
//! Handlers never talk to a database directly. Everything goes through
//! [`DocumentStore`], a small subset of a document database's API: point
//! reads, "id in set" batch reads, filtered/sorted/cursored queries, shallow
//! merges and set-union array appends.
//!
//! Two backends ship with the crate:
//!
//! - [`memory::MemoryStore`]: in-process maps, with an optional call log and
//!   fault injection for tests.
//! - [`sqlite::SqliteStore`]: JSON documents in a single SQLite table.
//!
//! Query semantics (filtering, ordering, cursors) live in [`apply_query`] so
//! both backends page identically.

pub mod memory;
pub mod sqlite;

use std::cmp::Ordering;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{Map, Value};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Collection names used by the service.
pub mod collections {
    pub const SUBJECTS: &str = "subjects";
    pub const QUESTIONS: &str = "questions";
    pub const EXAMS: &str = "exams";
    pub const FEEDBACK: &str = "feedback";
    pub const API_KEYS: &str = "api_keys";
}

/// Length of store-generated document ids.
const DOCUMENT_ID_LEN: usize = 20;

const BASE62_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A stored document: its id plus a schema-free JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    /// Flatten to `{"id": ..., ...data}`. A stored `id` field wins over the
    /// document id, matching how clients spread document data over the id.
    pub fn into_json(self) -> Value {
        let mut out = Map::with_capacity(self.data.len() + 1);
        out.insert("id".to_string(), Value::String(self.id));
        out.extend(self.data);
        Value::Object(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A filtered, sorted, cursored read over one collection.
///
/// Evaluation order: equality filters, then ordering (documents without the
/// order-by field are excluded), then `start_after`, then `limit`.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<OrderBy>,
    pub start_after: Option<Document>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn start_after(mut self, cursor: Option<Document>) -> Self {
        self.start_after = cursor;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The document database seen by the question bank.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document.
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Batch "id in set" lookup. Found documents come back in the order of
    /// `ids`; missing ids are skipped.
    async fn get_many(&self, collection: &str, ids: &[String]) -> StoreResult<Vec<Document>>;

    /// Every document in a collection, ordered by id.
    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>>;

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>>;

    /// Allocate a fresh document id. Nothing is written.
    fn new_id(&self, _collection: &str) -> String {
        generate_document_id()
    }

    /// Create or replace a document.
    async fn set(&self, collection: &str, id: &str, data: Map<String, Value>) -> StoreResult<()>;

    /// Shallow-merge `fields` into an existing document.
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> StoreResult<()>;

    /// Append each of `values` to the array `field` unless already present.
    /// Atomic per document. Fails with [`StoreError::NotFound`] if the
    /// document does not exist.
    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: &[String],
    ) -> StoreResult<()>;

    /// Remove a document. Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// Shared semantics
// ---------------------------------------------------------------------------

/// Generate a document id: 20 random base62 characters.
pub fn generate_document_id() -> String {
    let mut rng = rand::rng();
    (0..DOCUMENT_ID_LEN)
        .map(|_| BASE62_CHARS[rng.random_range(0..BASE62_CHARS.len())] as char)
        .collect()
}

/// Shallow merge: top-level keys in `fields` overwrite those in `data`.
pub fn merge_fields(data: &mut Map<String, Value>, fields: Map<String, Value>) {
    for (key, value) in fields {
        data.insert(key, value);
    }
}

/// Set-union append into an array field. A missing or non-array field is
/// replaced by a fresh array.
pub fn union_into(data: &mut Map<String, Value>, field: &str, values: &[String]) {
    let entry = data
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !entry.is_array() {
        *entry = Value::Array(Vec::new());
    }
    if let Value::Array(items) = entry {
        for value in values {
            let candidate = Value::String(value.clone());
            if !items.contains(&candidate) {
                items.push(candidate);
            }
        }
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()).then_with(|| {
            Value::Object(x.clone())
                .to_string()
                .cmp(&Value::Object(y.clone()).to_string())
        }),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Evaluate `query` over a collection's documents.
pub fn apply_query(documents: Vec<Document>, query: &Query) -> Vec<Document> {
    let mut matched: Vec<Document> = documents
        .into_iter()
        .filter(|doc| {
            query
                .filters
                .iter()
                .all(|(field, expected)| doc.get(field) == Some(expected))
        })
        .collect();

    match &query.order_by {
        Some(order) => {
            matched.retain(|doc| doc.get(&order.field).is_some());
            matched.sort_by(|a, b| sort_key_cmp(a, b, order));
            if let Some(cursor) = &query.start_after {
                matched.retain(|doc| sort_key_cmp(doc, cursor, order) == Ordering::Greater);
            }
        }
        None => {
            matched.sort_by(|a, b| a.id.cmp(&b.id));
            if let Some(cursor) = &query.start_after {
                matched.retain(|doc| doc.id > cursor.id);
            }
        }
    }

    if let Some(limit) = query.limit {
        matched.truncate(limit);
    }
    matched
}

/// Compare two documents by (order-by field, id), honouring direction for both.
fn sort_key_cmp(a: &Document, b: &Document, order: &OrderBy) -> Ordering {
    let null = Value::Null;
    let av = a.get(&order.field).unwrap_or(&null);
    let bv = b.get(&order.field).unwrap_or(&null);
    let ord = compare_values(av, bv).then_with(|| a.id.cmp(&b.id));
    match order.direction {
        Direction::Ascending => ord,
        Direction::Descending => ord.reverse(),
    }
}
