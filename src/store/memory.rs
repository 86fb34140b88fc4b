//! In-memory implementation of [`DocumentStore`].
//!
//! Usable as a throwaway backend (`THEORIO_STORE=memory`) and as the test
//! double for the HTTP layer: with [`MemoryStore::recording`] every call is
//! logged so tests can assert exactly which round-trips a request made, and
//! `fail_*` builders inject backend errors.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{
    apply_query, merge_fields, union_into, Document, DocumentStore, Query, StoreError,
    StoreResult,
};

// ---------------------------------------------------------------------------
// Call recording
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Get { collection: String, id: String },
    GetMany { collection: String, ids: Vec<String> },
    List(String),
    Query(String),
    Set { collection: String, id: String },
    Update { collection: String, id: String },
    ArrayUnion { collection: String, id: String, field: String },
    Delete { collection: String, id: String },
}

impl StoreCall {
    pub fn collection(&self) -> &str {
        match self {
            StoreCall::Get { collection, .. }
            | StoreCall::GetMany { collection, .. }
            | StoreCall::Set { collection, .. }
            | StoreCall::Update { collection, .. }
            | StoreCall::ArrayUnion { collection, .. }
            | StoreCall::Delete { collection, .. } => collection,
            StoreCall::List(collection) | StoreCall::Query(collection) => collection,
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Map<String, Value>>>,
    calls: Vec<StoreCall>,
    record_calls: bool,
    failing_collections: HashSet<String>,
    failing_documents: HashSet<(String, String)>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that records every trait call (see [`MemoryStore::calls`]).
    pub fn recording() -> Self {
        let store = Self::default();
        store.lock().record_calls = true;
        store
    }

    /// Seed a document. `data` must be a JSON object.
    pub fn with_document(self, collection: &str, id: &str, data: Value) -> Self {
        self.insert(collection, id, data);
        self
    }

    /// Make every operation on `collection` fail with a backend error.
    pub fn fail_collection(self, collection: &str) -> Self {
        self.lock()
            .failing_collections
            .insert(collection.to_string());
        self
    }

    /// Make point reads and writes of one document fail with a backend error.
    pub fn fail_document(self, collection: &str, id: &str) -> Self {
        self.lock()
            .failing_documents
            .insert((collection.to_string(), id.to_string()));
        self
    }

    /// Seed or replace a document outside the call log.
    pub fn insert(&self, collection: &str, id: &str, data: Value) {
        let data = match data {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self.lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
    }

    /// Snapshot a document outside the call log.
    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone()))
    }

    /// Number of documents in a collection, outside the call log.
    pub fn count(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Return all recorded calls.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Count recorded calls touching `collection`.
    pub fn calls_to(&self, collection: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.collection() == collection)
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Inner {
    fn record(&mut self, call: StoreCall) {
        if self.record_calls {
            self.calls.push(call);
        }
    }

    fn check_collection(&self, collection: &str) -> StoreResult<()> {
        if self.failing_collections.contains(collection) {
            return Err(StoreError::Backend(format!(
                "injected failure for collection {collection}"
            )));
        }
        Ok(())
    }

    fn check_document(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.check_collection(collection)?;
        if self
            .failing_documents
            .contains(&(collection.to_string(), id.to_string()))
        {
            return Err(StoreError::Backend(format!(
                "injected failure for {collection}/{id}"
            )));
        }
        Ok(())
    }

    fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn existing_mut(
        &mut self,
        collection: &str,
        id: &str,
    ) -> StoreResult<&mut Map<String, Value>> {
        self.collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let mut inner = self.lock();
        inner.record(StoreCall::Get {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        inner.check_document(collection, id)?;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn get_many(&self, collection: &str, ids: &[String]) -> StoreResult<Vec<Document>> {
        let mut inner = self.lock();
        inner.record(StoreCall::GetMany {
            collection: collection.to_string(),
            ids: ids.to_vec(),
        });
        inner.check_collection(collection)?;
        let Some(docs) = inner.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| docs.get(id).map(|data| Document::new(id.clone(), data.clone())))
            .collect())
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let mut inner = self.lock();
        inner.record(StoreCall::List(collection.to_string()));
        inner.check_collection(collection)?;
        Ok(inner.documents(collection))
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        let mut inner = self.lock();
        inner.record(StoreCall::Query(collection.to_string()));
        inner.check_collection(collection)?;
        Ok(apply_query(inner.documents(collection), query))
    }

    async fn set(&self, collection: &str, id: &str, data: Map<String, Value>) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.record(StoreCall::Set {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        inner.check_document(collection, id)?;
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.record(StoreCall::Update {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        inner.check_document(collection, id)?;
        let data = inner.existing_mut(collection, id)?;
        merge_fields(data, fields);
        Ok(())
    }

    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: &[String],
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.record(StoreCall::ArrayUnion {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
        });
        inner.check_document(collection, id)?;
        let data = inner.existing_mut(collection, id)?;
        union_into(data, field, values);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.record(StoreCall::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        inner.check_document(collection, id)?;
        if let Some(docs) = inner.collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }
}
