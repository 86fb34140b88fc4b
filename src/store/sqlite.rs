use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};

use super::{
    apply_query, merge_fields, union_into, Document, DocumentStore, Query, StoreError,
    StoreResult,
};

/// SQLite-backed document store.
///
/// Documents live in one table keyed by `(collection, id)` with the body as
/// JSON text. Queries load the collection and evaluate in Rust via
/// [`apply_query`], which is fine for question-bank sized collections.
/// Read-modify-write operations run in a transaction while holding the
/// connection mutex, so concurrent `array_union` calls never lose updates.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id         TEXT NOT NULL,
                data       TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
            ",
        )?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn read_one(conn: &Connection, collection: &str, id: &str) -> StoreResult<Option<Map<String, Value>>> {
    let raw: Option<String> = conn
        .prepare_cached("SELECT data FROM documents WHERE collection = ?1 AND id = ?2")?
        .query_row(params![collection, id], |row| row.get(0))
        .optional()?;
    raw.map(|s| parse_object(&s)).transpose()
}

fn write_one(conn: &Connection, collection: &str, id: &str, data: &Map<String, Value>) -> StoreResult<()> {
    let json = serde_json::to_string(data)?;
    conn.prepare_cached(
        "INSERT INTO documents (collection, id, data) VALUES (?1, ?2, ?3)
         ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data",
    )?
    .execute(params![collection, id, json])?;
    Ok(())
}

fn parse_object(raw: &str) -> StoreResult<Map<String, Value>> {
    match serde_json::from_str(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Backend("stored document is not a JSON object".into())),
    }
}

fn read_collection(conn: &Connection, collection: &str) -> StoreResult<Vec<Document>> {
    let mut stmt =
        conn.prepare_cached("SELECT id, data FROM documents WHERE collection = ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![collection], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut docs = Vec::new();
    for row in rows {
        let (id, raw) = row?;
        docs.push(Document::new(id, parse_object(&raw)?));
    }
    Ok(docs)
}

/// Read, mutate and write back one existing document inside a transaction.
fn modify<F>(conn: &Connection, collection: &str, id: &str, f: F) -> StoreResult<()>
where
    F: FnOnce(&mut Map<String, Value>),
{
    let tx = conn.unchecked_transaction()?;
    let mut data = read_one(&tx, collection, id)?
        .ok_or_else(|| StoreError::not_found(collection, id))?;
    f(&mut data);
    write_one(&tx, collection, id, &data)?;
    tx.commit()?;
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let conn = self.lock();
        Ok(read_one(&conn, collection, id)?.map(|data| Document::new(id, data)))
    }

    async fn get_many(&self, collection: &str, ids: &[String]) -> StoreResult<Vec<Document>> {
        let conn = self.lock();
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = read_one(&conn, collection, id)? {
                docs.push(Document::new(id.clone(), data));
            }
        }
        Ok(docs)
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        read_collection(&self.lock(), collection)
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        let docs = read_collection(&self.lock(), collection)?;
        Ok(apply_query(docs, query))
    }

    async fn set(&self, collection: &str, id: &str, data: Map<String, Value>) -> StoreResult<()> {
        write_one(&self.lock(), collection, id, &data)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> StoreResult<()> {
        modify(&self.lock(), collection, id, |data| merge_fields(data, fields))
    }

    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: &[String],
    ) -> StoreResult<()> {
        modify(&self.lock(), collection, id, |data| union_into(data, field, values))
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.lock()
            .prepare_cached("DELETE FROM documents WHERE collection = ?1 AND id = ?2")?
            .execute(params![collection, id])?;
        Ok(())
    }
}
