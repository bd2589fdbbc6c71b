//! SQLite + sqlite-vec backend for per-chapter collections.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use tokio_rusqlite::{Connection, ffi};
use tracing::debug;

use super::{ChunkMetadata, IndexedChunk, ScoredChunk};
use crate::types::RagError;

fn storage_err(err: impl ToString) -> RagError {
    RagError::Storage(err.to_string())
}

/// Durable vector store for one chapter's chunks.
///
/// Backed by an on-disk SQLite database at a path keyed by chapter number.
/// The collection name becomes two table names, so it is restricted to
/// `[a-z0-9_]` at open time.
#[derive(Clone)]
pub struct ChapterStore {
    conn: Connection,
    collection: String,
    dimensions: usize,
}

impl ChapterStore {
    /// Opens (or creates) the collection at `path`.
    pub async fn open(
        path: impl AsRef<Path>,
        collection: &str,
        dimensions: usize,
    ) -> Result<Self, RagError> {
        Self::register_sqlite_vec()?;

        if collection.is_empty()
            || !collection
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(storage_err(format!(
                "invalid collection name '{collection}': expected [a-z0-9_]+"
            )));
        }
        if dimensions == 0 {
            return Err(storage_err("embedding dimensionality must be non-zero"));
        }

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let conn = Connection::open(path).await.map_err(storage_err)?;
        conn.call(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))?;
            Ok(())
        })
        .await
        .map_err(storage_err)?;

        let store = Self {
            conn,
            collection: collection.to_string(),
            dimensions,
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    fn register_sqlite_vec() -> Result<(), RagError> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *mut c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!(
                        "failed to register sqlite-vec extension (code {rc})"
                    ))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(RagError::Storage)
    }

    async fn ensure_schema(&self) -> Result<(), RagError> {
        let table = self.collection.clone();
        let dimensions = self.dimensions;
        self.conn
            .call(move |conn| {
                conn.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        id TEXT PRIMARY KEY,
                        content TEXT NOT NULL,
                        page INTEGER NOT NULL,
                        chunk_id INTEGER NOT NULL,
                        chapter INTEGER NOT NULL,
                        source_label TEXT NOT NULL
                    );
                    CREATE VIRTUAL TABLE IF NOT EXISTS {table}_embeddings
                        USING vec0(embedding float[{dimensions}]);"
                ))?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Persists a batch of complete entries in one transaction, returning the
    /// number written. An empty batch returns 0 without touching the store.
    pub async fn upsert_batch(&self, entries: Vec<IndexedChunk>) -> Result<usize, RagError> {
        if entries.is_empty() {
            return Ok(0);
        }
        for entry in &entries {
            if entry.embedding.len() != self.dimensions {
                return Err(storage_err(format!(
                    "entry '{}' has {} dimensions, store expects {}",
                    entry.id,
                    entry.embedding.len(),
                    self.dimensions
                )));
            }
        }

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let vector = serde_json::to_string(&entry.embedding).map_err(storage_err)?;
            rows.push((entry, vector));
        }

        let table = self.collection.clone();
        let written = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let count = rows.len();
                for (entry, vector) in rows {
                    tx.execute(
                        &format!(
                            "INSERT INTO {table} \
                             (id, content, page, chunk_id, chapter, source_label) \
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                        ),
                        (
                            &entry.id,
                            &entry.text,
                            entry.metadata.page as i64,
                            entry.metadata.chunk_id as i64,
                            entry.metadata.chapter as i64,
                            &entry.metadata.source,
                        ),
                    )?;
                    let rowid = tx.last_insert_rowid();
                    tx.execute(
                        &format!(
                            "INSERT INTO {table}_embeddings (rowid, embedding) VALUES (?1, ?2)"
                        ),
                        (rowid, &vector),
                    )?;
                }
                tx.commit()?;
                Ok(count)
            })
            .await
            .map_err(storage_err)?;

        debug!(collection = %self.collection, written, "persisted chunk batch");
        Ok(written)
    }

    /// Returns up to `top_k` entries nearest to `vector` by cosine distance,
    /// ascending. An empty collection yields an empty result.
    pub async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>, RagError> {
        if top_k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }
        if vector.len() != self.dimensions {
            return Err(storage_err(format!(
                "query vector has {} dimensions, store expects {}",
                vector.len(),
                self.dimensions
            )));
        }

        let vector_json = serde_json::to_string(vector).map_err(storage_err)?;
        let table = self.collection.clone();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT c.content, c.page, c.chunk_id, c.chapter, c.source_label, \
                     vec_distance_cosine(e.embedding, vec_f32(?1)) AS distance \
                     FROM {table} AS c \
                     JOIN {table}_embeddings AS e ON e.rowid = c.rowid \
                     ORDER BY distance ASC \
                     LIMIT {top_k}"
                ))?;

                let rows = stmt.query_map([&vector_json], |row| {
                    Ok(ScoredChunk {
                        text: row.get(0)?,
                        metadata: ChunkMetadata {
                            page: row.get::<_, i64>(1)? as u32,
                            chunk_id: row.get::<_, i64>(2)? as u32,
                            chapter: row.get::<_, i64>(3)? as u32,
                            source: row.get(4)?,
                        },
                        distance: row.get(5)?,
                    })
                })?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok(results)
            })
            .await
            .map_err(storage_err)
    }

    /// Deletes and recreates the collection. Idempotent; a subsequent
    /// [`count`](Self::count) returns 0.
    pub async fn clear(&self) -> Result<(), RagError> {
        let table = self.collection.clone();
        self.conn
            .call(move |conn| {
                conn.execute_batch(&format!(
                    "DROP TABLE IF EXISTS {table};
                     DROP TABLE IF EXISTS {table}_embeddings;"
                ))?;
                Ok(())
            })
            .await
            .map_err(storage_err)?;
        debug!(collection = %self.collection, "collection cleared");
        self.ensure_schema().await
    }

    /// Number of persisted entries; 0 on a fresh collection.
    pub async fn count(&self) -> Result<usize, RagError> {
        let table = self.collection.clone();
        self.conn
            .call(move |conn| {
                let count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get(0)
                    })?;
                Ok(count as usize)
            })
            .await
            .map_err(storage_err)
    }
}
