//! Persisted storage for embedded chapter chunks.
//!
//! One chapter maps to one *collection*: a pair of SQLite tables (row data
//! plus a `vec0` virtual table for the vectors) named
//! `chapter_{N}_{topic_slug}`. The collection is created on open, replaced
//! wholesale by `clear()` + `upsert_batch()` during a rebuild, and queried
//! many times between rebuilds. Entries are immutable once written; there is
//! no partial-update or delete-by-id path.

pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::chunker::Chunk;

pub use sqlite::ChapterStore;

/// Metadata persisted alongside every indexed chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub page: u32,
    pub chunk_id: u32,
    pub chapter: u32,
    pub source: String,
}

impl ChunkMetadata {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            page: chunk.page,
            chunk_id: chunk.chunk_id,
            chapter: chunk.chapter,
            source: chunk.source_label.clone(),
        }
    }
}

/// A chunk paired with its embedding, ready for persistence.
///
/// The store assumes every entry it receives is complete; chunks whose
/// embedding failed upstream are excluded by the caller before this point.
#[derive(Clone, Debug)]
pub struct IndexedChunk {
    /// Collection-unique key, `chunk_{chapter}_{chunk_id}`.
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

impl IndexedChunk {
    pub fn from_chunk(chunk: &Chunk, embedding: Vec<f32>) -> Self {
        Self {
            id: format!("chunk_{}_{}", chunk.chapter, chunk.chunk_id),
            text: chunk.text.clone(),
            metadata: ChunkMetadata::from_chunk(chunk),
            embedding,
        }
    }
}

/// One similarity hit: chunk text, its metadata, and the embedding-space
/// distance to the query (smaller is more relevant).
#[derive(Clone, Debug)]
pub struct ScoredChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}
