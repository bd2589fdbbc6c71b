//! Order-preserving embedding of chunk batches.
//!
//! Chunks are embedded one at a time, in chunk-id order, so a mid-batch
//! failure can never reorder the surviving entries. A chunk whose embedding
//! fails after the retry budget is excluded from the batch and counted;
//! partial ingestion succeeds.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::chunker::Chunk;
use crate::embeddings::{BackoffPolicy, EmbeddingProvider};
use crate::stores::IndexedChunk;

/// Entries ready for persistence, plus the number excluded along the way.
#[derive(Debug)]
pub struct EmbeddedBatch {
    pub entries: Vec<IndexedChunk>,
    pub skipped: usize,
}

impl EmbeddedBatch {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of one ingestion run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub chunks_total: usize,
    pub chunks_indexed: usize,
    pub chunks_skipped: usize,
}

/// Embeds `chunks` sequentially, retrying each call under `backoff` and
/// excluding chunks that still fail. Entry order follows chunk order.
pub async fn embed_chunks(
    embedder: &dyn EmbeddingProvider,
    backoff: BackoffPolicy,
    chunks: &[Chunk],
) -> EmbeddedBatch {
    let mut entries = Vec::with_capacity(chunks.len());
    let mut skipped = 0usize;

    for chunk in chunks {
        match backoff.run(|| embedder.embed(&chunk.text)).await {
            Ok(embedding) => entries.push(IndexedChunk::from_chunk(chunk, embedding)),
            Err(err) => {
                warn!(
                    chunk_id = chunk.chunk_id,
                    error = %err,
                    "excluding chunk after failed embedding"
                );
                skipped += 1;
            }
        }
    }

    EmbeddedBatch { entries, skipped }
}
