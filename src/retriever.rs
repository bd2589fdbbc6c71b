//! Query-side orchestration: embed the query, rank by vector distance.

use std::sync::Arc;

use tracing::{debug, info};

use crate::embeddings::EmbeddingProvider;
use crate::stores::{ChapterStore, ScoredChunk};
use crate::types::RagError;

/// Result of a similarity search.
///
/// An uninitialized knowledge base is an expected, recoverable state (the
/// caller escalates it into the no-knowledge answer), so it is signaled here
/// rather than raised as an error.
#[derive(Debug)]
pub enum SearchOutcome {
    /// The store holds no entries; nothing has been ingested yet.
    KnowledgeBaseEmpty,
    /// Hits ordered by ascending embedding distance, at most `top_k` of them.
    Ranked(Vec<ScoredChunk>),
}

/// Turns a query string into a ranked list of candidate chunks.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: ChapterStore,
    default_top_k: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: ChapterStore,
        default_top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            default_top_k,
        }
    }

    /// Searches the chapter collection. `top_k` falls back to the configured
    /// default when `None`. No re-ranking beyond raw vector distance.
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<SearchOutcome, RagError> {
        if self.store.count().await? == 0 {
            info!("knowledge base is empty, nothing to retrieve");
            return Ok(SearchOutcome::KnowledgeBaseEmpty);
        }

        let top_k = top_k.unwrap_or(self.default_top_k);
        let query_vector = self.embedder.embed(query).await?;
        let hits = self.store.query(&query_vector, top_k).await?;
        debug!(hits = hits.len(), top_k, "similarity search complete");
        Ok(SearchOutcome::Ranked(hits))
    }
}
