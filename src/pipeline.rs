//! The pipeline orchestrator: one explicitly constructed context object
//! owning the providers and the store. No ambient singletons; everything a
//! component needs is passed down from here.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::artifacts::QuizGenerator;
use crate::chunker::{Chunk, ChunkerSettings, chunk_chapter};
use crate::config::{ChapterConfig, NO_KNOWLEDGE_ANSWER};
use crate::embeddings::{BackoffPolicy, EmbeddingProvider};
use crate::generation::GenerationProvider;
use crate::ingestion::{IngestReport, embed_chunks};
use crate::retriever::{Retriever, SearchOutcome};
use crate::stores::ChapterStore;
use crate::synthesis::{AnswerSynthesizer, ChapterAnswer};
use crate::types::RagError;

/// Knowledge-base summary for status displays.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreStats {
    pub document_count: usize,
    pub collection_name: String,
}

/// Chapter-scoped question-answering pipeline.
///
/// Ingestion: chapter text → chunks → embeddings → vector store (full
/// rebuild). Query: question → retrieval → cited answer, with the
/// no-knowledge fallback when the store is empty.
pub struct ChapterPipeline {
    config: ChapterConfig,
    store: ChapterStore,
    retriever: Arc<Retriever>,
    synthesizer: AnswerSynthesizer,
    generator: Arc<dyn GenerationProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    backoff: BackoffPolicy,
}

impl ChapterPipeline {
    pub fn builder() -> ChapterPipelineBuilder {
        ChapterPipelineBuilder::default()
    }

    /// Opens the chapter's store at its configured path and assembles the
    /// pipeline around it.
    pub async fn open(
        config: ChapterConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Result<Self, RagError> {
        let store = ChapterStore::open(
            config.database_path(),
            &config.collection_name(),
            embedder.dimensions(),
        )
        .await?;
        Self::builder()
            .config(config)
            .embedder(embedder)
            .generator(generator)
            .store(store)
            .build()
    }

    pub fn config(&self) -> &ChapterConfig {
        &self.config
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Quiz generation over this pipeline's retriever and generator.
    pub fn quiz_generator(&self) -> QuizGenerator {
        QuizGenerator::new(Arc::clone(&self.retriever), Arc::clone(&self.generator))
    }

    /// Replaces the collection's contents from freshly chunked chapter text.
    ///
    /// Empty or whitespace-only text fails with [`RagError::EmptyChapter`]
    /// before the store is touched, leaving the previous contents intact.
    /// Embedding failures exclude individual chunks rather than aborting; the
    /// report carries the loss count.
    pub async fn rebuild(&self, chapter_text: &str) -> Result<IngestReport, RagError> {
        let settings = ChunkerSettings::from_config(&self.config);
        let chunks = chunk_chapter(chapter_text, &settings);
        if chunks.is_empty() {
            return Err(RagError::EmptyChapter);
        }
        info!(
            chunks = chunks.len(),
            collection = %self.store.collection(),
            "rebuilding knowledge base"
        );

        self.store.clear().await?;
        self.append_chunks(&chunks).await
    }

    /// Embeds and persists a batch of chunks without clearing the collection.
    pub async fn append_chunks(&self, chunks: &[Chunk]) -> Result<IngestReport, RagError> {
        let batch = embed_chunks(self.embedder.as_ref(), self.backoff, chunks).await;
        let written = self.store.upsert_batch(batch.entries).await?;
        let report = IngestReport {
            chunks_total: chunks.len(),
            chunks_indexed: written,
            chunks_skipped: batch.skipped,
        };
        info!(
            indexed = report.chunks_indexed,
            skipped = report.chunks_skipped,
            "ingestion batch complete"
        );
        Ok(report)
    }

    /// The full question-answering flow: retrieve, then either synthesize a
    /// grounded answer or fall back to the fixed no-knowledge answer.
    pub async fn ask(&self, question: &str) -> Result<ChapterAnswer, RagError> {
        info!(question, "answering question");
        match self.retriever.search(question, None).await? {
            SearchOutcome::KnowledgeBaseEmpty => Ok(ChapterAnswer {
                answer: NO_KNOWLEDGE_ANSWER.to_string(),
                sources: Vec::new(),
            }),
            SearchOutcome::Ranked(hits) if hits.is_empty() => Ok(ChapterAnswer {
                answer: NO_KNOWLEDGE_ANSWER.to_string(),
                sources: Vec::new(),
            }),
            SearchOutcome::Ranked(hits) => Ok(self.synthesizer.answer(question, &hits).await),
        }
    }

    pub async fn stats(&self) -> Result<StoreStats, RagError> {
        Ok(StoreStats {
            document_count: self.store.count().await?,
            collection_name: self.store.collection().to_string(),
        })
    }
}

/// Builder for [`ChapterPipeline`]. Every part is required; a missing part is
/// a configuration error surfaced at construction.
#[derive(Default)]
pub struct ChapterPipelineBuilder {
    config: Option<ChapterConfig>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn GenerationProvider>>,
    store: Option<ChapterStore>,
}

impl ChapterPipelineBuilder {
    #[must_use]
    pub fn config(mut self, config: ChapterConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    #[must_use]
    pub fn generator(mut self, generator: Arc<dyn GenerationProvider>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[must_use]
    pub fn store(mut self, store: ChapterStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<ChapterPipeline, RagError> {
        let config = self
            .config
            .ok_or_else(|| RagError::Configuration("pipeline requires a config".to_string()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| RagError::Configuration("pipeline requires an embedder".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| RagError::Configuration("pipeline requires a generator".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| RagError::Configuration("pipeline requires a store".to_string()))?;

        let retriever = Arc::new(Retriever::new(
            Arc::clone(&embedder),
            store.clone(),
            config.top_k,
        ));
        let synthesizer = AnswerSynthesizer::new(Arc::clone(&generator), &config);
        let backoff = BackoffPolicy::from_config(&config);

        Ok(ChapterPipeline {
            config,
            store,
            retriever,
            synthesizer,
            generator,
            embedder,
            backoff,
        })
    }
}
