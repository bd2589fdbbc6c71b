//! ```text
//! Scanned pages ──► extract::assemble_chapter_text ──► tagged chapter text
//!                                                             │
//! Chapter text ──► chunker::chunk_chapter ──► Vec<Chunk>      │
//!                             │                               │
//!                             ▼                               │
//! ingestion::embed_chunks ──► EmbeddedBatch ──► stores::ChapterStore
//!        (EmbeddingProvider, BackoffPolicy)          (sqlite + sqlite-vec)
//!
//! Question ──► retriever::Retriever ──► SearchOutcome
//!                                            │
//!                       empty ◄──────────────┴──────────────► ranked
//!                         │                                      │
//!              no-knowledge answer            synthesis::AnswerSynthesizer
//!                                               (GenerationProvider) ──► ChapterAnswer
//! ```
//!
//! `pipeline::ChapterPipeline` owns the whole flow; `artifacts` layers quiz
//! generation on top of the same retriever and generator.

pub mod artifacts;
pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod extract;
pub mod generation;
pub mod ingestion;
pub mod pipeline;
pub mod retriever;
pub mod stores;
pub mod synthesis;
pub mod types;

pub use chunker::{Chunk, ChunkerSettings, chunk_chapter};
pub use config::ChapterConfig;
pub use embeddings::{BackoffPolicy, EmbeddingProvider, MockEmbeddingProvider};
pub use generation::{GenerationProvider, GenerationRequest};
pub use pipeline::{ChapterPipeline, StoreStats};
pub use retriever::{Retriever, SearchOutcome};
pub use stores::{ChapterStore, ChunkMetadata, IndexedChunk, ScoredChunk};
pub use synthesis::{ChapterAnswer, Citation};
pub use types::RagError;
