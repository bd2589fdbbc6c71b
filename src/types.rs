//! Shared error type for the chapter tutoring pipeline.

use thiserror::Error;

/// Errors produced by the retrieval-augmented tutoring core.
///
/// External-service failures carry their underlying cause as a string so they
/// can be logged and surfaced without dragging provider-specific error types
/// through the public API. None of these are fatal to the process: embedding
/// failures are recovered per chunk, generation failures degrade to an
/// error-describing answer, and an empty knowledge base is a signaled state
/// rather than an error at the retrieval layer.
#[derive(Debug, Error)]
pub enum RagError {
    /// A required credential or setting is absent; the affected component
    /// refuses construction instead of failing later mid-call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A single embedding call failed after retries.
    #[error("embedding service error: {0}")]
    Embedding(String),

    /// The answer-generation call failed.
    #[error("generation service error: {0}")]
    Generation(String),

    /// The vector store rejected an operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// The chapter text was empty or whitespace-only; nothing to index.
    /// Callers must treat the rebuild as failed; no chunks were written.
    #[error("empty chapter text: nothing to index")]
    EmptyChapter,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
