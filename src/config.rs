//! Chapter-scope configuration.
//!
//! Every constant the pipeline consumes lives here: chunking bounds, retrieval
//! depth, the printed-page offset, chapter identity, model ids, and the
//! knowledge-store location. Values load from the environment (with `.env`
//! support via `dotenvy`) and fall back to the compiled defaults for the
//! anomaly-detection chapter this deployment ships with.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Default system instruction constraining the assistant to the chapter scope
/// and requiring inline page citations.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a teaching assistant for a data-mining course, responsible for \
Chapter 10, \"Anomaly Detection\", of Introduction to Data Mining. Answer \
student questions about anomaly detection: basic concepts, statistical \
methods (parametric and non-parametric), proximity-based methods (distance \
and density based), clustering-based methods, and evaluation of anomaly \
detection. Base every answer on the provided reference material, cite the \
page numbers you used inline (e.g. \"according to page 405\"), explain \
concepts in plain language with examples where helpful, and say honestly \
when a question falls outside the chapter or the material. Stay professional, \
patient, and friendly.";

/// Answer returned when the knowledge base has no relevant content.
pub const NO_KNOWLEDGE_ANSWER: &str =
    "Sorry, no relevant content was found in the knowledge base. \
     Make sure the chapter has been ingested.";

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_var(key).and_then(|value| value.parse().ok())
}

/// Chapter-scope constants consumed by the pipeline.
///
/// The pipeline treats these as opaque inputs; nothing here is recomputed at
/// run time. `chunk_size` and `overlap_size` are measured in characters.
#[derive(Clone, Debug, Deserialize)]
pub struct ChapterConfig {
    pub chapter_number: u32,
    pub chapter_title: String,
    /// Lowercase `[a-z0-9_]` topic tag used in the collection name.
    pub collection_slug: String,
    /// Human-readable provenance attached to every chunk.
    pub source_label: String,
    /// First scanned page of the chapter (1-based).
    pub start_page: u32,
    /// Last scanned page of the chapter (1-based, inclusive).
    pub end_page: u32,
    /// Scanned page minus this offset gives the printed-book page.
    pub page_offset: i64,
    pub chunk_size: usize,
    pub overlap_size: usize,
    pub top_k: usize,
    /// Directory holding the per-chapter sqlite knowledge stores.
    pub store_dir: PathBuf,
    /// Credential for the embedding/generation service; `None` disables both
    /// HTTP providers at construction time.
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub embedding_model: String,
    /// Fixed dimensionality of the embedding model's vectors.
    pub embedding_dimensions: usize,
    pub generation_model: String,
    pub system_prompt: String,
    /// Attempts per embedding call during ingestion.
    pub embed_max_attempts: u32,
    /// Base delay for exponential backoff between attempts, in milliseconds.
    pub embed_backoff_ms: u64,
}

impl Default for ChapterConfig {
    fn default() -> Self {
        Self {
            chapter_number: 10,
            chapter_title: "Anomaly Detection".to_string(),
            collection_slug: "anomaly_detection".to_string(),
            source_label: "Introduction to Data Mining, Chapter 10: Anomaly Detection"
                .to_string(),
            start_page: 419,
            end_page: 438,
            page_offset: 16,
            chunk_size: 500,
            overlap_size: 100,
            top_k: 5,
            store_dir: PathBuf::from("knowledge_store"),
            api_key: None,
            api_base_url: "https://open.bigmodel.cn/api/paas/v4".to_string(),
            embedding_model: "embedding-3".to_string(),
            embedding_dimensions: 2048,
            generation_model: "glm-4.6v".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            embed_max_attempts: 3,
            embed_backoff_ms: 1_000,
        }
    }
}

impl ChapterConfig {
    /// Loads configuration from the environment, reading a `.env` file first
    /// when one exists. Unset variables keep their compiled defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Some(value) = env_parse("CHAPTERSMITH_CHAPTER") {
            config.chapter_number = value;
        }
        if let Some(value) = env_var("CHAPTERSMITH_CHAPTER_TITLE") {
            config.chapter_title = value;
        }
        if let Some(value) = env_var("CHAPTERSMITH_SLUG") {
            config.collection_slug = value;
        }
        if let Some(value) = env_var("CHAPTERSMITH_SOURCE_LABEL") {
            config.source_label = value;
        }
        if let Some(value) = env_parse("CHAPTERSMITH_START_PAGE") {
            config.start_page = value;
        }
        if let Some(value) = env_parse("CHAPTERSMITH_END_PAGE") {
            config.end_page = value;
        }
        if let Some(value) = env_parse("CHAPTERSMITH_PAGE_OFFSET") {
            config.page_offset = value;
        }
        if let Some(value) = env_parse("CHAPTERSMITH_CHUNK_SIZE") {
            config.chunk_size = value;
        }
        if let Some(value) = env_parse("CHAPTERSMITH_OVERLAP") {
            config.overlap_size = value;
        }
        if let Some(value) = env_parse("CHAPTERSMITH_TOP_K") {
            config.top_k = value;
        }
        if let Some(value) = env_var("CHAPTERSMITH_STORE_DIR") {
            config.store_dir = PathBuf::from(value);
        }
        if let Some(value) = env_var("CHAPTERSMITH_API_KEY") {
            config.api_key = Some(value);
        }
        if let Some(value) = env_var("CHAPTERSMITH_API_BASE") {
            config.api_base_url = value;
        }
        if let Some(value) = env_var("CHAPTERSMITH_EMBEDDING_MODEL") {
            config.embedding_model = value;
        }
        if let Some(value) = env_parse("CHAPTERSMITH_EMBEDDING_DIMS") {
            config.embedding_dimensions = value;
        }
        if let Some(value) = env_var("CHAPTERSMITH_GENERATION_MODEL") {
            config.generation_model = value;
        }
        if let Some(value) = env_var("CHAPTERSMITH_SYSTEM_PROMPT") {
            config.system_prompt = value;
        }
        config
    }

    /// Collection name for this chapter, e.g. `chapter_10_anomaly_detection`.
    pub fn collection_name(&self) -> String {
        format!("chapter_{}_{}", self.chapter_number, self.collection_slug)
    }

    /// On-disk location of this chapter's knowledge store.
    pub fn database_path(&self) -> PathBuf {
        self.store_dir
            .join(format!("chapter_{}.sqlite", self.chapter_number))
    }

    pub fn embed_backoff(&self) -> Duration {
        Duration::from_millis(self.embed_backoff_ms)
    }
}
