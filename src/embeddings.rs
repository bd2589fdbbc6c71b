//! Embedding provider seam.
//!
//! Everything that turns text into a fixed-length vector goes through
//! [`EmbeddingProvider`]. Batch embedding is expressed as repeated single
//! calls; ordering and retry policy belong to the caller (see
//! [`crate::ingestion`]). Three implementations ship: an OpenAI-compatible
//! HTTP client, an adapter over any `rig` embedding model, and a
//! deterministic mock for tests.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rig::embeddings::embedding::EmbeddingModel;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ChapterConfig;
use crate::types::RagError;

/// Converts a text segment or query string into a fixed-length vector.
///
/// Every vector returned by one provider instance has exactly
/// [`dimensions`](Self::dimensions) components.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    fn dimensions(&self) -> usize;

    fn model_id(&self) -> &str;
}

/// Exponential backoff applied around rate-limited external calls.
///
/// Replaces a fixed inter-call sleep: the delay after attempt `n` is
/// `base_delay * 2^(n-1)`, and the call is abandoned after `max_attempts`.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl BackoffPolicy {
    pub fn from_config(config: &ChapterConfig) -> Self {
        Self {
            max_attempts: config.embed_max_attempts.max(1),
            base_delay: config.embed_backoff(),
        }
    }

    /// Single attempt, no sleeping. Useful for tests and query-time calls.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1 << (attempt - 1).min(16))
    }

    /// Runs `call` until it succeeds or the attempt budget is exhausted,
    /// sleeping between attempts.
    pub async fn run<T, F, Fut>(&self, mut call: F) -> Result<T, RagError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RagError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts => {
                    warn!(attempt, error = %err, "call failed, backing off");
                    tokio::time::sleep(self.delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// OpenAI-compatible `/embeddings` client.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbeddingPayload<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingCompletion {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    /// Fails with [`RagError::Configuration`] when no credential is set, so a
    /// missing key surfaces as a disabled feature at construction rather than
    /// a mid-ingestion crash.
    pub fn from_config(config: &ChapterConfig) -> Result<Self, RagError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            RagError::Configuration("embedding service credential is not set".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let payload = EmbeddingPayload {
            model: &self.model,
            input: text,
        };
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| RagError::Embedding(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "embedding request failed ({status}): {body}"
            )));
        }

        let completion: EmbeddingCompletion = response
            .json()
            .await
            .map_err(|err| RagError::Embedding(err.to_string()))?;
        let vector = completion
            .data
            .into_iter()
            .next()
            .map(|datum| datum.embedding)
            .ok_or_else(|| RagError::Embedding("response carried no embedding".to_string()))?;
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Adapter exposing any `rig` embedding model through [`EmbeddingProvider`].
pub struct RigEmbeddingProvider<E> {
    model: E,
    model_id: String,
}

impl<E> RigEmbeddingProvider<E>
where
    E: EmbeddingModel + Send + Sync,
{
    pub fn new(model: E, model_id: impl Into<String>) -> Self {
        Self {
            model,
            model_id: model_id.into(),
        }
    }
}

#[async_trait]
impl<E> EmbeddingProvider for RigEmbeddingProvider<E>
where
    E: EmbeddingModel + Send + Sync,
{
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let embeddings = self
            .model
            .embed_texts(std::iter::once(text.to_string()))
            .await
            .map_err(|err| RagError::Embedding(err.to_string()))?;
        let embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("model returned no embedding".to_string()))?;
        Ok(embedding.vec.into_iter().map(|value| value as f32).collect())
    }

    fn dimensions(&self) -> usize {
        self.model.ndims()
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Deterministic hash-based embeddings for tests and offline runs.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self { dimensions: 8 }
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_to_vector(text: &str, dimensions: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let seed = hasher.finish();
    (0..dimensions)
        .map(|i| {
            let bits = seed.rotate_left((i * 8) as u32) ^ ((i as u64) << 24);
            (bits as f64 / u64::MAX as f64) as f32
        })
        .collect()
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(hash_to_vector(text, self.dimensions))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        "mock-embedding"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig::embeddings::embedding::{Embedding, EmbeddingError};

    #[tokio::test]
    async fn mock_embeddings_are_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let a = provider.embed("hello world").await.unwrap();
        let b = provider.embed("hello world").await.unwrap();
        let c = provider.embed("goodbye world").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), provider.dimensions());
    }

    #[derive(Clone)]
    struct HashModel;

    impl EmbeddingModel for HashModel {
        const MAX_DOCUMENTS: usize = 64;

        fn ndims(&self) -> usize {
            4
        }

        fn embed_texts(
            &self,
            texts: impl IntoIterator<Item = String> + Send,
        ) -> impl Future<Output = Result<Vec<Embedding>, EmbeddingError>> + Send {
            let docs: Vec<String> = texts.into_iter().collect();
            async move {
                Ok(docs
                    .into_iter()
                    .map(|document| Embedding {
                        vec: hash_to_vector(&document, 4)
                            .into_iter()
                            .map(f64::from)
                            .collect(),
                        document,
                    })
                    .collect())
            }
        }
    }

    #[tokio::test]
    async fn rig_adapter_exposes_model_vectors() {
        let provider = RigEmbeddingProvider::new(HashModel, "hash-model");
        let vector = provider.embed("some text").await.unwrap();
        assert_eq!(vector.len(), 4);
        assert_eq!(provider.dimensions(), 4);
        assert_eq!(provider.model_id(), "hash-model");
    }

    #[tokio::test]
    async fn backoff_retries_until_success() {
        let mut attempts = 0;
        let policy = BackoffPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let result = policy
            .run(|| {
                attempts += 1;
                let outcome = if attempts < 3 {
                    Err(RagError::Embedding("transient".to_string()))
                } else {
                    Ok(attempts)
                };
                async move { outcome }
            })
            .await
            .unwrap();
        assert_eq!(result, 3);
    }

    #[tokio::test]
    async fn backoff_gives_up_after_budget() {
        let policy = BackoffPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
        };
        let result: Result<(), _> = policy
            .run(|| async { Err(RagError::Embedding("still down".to_string())) })
            .await;
        assert!(matches!(result, Err(RagError::Embedding(_))));
    }

    #[test]
    fn missing_credential_disables_http_provider() {
        let config = ChapterConfig::default();
        let result = HttpEmbeddingProvider::from_config(&config);
        assert!(matches!(result, Err(RagError::Configuration(_))));
    }
}
