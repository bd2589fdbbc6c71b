//! Chat-completion provider seam.
//!
//! Answer synthesis and quiz generation both speak to the generation service
//! through [`GenerationProvider`]: one request carrying role-tagged messages,
//! a temperature, and a max-token bound; one text completion back. The HTTP
//! implementation targets an OpenAI-compatible `/chat/completions` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ChapterConfig;
use crate::types::RagError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// One generation call: ordered messages plus sampling bounds.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Produces a single text completion for a [`GenerationRequest`].
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, RagError>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct HttpGenerationProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct CompletionPayload<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

impl HttpGenerationProvider {
    /// Fails with [`RagError::Configuration`] when no credential is set; the
    /// caller surfaces that as a disabled answering feature.
    pub fn from_config(config: &ChapterConfig) -> Result<Self, RagError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            RagError::Configuration("generation service credential is not set".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.generation_model.clone(),
        })
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, RagError> {
        let payload = CompletionPayload {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| RagError::Generation(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "completion request failed ({status}): {body}"
            )));
        }

        let completion: Completion = response
            .json()
            .await
            .map_err(|err| RagError::Generation(err.to_string()))?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| RagError::Generation("response carried no completion".to_string()))
    }
}

/// Canned completions for tests: returns a fixed answer, or a fixed error.
pub struct MockGenerationProvider {
    response: Result<String, String>,
}

impl MockGenerationProvider {
    pub fn answering(answer: impl Into<String>) -> Self {
        Self {
            response: Ok(answer.into()),
        }
    }

    pub fn failing(cause: impl Into<String>) -> Self {
        Self {
            response: Err(cause.into()),
        }
    }
}

#[async_trait]
impl GenerationProvider for MockGenerationProvider {
    async fn complete(&self, _request: &GenerationRequest) -> Result<String, RagError> {
        match &self.response {
            Ok(answer) => Ok(answer.clone()),
            Err(cause) => Err(RagError::Generation(cause.clone())),
        }
    }
}
