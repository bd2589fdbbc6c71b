//! Grounded answer assembly with page-accurate citations.
//!
//! Retrieved chunks become numbered context blocks, each annotated with both
//! its scanned page and the printed-book page derived from the configured
//! offset. Citations are computed locally before the generation call, so a
//! generation failure still returns its sources.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ChapterConfig;
use crate::generation::{ChatMessage, GenerationProvider, GenerationRequest};
use crate::stores::ScoredChunk;

const ANSWER_TEMPERATURE: f32 = 0.7;
const ANSWER_MAX_TOKENS: u32 = 2_000;
const PREVIEW_CHARS: usize = 100;

/// Page-attributed provenance for one retrieved chunk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based page in the scanned source document.
    pub source_page: u32,
    /// Printed-book page: `source_page - page_offset`.
    pub book_page: i64,
    /// Bounded-length prefix of the chunk text.
    pub preview: String,
}

/// A synthesized answer with the citations that grounded it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChapterAnswer {
    pub answer: String,
    pub sources: Vec<Citation>,
}

fn preview_of(text: &str) -> String {
    let mut preview: String = text.chars().take(PREVIEW_CHARS).collect();
    if preview.len() < text.len() {
        preview.push_str("...");
    }
    preview
}

/// Builds grounded prompts and produces cited answers.
pub struct AnswerSynthesizer {
    generator: Arc<dyn GenerationProvider>,
    system_prompt: String,
    page_offset: i64,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn GenerationProvider>, config: &ChapterConfig) -> Self {
        Self {
            generator,
            system_prompt: config.system_prompt.clone(),
            page_offset: config.page_offset,
        }
    }

    /// Derives the numbered context text and citation list for `chunks`,
    /// preserving retrieval order.
    fn build_context(&self, chunks: &[ScoredChunk]) -> (String, Vec<Citation>) {
        let mut blocks = Vec::with_capacity(chunks.len());
        let mut citations = Vec::with_capacity(chunks.len());

        for (index, chunk) in chunks.iter().enumerate() {
            let source_page = chunk.metadata.page;
            let book_page = source_page as i64 - self.page_offset;
            blocks.push(format!(
                "[Reference {}, scanned page {} / printed page {}]\n{}",
                index + 1,
                source_page,
                book_page,
                chunk.text
            ));
            citations.push(Citation {
                source_page,
                book_page,
                preview: preview_of(&chunk.text),
            });
        }

        (blocks.join("\n\n"), citations)
    }

    fn build_request(&self, query: &str, context: &str) -> GenerationRequest {
        let user_message = format!(
            "Answer the question using the reference material below. When \
             answering:\n\
             1. Quote the material accurately.\n\
             2. Cite your sources inline (e.g. \"according to page X...\").\n\
             3. If the material does not cover the question, say so honestly.\n\n\
             Reference material:\n{context}\n\n\
             Question: {query}\n\n\
             Give a detailed, accurate answer:"
        );
        GenerationRequest {
            messages: vec![
                ChatMessage::system(self.system_prompt.clone()),
                ChatMessage::user(user_message),
            ],
            temperature: ANSWER_TEMPERATURE,
            max_tokens: ANSWER_MAX_TOKENS,
        }
    }

    /// Produces a cited answer from the retrieved context.
    ///
    /// A generation-service failure degrades to an answer string describing
    /// the cause; the citations were computed locally and are returned either
    /// way.
    pub async fn answer(&self, query: &str, chunks: &[ScoredChunk]) -> ChapterAnswer {
        let (context, sources) = self.build_context(chunks);
        let request = self.build_request(query, &context);

        match self.generator.complete(&request).await {
            Ok(answer) => ChapterAnswer { answer, sources },
            Err(err) => {
                warn!(error = %err, "answer generation failed");
                ChapterAnswer {
                    answer: format!("Failed to generate an answer: {err}"),
                    sources,
                }
            }
        }
    }
}
