//! Generated study artifacts: quiz items built over retrieved chapter
//! context.
//!
//! The generation service is asked for strict JSON, but its output is still
//! model text: parsing is modeled as a tagged [`QuizParse`] so a malformed
//! response is carried as data instead of being scraped into a fake success.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::generation::{ChatMessage, GenerationProvider, GenerationRequest};
use crate::retriever::{Retriever, SearchOutcome};
use crate::types::RagError;

const QUIZ_TEMPERATURE: f32 = 0.8;
const QUIZ_MAX_TOKENS: u32 = 1_000;
const QUIZ_CONTEXT_CHUNKS: usize = 3;

const QUIZ_SYSTEM_PROMPT: &str = "You are an expert item writer for a \
data-mining course, skilled at designing targeted quiz questions. Output \
strictly in the requested JSON format.";

const QUIZ_PROMPT: &str = "Based on the following material about anomaly \
detection, write one quiz question.\n\n\
Requirements:\n\
1. The question type may be multiple_choice, true_false, or short_answer.\n\
2. Aim for moderate difficulty testing core concept understanding.\n\
3. For multiple_choice, give four options with exactly one correct answer.\n\
4. Always include the correct answer and an explanation.\n\n\
Output JSON in this shape:\n\
{\n\
    \"type\": \"multiple_choice | true_false | short_answer\",\n\
    \"question\": \"...\",\n\
    \"options\": [\"A. ...\", \"B. ...\", \"C. ...\", \"D. ...\"],\n\
    \"answer\": \"...\",\n\
    \"explanation\": \"...\"\n\
}\n\n\
Material:\n";

/// Fallback material used when retrieval has nothing for the topic.
const DEFAULT_PRIMER: &str = "Anomaly detection identifies data points that \
do not conform to expected patterns. Anomalies may be global (clearly \
different from the whole data set), contextual (anomalous in a specific \
context), or collective (a group that is anomalous as a whole). Detection \
methods include statistical approaches that model the distribution of normal \
data, proximity-based approaches using distance or density, and \
clustering-based approaches that treat points belonging to no cluster as \
anomalies. Common evaluation measures are precision, recall, F1, and the \
ROC curve with its AUC.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizKind {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

impl QuizKind {
    fn as_str(self) -> &'static str {
        match self {
            QuizKind::MultipleChoice => "multiple_choice",
            QuizKind::TrueFalse => "true_false",
            QuizKind::ShortAnswer => "short_answer",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuizItem {
    #[serde(rename = "type")]
    pub kind: QuizKind,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub answer: String,
    #[serde(default)]
    pub explanation: String,
}

/// Result of parsing a generated quiz response: either a validated item or
/// the raw text, never a best-effort scrape treated as success.
#[derive(Clone, Debug, PartialEq)]
pub enum QuizParse {
    Parsed(QuizItem),
    Malformed { raw: String },
}

fn json_object_span() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[\s\S]*\}").expect("static regex"))
}

/// Parses a generation response as a quiz item: direct JSON first, then a
/// single brace-delimited salvage pass for responses wrapped in prose or
/// code fences.
pub fn parse_quiz_response(content: &str) -> QuizParse {
    if let Ok(item) = serde_json::from_str::<QuizItem>(content) {
        return QuizParse::Parsed(item);
    }
    if let Some(found) = json_object_span().find(content) {
        if let Ok(item) = serde_json::from_str::<QuizItem>(found.as_str()) {
            return QuizParse::Parsed(item);
        }
    }
    QuizParse::Malformed {
        raw: content.to_string(),
    }
}

/// Verdict for a locally checkable answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnswerAssessment {
    pub correct: bool,
    pub correct_answer: String,
    pub explanation: String,
}

fn choice_letter(answer: &str) -> Option<char> {
    answer
        .trim()
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase())
        .filter(char::is_ascii_uppercase)
}

fn truthy(answer: &str) -> bool {
    matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "true" | "t" | "yes" | "y" | "correct"
    )
}

/// Checks a user's answer against the item key.
///
/// Returns `None` for short-answer items, which need grading beyond string
/// comparison.
pub fn check_answer(item: &QuizItem, user_answer: &str) -> Option<AnswerAssessment> {
    let correct = match item.kind {
        QuizKind::MultipleChoice => {
            choice_letter(user_answer).is_some()
                && choice_letter(user_answer) == choice_letter(&item.answer)
        }
        QuizKind::TrueFalse => truthy(user_answer) == truthy(&item.answer),
        QuizKind::ShortAnswer => return None,
    };
    Some(AnswerAssessment {
        correct,
        correct_answer: item.answer.clone(),
        explanation: item.explanation.clone(),
    })
}

/// Generates quiz items over retrieved chapter context.
pub struct QuizGenerator {
    retriever: Arc<Retriever>,
    generator: Arc<dyn GenerationProvider>,
}

impl QuizGenerator {
    pub fn new(retriever: Arc<Retriever>, generator: Arc<dyn GenerationProvider>) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    /// Produces one quiz item about `topic`, grounded in retrieved chunks
    /// when the knowledge base has them and in the built-in primer otherwise.
    pub async fn generate(
        &self,
        topic: &str,
        kind: Option<QuizKind>,
    ) -> Result<QuizParse, RagError> {
        let material = match self.retriever.search(topic, Some(QUIZ_CONTEXT_CHUNKS)).await? {
            SearchOutcome::Ranked(hits) if !hits.is_empty() => hits
                .iter()
                .map(|hit| hit.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            _ => DEFAULT_PRIMER.to_string(),
        };

        let instruction = match kind {
            Some(kind) => format!("\n\nWrite one {} question.", kind.as_str()),
            None => "\n\nWrite one question of any listed type.".to_string(),
        };
        let request = GenerationRequest {
            messages: vec![
                ChatMessage::system(QUIZ_SYSTEM_PROMPT),
                ChatMessage::user(format!("{QUIZ_PROMPT}{material}{instruction}")),
            ],
            temperature: QUIZ_TEMPERATURE,
            max_tokens: QUIZ_MAX_TOKENS,
        };

        let content = self.generator.complete(&request).await?;
        Ok(parse_quiz_response(&content))
    }
}
