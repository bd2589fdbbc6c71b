//! Page-tagged, size-bounded chunking of extracted chapter text.
//!
//! Input text is paragraph-segmented on blank lines. A paragraph may carry an
//! inline `[page N]` marker left by chapter assembly; the marker updates the
//! running page and is stripped before accumulation. Paragraphs accumulate
//! into a buffer until the next one would reach the size bound, at which point
//! the buffer flushes as one chunk and the tail of the flushed text seeds the
//! next buffer as verbatim overlap.
//!
//! All sizes are counted in characters, not bytes, so multi-byte scripts never
//! split inside a code point.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ChapterConfig;

/// A bounded, page-tagged segment of chapter text; the atomic retrieval unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Segment content with page markers stripped. Never empty.
    pub text: String,
    /// 1-based scanned page most recently seen before or within this chunk.
    pub page: u32,
    /// Position in the ingestion run, starting at 0.
    pub chunk_id: u32,
    /// Chapter this knowledge store represents.
    pub chapter: u32,
    /// Human-readable provenance, static per chapter.
    pub source_label: String,
}

/// Bounds and identity applied to one chunking run.
#[derive(Clone, Debug)]
pub struct ChunkerSettings {
    /// Flush threshold in characters. A buffer flushes when appending the
    /// next paragraph would reach this bound.
    pub max_chunk_chars: usize,
    /// Verbatim overlap carried from the tail of each flushed chunk into the
    /// next one, when the flushed chunk was longer than this.
    pub overlap_chars: usize,
    /// Page assigned to text seen before the first marker.
    pub start_page: u32,
    pub chapter: u32,
    pub source_label: String,
}

impl ChunkerSettings {
    pub fn from_config(config: &ChapterConfig) -> Self {
        Self {
            max_chunk_chars: config.chunk_size,
            overlap_chars: config.overlap_size,
            start_page: config.start_page,
            chapter: config.chapter_number,
            source_label: config.source_label.clone(),
        }
    }
}

fn page_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[page (\d+)\]\n?").expect("static regex"))
}

fn char_count(text: &str) -> usize {
    text.chars().count()
}

/// Last `n` characters of `text`, or all of it when shorter.
fn tail_chars(text: &str, n: usize) -> &str {
    let total = text.chars().count();
    if total <= n {
        return text;
    }
    text.char_indices()
        .nth(total - n)
        .map(|(idx, _)| &text[idx..])
        .unwrap_or(text)
}

/// Fold state for one chunking run: the sticky page, the accumulating buffer,
/// and the chunks emitted so far.
struct ChunkAccumulator {
    settings: ChunkerSettings,
    page: u32,
    buffer: String,
    buffer_chars: usize,
    next_chunk_id: u32,
    chunks: Vec<Chunk>,
}

impl ChunkAccumulator {
    fn new(settings: ChunkerSettings) -> Self {
        let page = settings.start_page;
        Self {
            settings,
            page,
            buffer: String::new(),
            buffer_chars: 0,
            next_chunk_id: 0,
            chunks: Vec::new(),
        }
    }

    fn accept(&mut self, raw_paragraph: &str) {
        if let Some(captures) = page_marker().captures(raw_paragraph) {
            if let Ok(page) = captures[1].parse() {
                self.page = page;
            }
        }
        let stripped = page_marker().replace_all(raw_paragraph, "");
        let paragraph = stripped.trim();
        if paragraph.is_empty() {
            return;
        }

        let paragraph_chars = char_count(paragraph);
        if self.buffer_chars + paragraph_chars >= self.settings.max_chunk_chars {
            if let Some(seed) = self.flush() {
                self.buffer_chars = char_count(&seed);
                self.buffer = seed;
            }
        }
        self.append(paragraph, paragraph_chars);
    }

    fn append(&mut self, paragraph: &str, paragraph_chars: usize) {
        if !self.buffer.is_empty() {
            self.buffer.push_str("\n\n");
            self.buffer_chars += 2;
        }
        self.buffer.push_str(paragraph);
        self.buffer_chars += paragraph_chars;
    }

    /// Emits the buffered text as a chunk and returns the overlap seed for
    /// the next buffer, if the flushed text was long enough to provide one.
    fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.buffer);
        let flushed_chars = self.buffer_chars;
        self.buffer_chars = 0;

        let seed = (flushed_chars > self.settings.overlap_chars)
            .then(|| tail_chars(&text, self.settings.overlap_chars).to_string());

        self.chunks.push(Chunk {
            text,
            page: self.page,
            chunk_id: self.next_chunk_id,
            chapter: self.settings.chapter,
            source_label: self.settings.source_label.clone(),
        });
        self.next_chunk_id += 1;
        seed
    }

    fn finish(mut self) -> Vec<Chunk> {
        self.flush();
        self.chunks
    }
}

/// Splits extracted chapter text into page-tagged, overlap-preserving chunks.
///
/// Paragraph boundaries are never split: a single paragraph longer than the
/// size bound becomes its own oversized chunk. Empty or whitespace-only input
/// yields an empty sequence.
pub fn chunk_chapter(text: &str, settings: &ChunkerSettings) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut accumulator = ChunkAccumulator::new(settings.clone());
    for paragraph in text.split("\n\n") {
        accumulator.accept(paragraph);
    }
    accumulator.finish()
}
