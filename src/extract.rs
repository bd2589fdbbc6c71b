//! Chapter-text assembly over the page-recognition oracle.
//!
//! The optical-recognition step that turns a scanned page into text lives
//! outside this crate; it is consumed here through [`PageTextSource`]. The
//! assembly keeps the page provenance the chunker needs by prefixing each
//! page's text with a `[page N]` marker, and drops pages the oracle could not
//! read rather than failing the whole chapter.

use std::ops::RangeInclusive;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{info, warn};

/// Source of recognized text for scanned pages.
///
/// An empty string means the page yielded no usable content; the assembler
/// omits it. Implementations absorb their own transport failures into that
/// empty-string contract.
#[async_trait]
pub trait PageTextSource: Send + Sync {
    async fn recognize_page(&self, page: u32) -> String;
}

fn blank_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("static regex"))
}

fn space_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" {2,}").expect("static regex"))
}

/// Collapses recognition artifacts: runs of blank lines become one paragraph
/// break, runs of spaces become one space.
pub fn normalize_page_text(text: &str) -> String {
    let collapsed = blank_runs().replace_all(text, "\n\n");
    space_runs().replace_all(&collapsed, " ").trim().to_string()
}

/// Assembles the chapter text for `pages`, tagging each usable page with a
/// `[page N]` marker and joining pages with blank lines.
///
/// Returns an empty string when no page produced content; the ingestion layer
/// treats that as a failed rebuild.
pub async fn assemble_chapter_text<S: PageTextSource + ?Sized>(
    source: &S,
    pages: RangeInclusive<u32>,
) -> String {
    let mut parts = Vec::new();
    for page in pages {
        let raw = source.recognize_page(page).await;
        let text = normalize_page_text(&raw);
        if text.is_empty() {
            warn!(page, "page produced no usable text, skipping");
            continue;
        }
        parts.push(format!("[page {page}]\n{text}"));
    }
    info!(pages = parts.len(), "assembled chapter text");
    parts.join("\n\n")
}
