//! Answer synthesis.
//!
//! Turns retrieved evidence and the user's question into a natural-language
//! answer. Evidence is passed in the order the retriever ranked it; the
//! synthesizer does not re-rank.

mod openai;

pub use openai::OpenAISynthesizer;

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;

/// A synthesized answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// Answer text.
    pub text: String,
    /// Frames the answer was based on.
    pub image_count: usize,
    /// Caption passages the answer was based on.
    pub text_count: usize,
}

/// Produces answers from frames and caption passages.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn synthesize(&self, images: &[PathBuf], texts: &[String], query: &str) -> Result<Answer>;
}

/// Number each caption passage for the prompt.
pub fn format_captions(texts: &[String]) -> String {
    if texts.is_empty() {
        return "(no caption passages)".to_string();
    }

    texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("[{}] {}", i + 1, text))
        .collect::<Vec<_>>()
        .join("\n")
}
