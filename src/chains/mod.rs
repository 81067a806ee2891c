//! Classification and generation contracts used by the orchestrator.
//!
//! Each contract is a trait so the state machine can be driven by scripted
//! implementations in tests; the `Llm*` types implement them on top of a
//! [`ChatModel`](crate::llm::ChatModel) with rate-limit retries.

pub mod answer_grader;
pub mod generation;
pub mod relevance;
pub mod router;

use async_trait::async_trait;

use crate::graph::state::{Passage, RouteDecision};
use crate::Result;

pub use answer_grader::{AnswerVerdict, LlmAnswerGrader, Verdict};
pub use generation::{LlmAnswerGenerator, REFUSAL};
pub use relevance::LlmRelevanceGrader;
pub use router::LlmRouter;

/// Picks the retrieval backend for a question.
#[async_trait]
pub trait Router: Send + Sync {
    async fn route(&self, question: &str) -> Result<RouteDecision>;
}

/// Judges every passage against the question in one batch.
#[async_trait]
pub trait RelevanceGrader: Send + Sync {
    /// One flag per input passage, in input order.
    async fn grade(&self, question: &str, passages: &[Passage]) -> Result<Vec<bool>>;
}

/// Writes a short grounded answer.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, question: &str, passages: &[Passage], is_retry: bool) -> Result<String>;
}

/// Judges a generated answer for groundedness and usefulness.
#[async_trait]
pub trait AnswerGrader: Send + Sync {
    async fn grade(&self, question: &str, passages: &[Passage], generation: &str) -> Result<AnswerVerdict>;
}

/// Cut `text` to at most `max_chars` characters, marking the cut with an ellipsis.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Serialize passages into one context blob: blank entries skipped, each body
/// truncated, provenance prefixed when known.
///
/// Web results are appended to the passage list, so the newest `max_docs`
/// entries are kept, in their original order.
pub(crate) fn format_context(passages: &[Passage], max_docs: usize, max_chars: usize) -> String {
    let non_blank: Vec<&Passage> = passages.iter().filter(|p| !p.is_blank()).collect();
    let skip = non_blank.len().saturating_sub(max_docs);
    non_blank[skip..]
        .iter()
        .map(|p| {
            let body = truncate_chars(p.content.trim(), max_chars);
            match &p.source {
                Some(source) => format!("[source: {}]\n{}", source, body),
                None => body,
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
