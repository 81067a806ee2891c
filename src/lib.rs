//! Agentic RAG Library
//!
//! This library answers a question by:
//! - Routing it to a local document index or to live web search
//! - Grading retrieved passages for relevance, falling back to web search
//! - Generating a short grounded answer
//! - Grading the answer and retrying or widening the search when it falls short
//!
//! The orchestration lives in [`graph`]; the LLM-backed contracts in [`chains`].

pub mod chains;
pub mod config;
pub mod error;
pub mod graph;
pub mod integrations;
pub mod llm;
pub mod retry;
pub mod store;
pub mod websearch;

#[cfg(test)]
mod testing;

// Re-export common types
pub use config::{PipelineLimits, Settings};
pub use error::{Error, Result};
pub use graph::{Components, Passage, Pipeline, RequestState, RunRecord, Workflow};
pub use integrations::{GeminiClient, OllamaClient, TavilyClient};
