//! External integrations module.
//!
//! Provides clients for:
//! - Google Gemini (chat, embeddings)
//! - Ollama (local LLM, embeddings)
//! - Tavily (web search)

pub mod gemini;
pub mod ollama;
pub mod tavily;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use tavily::TavilyClient;
