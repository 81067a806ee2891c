//! Document store backed by a persisted embedding index.
//!
//! - `chunker` splits source text into word windows
//! - `embedder` turns text into vectors (provider or local hashing)
//! - `index` persists chunks with their vectors and answers similarity queries
//! - `loader` reads files and web pages for ingestion

pub mod chunker;
pub mod embedder;
pub mod index;
pub mod loader;

use async_trait::async_trait;

use crate::graph::state::Passage;
use crate::Result;

pub use chunker::{Chunk, Chunker};
pub use embedder::{Embedder, LocalEmbedder};
pub use index::{IndexEntry, IndexedStore, PersistedIndex};

/// Searches embedded text chunks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Passages most similar to `query`, best first.
    async fn search(&self, query: &str) -> Result<Vec<Passage>>;
}
