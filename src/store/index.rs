//! Persisted embedding index and the document store built on it.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::chunker::{Chunk, Chunker};
use super::embedder::{cosine_similarity, Embedder};
use super::DocumentStore;
use crate::config::ProviderSettings;
use crate::graph::state::Passage;
use crate::{Error, Result};

/// Stored chunk with its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub source: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// On-disk index: every chunk and its embedding, plus the model that made them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedIndex {
    pub embedding_model: String,
    pub dimension: usize,
    pub entries: Vec<IndexEntry>,
}

impl PersistedIndex {
    pub fn new(embedding_model: impl Into<String>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            dimension: 0,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Index(format!(
                "cannot read index {} ({}); run the ingest binary first",
                path.display(),
                e
            ))
        })?;
        let index: PersistedIndex = serde_json::from_str(&content)?;
        debug!(path = %path.display(), entries = index.len(), "Loaded index");
        Ok(index)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(self)?)?;
        info!(path = %path.display(), entries = self.len(), "Saved index");
        Ok(())
    }

    /// Append chunks with their vectors. All vectors must share one dimension.
    pub fn extend(&mut self, chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<usize> {
        if chunks.len() != embeddings.len() {
            return Err(Error::Index(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            if self.dimension == 0 {
                self.dimension = embedding.len();
            } else if embedding.len() != self.dimension {
                return Err(Error::Index(format!(
                    "embedding dimension {} does not match index dimension {}",
                    embedding.len(),
                    self.dimension
                )));
            }
            self.entries.push(IndexEntry {
                source: chunk.source,
                text: chunk.text,
                embedding,
            });
        }
        Ok(self.entries.len())
    }

    /// Top `limit` entries by cosine similarity, best first.
    pub fn nearest(&self, query: &[f32], limit: usize) -> Vec<(f32, &IndexEntry)> {
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query, &entry.embedding), entry))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }

    /// Chunk, embed and index documents given as `(source, text)` pairs.
    pub async fn ingest(
        &mut self,
        docs: &[(String, String)],
        chunker: &Chunker,
        embedder: &Embedder,
        batch_size: usize,
    ) -> Result<usize> {
        let chunks: Vec<Chunk> = docs
            .iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .flat_map(|(source, text)| chunker.chunk(text, source.clone()))
            .collect();

        let batch_size = batch_size.max(1);
        for (idx, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = embedder.embed(&texts).await?;
            self.extend(batch.to_vec(), embeddings)?;
            debug!(batch = idx + 1, size = batch.len(), total = self.len(), "Indexed batch");
        }

        Ok(self.len())
    }
}

/// Document store answering queries from a loaded index.
pub struct IndexedStore {
    index: PersistedIndex,
    embedder: Embedder,
    top_k: usize,
}

impl IndexedStore {
    /// Fails when the index was built with another embedding model.
    pub fn new(index: PersistedIndex, embedder: Embedder, top_k: usize) -> Result<Self> {
        let model = embedder.model_name();
        if index.embedding_model != model {
            return Err(Error::Index(format!(
                "index was built with '{}' but the configured embedding model is '{}'",
                index.embedding_model, model
            )));
        }
        Ok(Self {
            index,
            embedder,
            top_k: top_k.max(1),
        })
    }

    /// Load the index at `path` and pair it with an embedder that matches it.
    pub fn open<P: AsRef<Path>>(path: P, provider: &ProviderSettings, top_k: usize) -> Result<Self> {
        let index = PersistedIndex::load(path)?;
        let embedder = Embedder::for_index(&index.embedding_model, provider)?;
        Self::new(index, embedder, top_k)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }
}

#[async_trait]
impl DocumentStore for IndexedStore {
    async fn search(&self, query: &str) -> Result<Vec<Passage>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let hits = self.index.nearest(&query_embedding, self.top_k);
        debug!(hits = hits.len(), "Index search finished");

        Ok(hits
            .into_iter()
            .map(|(_, entry)| Passage::new(entry.text.clone()).with_source(entry.source.clone()))
            .collect())
    }
}
