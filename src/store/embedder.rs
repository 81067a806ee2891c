//! Embedding backends for the document index.

use tracing::debug;

use crate::config::ProviderSettings;
use crate::integrations::{GeminiClient, OllamaClient};
use crate::Result;

/// Name recorded in the index for the hashing embedder.
pub const LOCAL_EMBEDDING_MODEL: &str = "local-hash";

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a. Local vectors are persisted, so token slots must not
/// depend on the toolchain's hasher.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// Dimension of a `local-hash-N` model name.
pub fn local_dimension(model_name: &str) -> Option<usize> {
    model_name
        .strip_prefix(LOCAL_EMBEDDING_MODEL)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

#[derive(Debug, Clone)]
pub enum Embedder {
    Gemini(GeminiClient),
    Ollama(OllamaClient),
    Local(LocalEmbedder),
}

impl Embedder {
    /// Embedder for the configured provider.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        match settings {
            ProviderSettings::Gemini {
                api_key,
                model,
                embedding_model,
            } => Ok(Embedder::Gemini(
                GeminiClient::new(api_key.clone(), model)?.with_embedding_model(embedding_model),
            )),
            ProviderSettings::Ollama {
                base_url,
                embedding_model,
                ..
            } => Ok(Embedder::Ollama(
                OllamaClient::with_url(base_url)?.with_embedding_model(embedding_model),
            )),
        }
    }

    pub fn local(dim: usize) -> Self {
        Embedder::Local(LocalEmbedder::new(dim))
    }

    /// Embedder able to query an index built with `model_name`: the hashing
    /// embedder for `local-hash-N` indexes, the provider otherwise.
    pub fn for_index(model_name: &str, settings: &ProviderSettings) -> Result<Self> {
        match local_dimension(model_name) {
            Some(dim) => Ok(Embedder::local(dim)),
            None => Self::from_settings(settings),
        }
    }

    /// Identifier stored alongside the vectors; queries must use the same model.
    pub fn model_name(&self) -> String {
        match self {
            Embedder::Gemini(client) => client.embedding_model().to_string(),
            Embedder::Ollama(client) => client.embedding_model().to_string(),
            Embedder::Local(local) => format!("{}-{}", LOCAL_EMBEDDING_MODEL, local.dimension()),
        }
    }

    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(count = texts.len(), model = %self.model_name(), "Embedding texts");
        match self {
            Embedder::Gemini(client) => client.embed_batch(texts).await,
            Embedder::Ollama(client) => client.embed_batch(texts).await,
            Embedder::Local(local) => Ok(texts.iter().map(|t| local.embed(t)).collect()),
        }
    }
}

/// Deterministic, fast embedding for offline/local use.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dim: usize,
}

impl LocalEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dim];
        for token in text.split_whitespace() {
            let token: String = token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            if token.is_empty() {
                continue;
            }
            let idx = (fnv1a(token.as_bytes()) % self.dim as u64) as usize;
            vec[idx] += 1.0;
        }

        normalize(&mut vec);
        vec
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}
