//! Ollama client for local LLM inference and embeddings.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::llm::{ChatModel, ChatRequest};
use crate::{Error, Result};

const DEFAULT_MODEL: &str = "llama3.1:8b";
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Ollama client for local LLM.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl OllamaClient {
    /// Create client with custom URL.
    pub fn with_url(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Provider(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_embedding_model(mut self, model: &str) -> Self {
        self.embedding_model = model.to_string();
        self
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Chat with model.
    pub async fn chat(&self, request: &ChatRequest) -> Result<String> {
        let payload = OllamaChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user.clone(),
                },
            ],
            stream: false,
            format: request.json_schema.clone(),
            options: ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let text = self.post("/api/chat", &payload).await?;
        let result: OllamaChatResponse = serde_json::from_str(&text)
            .map_err(|e| Error::MalformedResponse(format!("Invalid Ollama response: {} - {}", e, text)))?;

        Ok(result.message.content)
    }

    /// Embed a batch of texts.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let payload = EmbedRequest {
            model: self.embedding_model.clone(),
            input: texts.to_vec(),
        };

        let text = self.post("/api/embed", &payload).await?;
        let result: EmbedResponse = serde_json::from_str(&text)
            .map_err(|e| Error::MalformedResponse(format!("Invalid embedding response: {}", e)))?;

        if result.embeddings.len() != texts.len() {
            return Err(Error::Provider(format!(
                "Ollama returned {} embeddings for {} texts",
                result.embeddings.len(),
                texts.len()
            )));
        }
        Ok(result.embeddings)
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, payload: &T) -> Result<String> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::rate_limited(format!("Ollama error {}: {}", status, text)));
        }
        if !status.is_success() {
            return Err(Error::Provider(format!("Ollama error {}: {}", status, text)));
        }
        Ok(text)
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.chat(request).await
    }
}

/// Chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}
