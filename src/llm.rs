//! Chat model seam shared by the router, graders and generator.
//!
//! Providers are black boxes behind [`ChatModel`]; the chains only build
//! prompts and parse structured replies.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{ProviderSettings, LLM_MAX_OUTPUT_TOKENS, LLM_TEMPERATURE};
use crate::integrations::{GeminiClient, OllamaClient};
use crate::{Error, Result};

/// One system + user exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// JSON schema the reply must follow, when structured output is wanted.
    pub json_schema: Option<serde_json::Value>,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: LLM_TEMPERATURE,
            max_tokens: LLM_MAX_OUTPUT_TOKENS,
            json_schema: None,
        }
    }

    /// Ask for a JSON reply shaped like `T`.
    pub fn structured<T: JsonSchema>(mut self) -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
        self.system.push_str(&format!(
            "\n\nRespond with a single JSON object that matches this JSON schema, and nothing else:\n{}",
            schema
        ));
        self.json_schema = Some(schema);
        self
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Return the raw text of the model's reply.
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

#[async_trait]
impl<M: ChatModel + ?Sized> ChatModel for &M {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        (**self).complete(request).await
    }
}

/// Parse a structured reply, tolerating Markdown fences and chatter around the object.
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let trimmed = strip_code_fence(raw.trim());

    if let Ok(value) = serde_json::from_str::<T>(trimmed) {
        return Ok(value);
    }

    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| Error::MalformedResponse(format!("{}: {}", e, raw))),
        _ => Err(Error::MalformedResponse(format!("no JSON object in reply: {}", raw))),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Send a structured request and decode the reply.
pub async fn complete_structured<T, M>(model: &M, request: ChatRequest) -> Result<T>
where
    T: DeserializeOwned + JsonSchema,
    M: ChatModel + ?Sized,
{
    let request = request.structured::<T>();
    let raw = model.complete(&request).await?;
    debug!(reply_len = raw.len(), "Structured reply received");
    parse_structured(&raw)
}

/// Provider selected by `LLM_PROVIDER`.
#[derive(Debug, Clone)]
pub enum LlmClient {
    Gemini(GeminiClient),
    Ollama(OllamaClient),
}

impl LlmClient {
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        match settings {
            ProviderSettings::Gemini {
                api_key,
                model,
                embedding_model,
            } => Ok(LlmClient::Gemini(
                GeminiClient::new(api_key.clone(), model)?.with_embedding_model(embedding_model),
            )),
            ProviderSettings::Ollama {
                base_url,
                model,
                embedding_model,
            } => Ok(LlmClient::Ollama(
                OllamaClient::with_url(base_url)?
                    .with_model(model)
                    .with_embedding_model(embedding_model),
            )),
        }
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        match self {
            LlmClient::Gemini(client) => client.complete(request).await,
            LlmClient::Ollama(client) => client.complete(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Probe {
        ok: bool,
    }

    #[test]
    fn parses_plain_json() {
        let probe: Probe = parse_structured(r#"{"ok": true}"#).unwrap();
        assert_eq!(probe, Probe { ok: true });
    }

    #[test]
    fn parses_fenced_json() {
        let probe: Probe = parse_structured("```json\n{\"ok\": false}\n```").unwrap();
        assert_eq!(probe, Probe { ok: false });
    }

    #[test]
    fn parses_json_surrounded_by_text() {
        let probe: Probe = parse_structured("Here you go: {\"ok\": true} hope it helps").unwrap();
        assert!(probe.ok);
    }

    #[test]
    fn rejects_reply_without_object() {
        let err = parse_structured::<Probe>("yes").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn structured_request_carries_schema() {
        let request = ChatRequest::new("grade", "input").structured::<Probe>();
        let schema = request.json_schema.expect("schema attached");
        assert!(schema.to_string().contains("\"ok\""));
        assert!(request.system.contains("JSON schema"));
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.max_tokens, 200);
    }
}
