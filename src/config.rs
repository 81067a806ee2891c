//! Runtime configuration: provider selection, credentials and pipeline limits.
//!
//! Provider settings come from the environment (optionally seeded from `.env`).
//! Pipeline limits have compiled defaults and may be overridden by `rag.yml`,
//! where `${VAR}` placeholders are resolved from the environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::graph::state::Datasource;
use crate::retry::{RetryPolicy, DEFAULT_RETRY_DELAY_SECS};
use crate::{Error, Result};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_GEMINI_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_OLLAMA_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_INDEX_PATH: &str = ".rag/index.json";
pub const LIMITS_FILE: &str = "rag.yml";
/// Upper bound for `rate_limit_default_delay_secs`.
pub const MAX_RATE_LIMIT_DELAY_SECS: f64 = 3600.0;

/// Sampling settings shared by every chain.
pub const LLM_TEMPERATURE: f32 = 0.0;
pub const LLM_MAX_OUTPUT_TOKENS: u32 = 200;

/// Supported chat providers (`LLM_PROVIDER`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    Ollama,
}

impl FromStr for LlmProvider {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "gemini" => Ok(LlmProvider::Gemini),
            "ollama" => Ok(LlmProvider::Ollama),
            other => Err(Error::Config(format!(
                "Unsupported LLM_PROVIDER '{}'. Supported values are: 'gemini', 'ollama'.",
                other
            ))),
        }
    }
}

/// Provider-specific model identifiers and credentials.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderSettings {
    Gemini {
        api_key: String,
        model: String,
        embedding_model: String,
    },
    Ollama {
        base_url: String,
        model: String,
        embedding_model: String,
    },
}

impl ProviderSettings {
    pub fn provider(&self) -> LlmProvider {
        match self {
            ProviderSettings::Gemini { .. } => LlmProvider::Gemini,
            ProviderSettings::Ollama { .. } => LlmProvider::Ollama,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ProviderSettings::Gemini { model, .. } | ProviderSettings::Ollama { model, .. } => {
                model.as_str()
            }
        }
    }

    pub fn embedding_model(&self) -> &str {
        match self {
            ProviderSettings::Gemini {
                embedding_model, ..
            }
            | ProviderSettings::Ollama {
                embedding_model, ..
            } => embedding_model.as_str(),
        }
    }
}

/// What the orchestrator does when the router call itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterFailurePolicy {
    /// Surface the error and fail the run.
    #[default]
    Fail,
    Vectorstore,
    Websearch,
}

impl RouterFailurePolicy {
    pub fn fallback(&self) -> Option<Datasource> {
        match self {
            RouterFailurePolicy::Fail => None,
            RouterFailurePolicy::Vectorstore => Some(Datasource::Vectorstore),
            RouterFailurePolicy::Websearch => Some(Datasource::Websearch),
        }
    }
}

/// Caps and budgets applied by the graders, the generator and the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineLimits {
    /// Relevant passages kept after grading.
    pub max_docs_to_keep: usize,
    /// Per-passage truncation before relevance grading.
    pub max_chars_per_doc: usize,
    /// Passages submitted in one relevance call.
    pub max_docs_to_grade: usize,
    /// Passages serialized into the generation/answer-grading context.
    pub max_context_docs: usize,
    /// Per-passage truncation in the generation context.
    pub max_context_chars: usize,
    /// `not_supported` verdicts tolerated before falling back to web search.
    pub max_generation_retries: u32,
    /// Nodes executed per run before giving up.
    pub max_steps: usize,
    pub web_results: usize,
    pub retrieve_top_k: usize,
    pub on_router_failure: RouterFailurePolicy,
    pub rate_limit_default_delay_secs: f64,
    /// Topics the router treats as covered by the index; defaults to the built-in list.
    pub index_topics: Option<String>,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            max_docs_to_keep: 4,
            max_chars_per_doc: 2500,
            max_docs_to_grade: 12,
            max_context_docs: 6,
            max_context_chars: 1800,
            max_generation_retries: 2,
            max_steps: 16,
            web_results: 3,
            retrieve_top_k: 4,
            on_router_failure: RouterFailurePolicy::Fail,
            rate_limit_default_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            index_topics: None,
        }
    }
}

static ENV_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid"));

/// Replace `${VAR}` with the variable's value; unknown variables are left as-is.
fn expand_env_placeholders(content: &str) -> String {
    ENV_PLACEHOLDER
        .replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

impl PipelineLimits {
    /// Load `rag.yml` from the current or parent directory, or fall back to defaults.
    pub fn discover() -> Result<Self> {
        for candidate in [PathBuf::from(LIMITS_FILE), PathBuf::from("..").join(LIMITS_FILE)] {
            if candidate.exists() {
                return Self::load_from_file(&candidate);
            }
        }
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let limits: PipelineLimits = serde_yaml::from_str(&expand_env_placeholders(&content))?;
        limits.validate()?;
        Ok(limits)
    }

    fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(Error::Config("max_steps must be at least 1".into()));
        }
        if self.max_docs_to_grade == 0 || self.max_context_docs == 0 {
            return Err(Error::Config(
                "max_docs_to_grade and max_context_docs must be at least 1".into(),
            ));
        }
        let delay = self.rate_limit_default_delay_secs;
        if !delay.is_finite() || !(0.0..=MAX_RATE_LIMIT_DELAY_SECS).contains(&delay) {
            return Err(Error::Config(format!(
                "rate_limit_default_delay_secs must be between 0 and {}",
                MAX_RATE_LIMIT_DELAY_SECS
            )));
        }
        if self.index_topics.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(Error::Config("index_topics must not be empty".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::default();
        match Duration::try_from_secs_f64(self.rate_limit_default_delay_secs) {
            Ok(delay) => policy.with_default_delay(delay),
            Err(_) => policy,
        }
    }
}

/// Everything the CLI needs to assemble a pipeline.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub tavily_api_key: Option<String>,
    pub index_path: PathBuf,
    pub limits: PipelineLimits,
}

impl Settings {
    /// Validate the process environment. Fails fast on a missing or unknown provider.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::from_lookup(|key| std::env::var(key).ok())?;
        settings.limits = PipelineLimits::discover()?;
        Ok(settings)
    }

    /// Build settings from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = get("LLM_PROVIDER").ok_or_else(|| {
            Error::Config(
                "Missing required environment variable: LLM_PROVIDER (expected 'gemini' or 'ollama')."
                    .into(),
            )
        })?;

        let provider = match provider.parse::<LlmProvider>()? {
            LlmProvider::Gemini => {
                let model = get("GEMINI_MODEL").ok_or_else(|| {
                    Error::Config("LLM_PROVIDER='gemini' requires GEMINI_MODEL to be set.".into())
                })?;
                let api_key = get("GEMINI_API_KEY").ok_or_else(|| {
                    Error::Config("LLM_PROVIDER='gemini' requires GEMINI_API_KEY to be set.".into())
                })?;
                ProviderSettings::Gemini {
                    api_key,
                    model,
                    embedding_model: get("EMBEDDING_MODEL")
                        .unwrap_or_else(|| DEFAULT_GEMINI_EMBEDDING_MODEL.to_string()),
                }
            }
            LlmProvider::Ollama => {
                let model = get("OLLAMA_MODEL").ok_or_else(|| {
                    Error::Config("LLM_PROVIDER='ollama' requires OLLAMA_MODEL to be set.".into())
                })?;
                ProviderSettings::Ollama {
                    base_url: get("OLLAMA_BASE_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
                    model,
                    embedding_model: get("EMBEDDING_MODEL")
                        .unwrap_or_else(|| DEFAULT_OLLAMA_EMBEDDING_MODEL.to_string()),
                }
            }
        };

        Ok(Self {
            provider,
            tavily_api_key: get("TAVILY_API_KEY"),
            index_path: get("RAG_INDEX_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_PATH)),
            limits: PipelineLimits::default(),
        })
    }

    pub fn require_tavily_key(&self) -> Result<&str> {
        self.tavily_api_key
            .as_deref()
            .ok_or_else(|| Error::Config("Web search requires TAVILY_API_KEY to be set.".into()))
    }
}
