//! Per-request data: passages, route decisions and the request state record.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::workflow::{Branch, Node};
use crate::chains::answer_grader::AnswerVerdict;
use crate::{Error, Result};

/// A retrieved unit of text with optional provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub content: String,
}

impl Passage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            source: None,
            content: content.into(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        let source = source.into();
        self.source = (!source.trim().is_empty()).then_some(source);
        self
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Retrieval backend chosen for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Datasource {
    Vectorstore,
    Websearch,
}

impl std::fmt::Display for Datasource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Datasource::Vectorstore => write!(f, "vectorstore"),
            Datasource::Websearch => write!(f, "websearch"),
        }
    }
}

/// Router output, computed once per request before retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RouteDecision {
    /// `vectorstore` for questions the local index covers, `websearch` otherwise.
    pub datasource: Datasource,
}

/// One executed node and the branch it chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    pub node: Node,
    pub branch: Branch,
}

/// Mutable state of a single run. Owned by the orchestrator and passed by value
/// from node to node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestState {
    pub question: String,
    pub documents: Vec<Passage>,
    pub generation: Option<String>,
    /// Set when document grading left nothing relevant.
    pub web_search: bool,
    /// Incremented on every `not_supported` verdict.
    pub retry_count: u32,
    pub route: Option<Datasource>,
    pub last_verdict: Option<AnswerVerdict>,
    pub trace: Vec<TraceEntry>,
}

impl RequestState {
    /// Start a run. The question is trimmed and must not be empty.
    pub fn new(question: &str, retry_count: u32) -> Result<Self> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidArgument("question must not be empty".into()));
        }

        Ok(Self {
            question: question.to_string(),
            documents: Vec::new(),
            generation: None,
            web_search: false,
            retry_count,
            route: None,
            last_verdict: None,
            trace: Vec::new(),
        })
    }

    pub(crate) fn recorded(mut self, node: Node, branch: Branch) -> Self {
        self.trace.push(TraceEntry { node, branch });
        self
    }

    /// Number of times `node` ran so far.
    pub fn visits(&self, node: Node) -> usize {
        self.trace.iter().filter(|t| t.node == node).count()
    }
}

/// Inspectable result of a full run (`--json`).
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub question: String,
    pub route: Option<Datasource>,
    pub generation: String,
    pub retry_count: u32,
    pub web_search: bool,
    pub verdict: Option<AnswerVerdict>,
    pub documents: Vec<Passage>,
    pub trace: Vec<TraceEntry>,
}

impl RunRecord {
    pub fn from_state(state: RequestState, started_at: DateTime<Utc>, elapsed_ms: u64) -> Result<Self> {
        let generation = state
            .generation
            .filter(|g| !g.trim().is_empty())
            .ok_or(Error::MissingGeneration)?;

        Ok(Self {
            run_id: Uuid::new_v4(),
            started_at,
            elapsed_ms,
            question: state.question,
            route: state.route,
            generation,
            retry_count: state.retry_count,
            web_search: state.web_search,
            verdict: state.last_verdict,
            documents: state.documents,
            trace: state.trace,
        })
    }
}
