//! Question router: local document index or live web search.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::Router;
use crate::graph::state::RouteDecision;
use crate::llm::{complete_structured, ChatModel, ChatRequest};
use crate::retry::{with_rate_limit_retry, RetryPolicy};
use crate::Result;

/// Topics the default index was built from.
pub const DEFAULT_INDEX_TOPICS: &str = "LLM-powered agents, agent memory and planning, \
prompt engineering, and adversarial attacks on LLMs";

const SYSTEM: &str = "You are an expert at routing a user question to a vectorstore or web search.
The vectorstore contains documents about: {topics}.
Use the vectorstore for questions on these topics. For everything else, use websearch.";

pub struct LlmRouter<M: ?Sized> {
    model: Arc<M>,
    policy: RetryPolicy,
    topics: String,
}

impl<M: ChatModel + ?Sized> LlmRouter<M> {
    pub fn new(model: Arc<M>, policy: RetryPolicy) -> Self {
        Self {
            model,
            policy,
            topics: DEFAULT_INDEX_TOPICS.to_string(),
        }
    }

    /// Describe what the document index covers.
    pub fn with_topics(mut self, topics: impl Into<String>) -> Self {
        self.topics = topics.into();
        self
    }

    fn request(&self, question: &str) -> ChatRequest {
        ChatRequest::new(SYSTEM.replace("{topics}", &self.topics), question)
    }
}

#[async_trait]
impl<M: ChatModel + ?Sized> Router for LlmRouter<M> {
    async fn route(&self, question: &str) -> Result<RouteDecision> {
        let decision: RouteDecision = with_rate_limit_retry(&self.policy, "router", || {
            complete_structured(self.model.as_ref(), self.request(question))
        })
        .await?;
        debug!(datasource = %decision.datasource, "Routed question");
        Ok(decision)
    }
}
