//! Short grounded answer generation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{format_context, AnswerGenerator};
use crate::config::PipelineLimits;
use crate::graph::state::Passage;
use crate::llm::{ChatModel, ChatRequest};
use crate::retry::{with_rate_limit_retry, RetryPolicy};
use crate::Result;

/// Reply when the context does not support an answer.
pub const REFUSAL: &str = "I don't know based on the provided context.";

const SYSTEM: &str = "You are a concise RAG assistant for question-answering tasks.
Use the following pieces of retrieved context to answer the question.
Rules:
- Answer in 2-4 sentences.
- Max 80 words.
- No bullet points, no numbered lists.
- No preamble (no 'Sure', no 'Here is').
- If the context does not support an answer, say: 'I don't know based on the provided context.'";

const RETRY_HINT: &str = "A previous answer made claims the context does not support. \
Only state what the context says.";

pub struct LlmAnswerGenerator<M: ?Sized> {
    model: Arc<M>,
    policy: RetryPolicy,
    max_context_docs: usize,
    max_context_chars: usize,
}

impl<M: ChatModel + ?Sized> LlmAnswerGenerator<M> {
    pub fn new(model: Arc<M>, policy: RetryPolicy, limits: &PipelineLimits) -> Self {
        Self {
            model,
            policy,
            max_context_docs: limits.max_context_docs,
            max_context_chars: limits.max_context_chars,
        }
    }

    fn request(&self, question: &str, passages: &[Passage], is_retry: bool) -> ChatRequest {
        let context = format_context(passages, self.max_context_docs, self.max_context_chars);
        let mut user = format!("Question: {}\nContext:\n{}\n", question, context);
        if is_retry {
            user.push_str(&format!("\nNote: {}\n", RETRY_HINT));
        }
        user.push_str("Answer:");
        ChatRequest::new(SYSTEM, user)
    }
}

#[async_trait]
impl<M: ChatModel + ?Sized> AnswerGenerator for LlmAnswerGenerator<M> {
    async fn generate(&self, question: &str, passages: &[Passage], is_retry: bool) -> Result<String> {
        let request = self.request(question, passages, is_retry);
        let answer = with_rate_limit_retry(&self.policy, "generation", || self.model.complete(&request)).await?;
        let answer = answer.trim().to_string();
        debug!(words = answer.split_whitespace().count(), is_retry, "Generated answer");
        Ok(answer)
    }
}
