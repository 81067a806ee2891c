//! Scripted chat model for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{ChatModel, ChatRequest};
use crate::{Error, Result};

/// Replays canned replies in order and records every request.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String>>>,
    repeat: Option<String>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(replies.into_iter().map(|r| Ok(r.into())))
    }

    pub fn from_results<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String>>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with the same reply.
    pub fn repeating(reply: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            repeat: Some(reply.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return reply;
        }
        self.repeat
            .clone()
            .ok_or_else(|| Error::Provider("script exhausted".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{with_rate_limit_retry, RetryPolicy};
    use std::time::Duration;

    #[tokio::test]
    async fn rate_limited_chain_call_is_retried_once() {
        let model = ScriptedModel::from_results([
            Err(Error::rate_limited("429 Too Many Requests")),
            Ok("fine".to_string()),
        ]);
        let policy = RetryPolicy::default().with_default_delay(Duration::from_millis(1));
        let request = ChatRequest::new("sys", "user");

        let reply = with_rate_limit_retry(&policy, "test", || model.complete(&request))
            .await
            .unwrap();

        assert_eq!(reply, "fine");
        assert_eq!(model.requests().len(), 2);
    }
}
