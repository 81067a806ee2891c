//! Groundedness and usefulness grading of a generated answer.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{format_context, AnswerGrader};
use crate::config::PipelineLimits;
use crate::graph::state::Passage;
use crate::llm::{complete_structured, ChatModel, ChatRequest};
use crate::retry::{with_rate_limit_retry, RetryPolicy};
use crate::Result;

const SYSTEM: &str = "You are a strict grader.

You receive:
1) A user question
2) Retrieved documents (facts)
3) A generated answer

Tasks:
A) Decide if the answer is grounded in the documents (no unsupported claims).
B) Decide if the answer answers the question.

Return:
- grounded (bool)
- answers_question (bool)
- verdict:
  - \"useful\" if grounded=true AND answers_question=true
  - \"not_useful\" if grounded=true AND answers_question=false
  - \"not_supported\" if grounded=false
- reason: short justification (1-2 sentences)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Useful,
    NotUseful,
    NotSupported,
}

impl Verdict {
    /// The only verdict consistent with the two flags.
    pub fn derive(grounded: bool, answers_question: bool) -> Self {
        match (grounded, answers_question) {
            (false, _) => Verdict::NotSupported,
            (true, true) => Verdict::Useful,
            (true, false) => Verdict::NotUseful,
        }
    }
}

/// Grader output as the model returns it.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GradeAnswer {
    /// True if the answer is supported by the provided documents.
    pub grounded: bool,
    /// True if the answer addresses the user question.
    pub answers_question: bool,
    /// One of: useful, not_useful, not_supported.
    pub verdict: Verdict,
    /// Short reason (1-2 sentences).
    #[serde(default)]
    pub reason: String,
}

/// Consistent answer verdict: `useful` iff grounded and answering,
/// `not_supported` iff not grounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerVerdict {
    grounded: bool,
    answers_question: bool,
    verdict: Verdict,
    reason: String,
}

impl AnswerVerdict {
    pub fn new(grounded: bool, answers_question: bool, reason: impl Into<String>) -> Self {
        Self {
            grounded,
            answers_question,
            verdict: Verdict::derive(grounded, answers_question),
            reason: reason.into(),
        }
    }

    pub fn useful(reason: impl Into<String>) -> Self {
        Self::new(true, true, reason)
    }

    pub fn not_useful(reason: impl Into<String>) -> Self {
        Self::new(true, false, reason)
    }

    pub fn not_supported(reason: impl Into<String>) -> Self {
        Self::new(false, false, reason)
    }

    pub fn grounded(&self) -> bool {
        self.grounded
    }

    pub fn answers_question(&self) -> bool {
        self.answers_question
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<GradeAnswer> for AnswerVerdict {
    /// The boolean flags win over a contradictory verdict label.
    fn from(raw: GradeAnswer) -> Self {
        let verdict = AnswerVerdict::new(raw.grounded, raw.answers_question, raw.reason);
        if verdict.verdict != raw.verdict {
            warn!(
                reported = ?raw.verdict,
                derived = ?verdict.verdict,
                "Grader verdict contradicts its flags, using derived verdict"
            );
        }
        verdict
    }
}

pub struct LlmAnswerGrader<M: ?Sized> {
    model: Arc<M>,
    policy: RetryPolicy,
    max_context_docs: usize,
    max_context_chars: usize,
}

impl<M: ChatModel + ?Sized> LlmAnswerGrader<M> {
    pub fn new(model: Arc<M>, policy: RetryPolicy, limits: &PipelineLimits) -> Self {
        Self {
            model,
            policy,
            max_context_docs: limits.max_context_docs,
            max_context_chars: limits.max_context_chars,
        }
    }
}

#[async_trait]
impl<M: ChatModel + ?Sized> AnswerGrader for LlmAnswerGrader<M> {
    async fn grade(&self, question: &str, passages: &[Passage], generation: &str) -> Result<AnswerVerdict> {
        let user = format!(
            "User question:\n{}\n\nRetrieved documents:\n{}\n\nLLM generation:\n{}",
            question,
            format_context(passages, self.max_context_docs, self.max_context_chars),
            generation
        );

        let raw: GradeAnswer = with_rate_limit_retry(&self.policy, "answer_grader", || {
            complete_structured(self.model.as_ref(), ChatRequest::new(SYSTEM, user.clone()))
        })
        .await?;

        Ok(raw.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    #[test]
    fn verdict_invariant_holds_for_all_flag_combinations() {
        for grounded in [true, false] {
            for answers in [true, false] {
                let v = AnswerVerdict::new(grounded, answers, "");
                assert_eq!(v.verdict() == Verdict::Useful, grounded && answers);
                assert_eq!(v.verdict() == Verdict::NotSupported, !grounded);
            }
        }
    }

    #[test]
    fn contradictory_label_is_corrected() {
        let raw = GradeAnswer {
            grounded: false,
            answers_question: true,
            verdict: Verdict::Useful,
            reason: "mentions facts not in the documents".into(),
        };
        let verdict = AnswerVerdict::from(raw);
        assert_eq!(verdict.verdict(), Verdict::NotSupported);
        assert_eq!(verdict.reason(), "mentions facts not in the documents");
    }

    #[test]
    fn verdict_serializes_snake_case() {
        let json = serde_json::to_value(AnswerVerdict::not_useful("off topic")).unwrap();
        assert_eq!(json["verdict"], "not_useful");
        assert_eq!(json["grounded"], true);
        assert_eq!(json["answers_question"], false);
    }

    #[tokio::test]
    async fn grades_with_question_documents_and_generation() {
        let model = Arc::new(ScriptedModel::new([
            r#"{"grounded": true, "answers_question": true, "verdict": "useful", "reason": "ok"}"#,
        ]));
        let grader = LlmAnswerGrader::new(model.clone(), RetryPolicy::default(), &PipelineLimits::default());

        let verdict = grader
            .grade(
                "what is agent memory?",
                &[Passage::new("Memory lets agents retain information.")],
                "Agent memory retains information.",
            )
            .await
            .unwrap();

        assert_eq!(verdict, AnswerVerdict::useful("ok"));
        let request = &model.requests()[0];
        assert!(request.user.contains("User question:\nwhat is agent memory?"));
        assert!(request.user.contains("Memory lets agents retain information."));
        assert!(request.user.contains("LLM generation:\nAgent memory retains information."));
    }
}
