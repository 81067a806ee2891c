//! Batched relevance grading of retrieved passages.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{truncate_chars, RelevanceGrader};
use crate::config::PipelineLimits;
use crate::graph::state::Passage;
use crate::llm::{complete_structured, ChatModel, ChatRequest};
use crate::retry::{with_rate_limit_retry, RetryPolicy};
use crate::Result;

const SYSTEM: &str = "You are a strict grader assessing relevance of multiple retrieved documents to a user question.

Rules:
- You MUST return a grade for EVERY document index you receive.
- relevant=true if the document contains keywords OR semantic meaning that helps answer the question.
- relevant=false otherwise.
- Do not skip any indices.";

/// Grade for a single document.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DocGrade {
    /// 0-based index of the document in the input list.
    pub index: i64,
    /// True if relevant to the user question.
    pub relevant: bool,
}

/// Grades for all documents.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GradeDocuments {
    /// A grade for every provided document index.
    pub grades: Vec<DocGrade>,
}

impl GradeDocuments {
    /// Expand to exactly `total` flags. Indices the model skipped, indices past
    /// `submitted`, and passages never submitted count as irrelevant; duplicate
    /// grades must all agree on relevance.
    pub fn into_flags(self, submitted: usize, total: usize) -> Vec<bool> {
        let mut seen: Vec<Option<bool>> = vec![None; total];

        for grade in self.grades {
            let index = match usize::try_from(grade.index) {
                Ok(index) if index < submitted.min(total) => index,
                _ => {
                    warn!(index = grade.index, submitted, "Ignoring grade for unknown index");
                    continue;
                }
            };
            let slot = &mut seen[index];
            *slot = Some(slot.unwrap_or(true) && grade.relevant);
        }

        seen.into_iter()
            .enumerate()
            .map(|(index, flag)| {
                if flag.is_none() && index < submitted {
                    debug!(index, "No grade returned, treating as irrelevant");
                }
                flag.unwrap_or(false)
            })
            .collect()
    }
}

fn format_for_grading(passages: &[Passage], max_chars: usize) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[{}] {}", i, truncate_chars(p.content.trim(), max_chars)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct LlmRelevanceGrader<M: ?Sized> {
    model: Arc<M>,
    policy: RetryPolicy,
    max_chars_per_doc: usize,
    max_docs_to_grade: usize,
}

impl<M: ChatModel + ?Sized> LlmRelevanceGrader<M> {
    pub fn new(model: Arc<M>, policy: RetryPolicy, limits: &PipelineLimits) -> Self {
        Self {
            model,
            policy,
            max_chars_per_doc: limits.max_chars_per_doc,
            max_docs_to_grade: limits.max_docs_to_grade.max(1),
        }
    }
}

#[async_trait]
impl<M: ChatModel + ?Sized> RelevanceGrader for LlmRelevanceGrader<M> {
    async fn grade(&self, question: &str, passages: &[Passage]) -> Result<Vec<bool>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let submitted = passages.len().min(self.max_docs_to_grade);
        let user = format!(
            "User question:\n{}\n\nRetrieved documents (each has an index):\n{}\n\nReturn grades for ALL indices.",
            question,
            format_for_grading(&passages[..submitted], self.max_chars_per_doc)
        );

        let grades: GradeDocuments = with_rate_limit_retry(&self.policy, "relevance_grader", || {
            complete_structured(self.model.as_ref(), ChatRequest::new(SYSTEM, user.clone()))
        })
        .await?;

        Ok(grades.into_flags(submitted, passages.len()))
    }
}
