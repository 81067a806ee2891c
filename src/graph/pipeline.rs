//! Request orchestrator: drives one question through the workflow table.
//!
//! Every node handler owns the [`RequestState`] for the duration of its step
//! and hands it back together with the branch it took. The table decides what
//! runs next; a step budget caps the total number of nodes per run.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::state::{Datasource, RequestState, RunRecord};
use super::workflow::{Branch, Node, Target, Workflow};
use crate::chains::{
    AnswerGenerator, AnswerGrader, LlmAnswerGenerator, LlmAnswerGrader, LlmRelevanceGrader, LlmRouter,
    RelevanceGrader, Router, Verdict,
};
use crate::config::{PipelineLimits, Settings};
use crate::integrations::TavilyClient;
use crate::llm::{ChatModel, LlmClient};
use crate::store::{DocumentStore, IndexedStore};
use crate::websearch::WebSearch;
use crate::{Error, Result};

/// External collaborators of the orchestrator.
pub struct Components {
    pub router: Box<dyn Router>,
    pub relevance: Box<dyn RelevanceGrader>,
    pub generator: Box<dyn AnswerGenerator>,
    pub answer_grader: Box<dyn AnswerGrader>,
    pub documents: Box<dyn DocumentStore>,
    pub web: Box<dyn WebSearch>,
}

impl Components {
    /// All four chains on top of one chat model.
    pub fn with_model<M>(
        model: Arc<M>,
        limits: &PipelineLimits,
        documents: Box<dyn DocumentStore>,
        web: Box<dyn WebSearch>,
    ) -> Self
    where
        M: ChatModel + 'static,
    {
        let policy = limits.retry_policy();
        let mut router = LlmRouter::new(model.clone(), policy);
        if let Some(topics) = &limits.index_topics {
            router = router.with_topics(topics.as_str());
        }
        Self {
            router: Box::new(router),
            relevance: Box::new(LlmRelevanceGrader::new(model.clone(), policy, limits)),
            generator: Box::new(LlmAnswerGenerator::new(model.clone(), policy, limits)),
            answer_grader: Box::new(LlmAnswerGrader::new(model, policy, limits)),
            documents,
            web,
        }
    }
}

/// `web_search_needed` when grading left nothing relevant, else `documents_relevant`.
pub fn decide_to_generate(state: &RequestState) -> Branch {
    if state.web_search {
        Branch::WebSearchNeeded
    } else {
        Branch::DocumentsRelevant
    }
}

/// Map an answer verdict to the next branch and the updated retry count.
///
/// `not_supported` bumps the count; once it reaches `max_retries` the run
/// falls back to web search instead of regenerating.
pub fn decide_after_grading(verdict: Verdict, retry_count: u32, max_retries: u32) -> (u32, Branch) {
    match verdict {
        Verdict::Useful => (retry_count, Branch::Useful),
        Verdict::NotUseful => (retry_count, Branch::NotUseful),
        Verdict::NotSupported => {
            let retry_count = retry_count.saturating_add(1);
            if retry_count >= max_retries {
                (retry_count, Branch::NotUseful)
            } else {
                (retry_count, Branch::NotSupported)
            }
        }
    }
}

pub struct Pipeline {
    workflow: Workflow,
    components: Components,
    limits: PipelineLimits,
}

impl Pipeline {
    pub fn new(components: Components, limits: PipelineLimits) -> Self {
        Self {
            workflow: Workflow::standard(),
            components,
            limits,
        }
    }

    /// Wire the configured provider, the persisted index and Tavily.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let limits = settings.limits.clone();
        let model = Arc::new(LlmClient::from_settings(&settings.provider)?);
        let store = IndexedStore::open(&settings.index_path, &settings.provider, limits.retrieve_top_k)?;
        let web = TavilyClient::new(settings.require_tavily_key()?, limits.web_results)?;

        info!(
            provider = ?settings.provider.provider(),
            model = settings.provider.model(),
            index_entries = store.len(),
            "Pipeline ready"
        );

        let components = Components::with_model(model, &limits, Box::new(store), Box::new(web));
        Ok(Self::new(components, limits))
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Run the workflow to completion and return the final state.
    pub async fn run(&self, question: &str, retry_count: u32) -> Result<RequestState> {
        let mut state = RequestState::new(question, retry_count)?;
        let mut node = self.workflow.entry();
        let mut steps = 0;

        loop {
            if steps >= self.limits.max_steps {
                warn!(steps, "Step budget exhausted");
                return Err(Error::StepBudgetExhausted { steps });
            }
            steps += 1;

            let (next_state, branch) = self.step(node, state).await?;
            state = next_state.recorded(node, branch);
            info!(step = steps, node = %node, branch = %branch, "Node finished");

            match self.workflow.next(node, branch)? {
                Target::Node(next) => node = next,
                Target::End => break,
            }
        }

        if state.generation.as_deref().map_or(true, |g| g.trim().is_empty()) {
            return Err(Error::MissingGeneration);
        }
        Ok(state)
    }

    /// Run and package the result with timing metadata.
    pub async fn invoke(&self, question: &str, retry_count: u32) -> Result<RunRecord> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let state = self.run(question, retry_count).await?;
        RunRecord::from_state(state, started_at, timer.elapsed().as_millis() as u64)
    }

    async fn step(&self, node: Node, state: RequestState) -> Result<(RequestState, Branch)> {
        match node {
            Node::Route => self.route(state).await,
            Node::Retrieve => self.retrieve(state).await,
            Node::GradeDocuments => self.grade_documents(state).await,
            Node::WebSearch => self.web_search(state).await,
            Node::Generate => self.generate(state).await,
            Node::RetryGenerate => Ok(self.retry_generate(state)),
        }
    }

    async fn route(&self, mut state: RequestState) -> Result<(RequestState, Branch)> {
        let datasource = match self.components.router.route(&state.question).await {
            Ok(decision) => decision.datasource,
            Err(e) => match self.limits.on_router_failure.fallback() {
                Some(fallback) => {
                    warn!(error = %e, fallback = %fallback, "Router failed, using fallback route");
                    fallback
                }
                None => return Err(e),
            },
        };

        state.route = Some(datasource);
        let branch = match datasource {
            Datasource::Vectorstore => Branch::Vectorstore,
            Datasource::Websearch => Branch::Websearch,
        };
        Ok((state, branch))
    }

    async fn retrieve(&self, mut state: RequestState) -> Result<(RequestState, Branch)> {
        let passages = self.components.documents.search(&state.question).await?;
        debug!(count = passages.len(), "Retrieved passages");
        state.documents.extend(passages);
        Ok((state, Branch::Continue))
    }

    async fn grade_documents(&self, mut state: RequestState) -> Result<(RequestState, Branch)> {
        if state.documents.is_empty() {
            info!("Nothing retrieved, falling back to web search");
            state.web_search = true;
            let branch = decide_to_generate(&state);
            return Ok((state, branch));
        }

        let flags = self
            .components
            .relevance
            .grade(&state.question, &state.documents)
            .await?;

        let total = state.documents.len();
        let kept: Vec<_> = std::mem::take(&mut state.documents)
            .into_iter()
            .zip(flags.into_iter().chain(std::iter::repeat(false)))
            .filter_map(|(passage, relevant)| relevant.then_some(passage))
            .take(self.limits.max_docs_to_keep)
            .collect();

        info!(total, kept = kept.len(), "Graded documents");
        state.web_search = kept.is_empty();
        state.documents = kept;
        let branch = decide_to_generate(&state);
        Ok((state, branch))
    }

    async fn web_search(&self, mut state: RequestState) -> Result<(RequestState, Branch)> {
        let passages = self.components.web.search(&state.question).await?;
        info!(count = passages.len(), "Web search results added");
        state.documents.extend(passages);
        Ok((state, Branch::Continue))
    }

    async fn generate(&self, mut state: RequestState) -> Result<(RequestState, Branch)> {
        let is_retry = state.retry_count > 0;
        let generation = self
            .components
            .generator
            .generate(&state.question, &state.documents, is_retry)
            .await?;

        let verdict = self
            .components
            .answer_grader
            .grade(&state.question, &state.documents, &generation)
            .await?;

        let (retry_count, branch) = decide_after_grading(
            verdict.verdict(),
            state.retry_count,
            self.limits.max_generation_retries,
        );
        info!(
            verdict = ?verdict.verdict(),
            grounded = verdict.grounded(),
            answers_question = verdict.answers_question(),
            retry_count,
            "Graded generation"
        );

        state.generation = Some(generation);
        state.retry_count = retry_count;
        state.last_verdict = Some(verdict);
        Ok((state, branch))
    }

    fn retry_generate(&self, state: RequestState) -> (RequestState, Branch) {
        info!(attempt = state.retry_count, "Retrying generation with the same passages");
        (state, Branch::Continue)
    }
}
