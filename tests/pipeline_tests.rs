//! Integration tests for the agentic_rag library
//!
//! These tests drive the public API end to end: configuration, the persisted
//! index, provider adapters over HTTP and the orchestrator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use httpmock::prelude::*;
use serde_json::json;

use agentic_rag::chains::{AnswerGenerator, AnswerGrader, AnswerVerdict, RelevanceGrader, Router, Verdict};
use agentic_rag::graph::{Datasource, Node, RouteDecision};
use agentic_rag::store::{Chunk, Chunker, DocumentStore, Embedder, IndexedStore, PersistedIndex};
use agentic_rag::websearch::WebSearch;
use agentic_rag::{Components, Error, Passage, Pipeline, PipelineLimits, Result, Settings, Workflow};

// ============================================================================
// Fakes
// ============================================================================

struct StaticRouter(Datasource);

#[async_trait]
impl Router for StaticRouter {
    async fn route(&self, _question: &str) -> Result<RouteDecision> {
        Ok(RouteDecision { datasource: self.0 })
    }
}

/// Drops every passage whose index is listed.
struct DropIndices(Vec<usize>);

#[async_trait]
impl RelevanceGrader for DropIndices {
    async fn grade(&self, _question: &str, passages: &[Passage]) -> Result<Vec<bool>> {
        Ok((0..passages.len()).map(|i| !self.0.contains(&i)).collect())
    }
}

struct EchoGenerator;

#[async_trait]
impl AnswerGenerator for EchoGenerator {
    async fn generate(&self, question: &str, passages: &[Passage], is_retry: bool) -> Result<String> {
        Ok(format!("{} ({} passages, retry={})", question, passages.len(), is_retry))
    }
}

struct VerdictQueue(Mutex<Vec<AnswerVerdict>>);

impl VerdictQueue {
    fn new(verdicts: Vec<AnswerVerdict>) -> Self {
        Self(Mutex::new(verdicts.into_iter().rev().collect()))
    }
}

#[async_trait]
impl AnswerGrader for VerdictQueue {
    async fn grade(&self, _q: &str, _p: &[Passage], _g: &str) -> Result<AnswerVerdict> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| AnswerVerdict::useful("fine")))
    }
}

struct CountingSource {
    passages: Vec<Passage>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl DocumentStore for CountingSource {
    async fn search(&self, _query: &str) -> Result<Vec<Passage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.passages.clone())
    }
}

#[async_trait]
impl WebSearch for CountingSource {
    async fn search(&self, _query: &str) -> Result<Vec<Passage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.passages.clone())
    }
}

fn pipeline(
    route: Datasource,
    dropped: Vec<usize>,
    verdicts: Vec<AnswerVerdict>,
    store_calls: Arc<AtomicUsize>,
    web_calls: Arc<AtomicUsize>,
) -> Pipeline {
    let components = Components {
        router: Box::new(StaticRouter(route)),
        relevance: Box::new(DropIndices(dropped)),
        generator: Box::new(EchoGenerator),
        answer_grader: Box::new(VerdictQueue::new(verdicts)),
        documents: Box::new(CountingSource {
            passages: vec![
                Passage::new("Short-term memory is in-context learning.").with_source("agent.md"),
                Passage::new("Long-term memory uses an external vector store.").with_source("agent.md"),
                Passage::new("Pizza needs a hot oven.").with_source("pizza.md"),
            ],
            calls: store_calls,
        }),
        web: Box::new(CountingSource {
            passages: vec![Passage::new("Fresh web result.").with_source("https://web.example")],
            calls: web_calls,
        }),
    };
    Pipeline::new(components, PipelineLimits::default())
}

// ============================================================================
// Orchestrator scenarios
// ============================================================================

#[tokio::test]
async fn test_off_topic_question_never_touches_the_index() {
    let store_calls = Arc::new(AtomicUsize::new(0));
    let web_calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(
        Datasource::Websearch,
        vec![],
        vec![],
        store_calls.clone(),
        web_calls.clone(),
    );

    let record = pipeline.invoke("how to make pizza", 0).await.unwrap();

    assert_eq!(record.route, Some(Datasource::Websearch));
    assert_eq!(store_calls.load(Ordering::SeqCst), 0);
    assert_eq!(web_calls.load(Ordering::SeqCst), 1);
    assert_eq!(record.documents[0].source.as_deref(), Some("https://web.example"));
}

#[tokio::test]
async fn test_omitted_passage_is_dropped_before_generation() {
    let store_calls = Arc::new(AtomicUsize::new(0));
    let web_calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(Datasource::Vectorstore, vec![2], vec![], store_calls, web_calls.clone());

    let record = pipeline.invoke("what is agent memory?", 0).await.unwrap();

    assert_eq!(record.documents.len(), 2);
    assert!(record.documents.iter().all(|p| p.source.as_deref() == Some("agent.md")));
    assert_eq!(record.generation, "what is agent memory? (2 passages, retry=false)");
    assert!(!record.web_search);
    assert_eq!(web_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_nothing_relevant_triggers_web_search() {
    let web_calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(
        Datasource::Vectorstore,
        vec![0, 1, 2],
        vec![],
        Arc::new(AtomicUsize::new(0)),
        web_calls.clone(),
    );

    let state = pipeline.run("what is agent memory?", 0).await.unwrap();

    assert!(state.web_search);
    assert_eq!(web_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.documents.len(), 1);
}

#[tokio::test]
async fn test_repeated_unsupported_answers_fall_back_instead_of_third_retry() {
    let web_calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(
        Datasource::Vectorstore,
        vec![],
        vec![
            AnswerVerdict::not_supported("claims not in context"),
            AnswerVerdict::not_supported("still ungrounded"),
        ],
        Arc::new(AtomicUsize::new(0)),
        web_calls.clone(),
    );

    let state = pipeline.run("what is agent memory?", 0).await.unwrap();

    assert_eq!(state.retry_count, 2);
    assert_eq!(state.visits(Node::RetryGenerate), 1);
    assert_eq!(state.visits(Node::Generate), 3);
    assert_eq!(web_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        state.last_verdict.as_ref().map(|v| v.verdict()),
        Some(Verdict::Useful)
    );
}

#[tokio::test]
async fn test_run_record_serializes_for_json_output() {
    let pipeline = pipeline(
        Datasource::Vectorstore,
        vec![],
        vec![],
        Arc::new(AtomicUsize::new(0)),
        Arc::new(AtomicUsize::new(0)),
    );

    let record = pipeline.invoke("  what is agent memory?  ", 1).await.unwrap();
    let json = serde_json::to_value(&record).unwrap();

    assert_eq!(json["question"], "what is agent memory?");
    assert_eq!(json["retry_count"], 1);
    assert_eq!(json["route"], "vectorstore");
    assert_eq!(json["verdict"]["verdict"], "useful");
    assert!(json["run_id"].as_str().is_some());
    assert_eq!(json["trace"].as_array().unwrap().len(), 4);
}

#[test]
fn test_workflow_graph_renders() {
    let mermaid = Workflow::standard().to_mermaid();
    assert!(mermaid.contains("grade_documents -.->|web_search_needed| websearch;"));
    assert!(mermaid.contains("generate -.->|not_supported| retry_generate;"));
}

// ============================================================================
// Configuration
// ============================================================================

fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_missing_provider_names_the_key() {
    let err = Settings::from_lookup(env(&[])).unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("LLM_PROVIDER")));
}

#[test]
fn test_unknown_provider_lists_supported_values() {
    let err = Settings::from_lookup(env(&[("LLM_PROVIDER", "openai")])).unwrap_err();
    assert!(err.to_string().contains("'gemini', 'ollama'"));
}

// ============================================================================
// Index
// ============================================================================

#[test]
fn test_local_index_search_blocking() {
    let embedder = Embedder::local(64);
    let mut index = PersistedIndex::new(embedder.model_name());
    let texts = [
        ("agent.md", "agent memory planning reflection"),
        ("pizza.md", "pizza dough oven cheese"),
    ];
    let vectors = tokio_test::block_on(
        embedder.embed(&texts.iter().map(|(_, t)| t.to_string()).collect::<Vec<_>>()),
    )
    .unwrap();
    index
        .extend(
            texts
                .iter()
                .map(|(source, text)| Chunk::new(*text, *source))
                .collect(),
            vectors,
        )
        .unwrap();

    let store = IndexedStore::new(index, embedder, 1).unwrap();
    let passages = tokio_test::block_on(store.search("agent memory")).unwrap();

    assert_eq!(passages.len(), 1);
    assert_eq!(passages[0].source.as_deref(), Some("agent.md"));
}

// ============================================================================
// Full stack over HTTP
// ============================================================================

fn ollama_reply(content: &str) -> serde_json::Value {
    json!({ "message": { "role": "assistant", "content": content } })
}

fn system_prompt_contains(body: &[u8], marker: &str) -> bool {
    let body: serde_json::Value = serde_json::from_slice(body).unwrap_or_default();
    body["messages"][0]["content"]
        .as_str()
        .is_some_and(|system| system.contains(marker))
}

/// Chat mocks for one vectorstore run that keeps the first passage; returns the router mock.
fn mount_vectorstore_run(server: &MockServer) -> httpmock::Mock<'_> {
    let router = server.mock(|when, then| {
        when.method(POST)
            .path("/api/chat")
            .matches(|req| system_prompt_contains(req.body().as_ref(), "routing a user question"));
        then.status(200)
            .json_body(ollama_reply(r#"{"datasource": "vectorstore"}"#));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/chat")
            .matches(|req| system_prompt_contains(req.body().as_ref(), "relevance of multiple retrieved documents"));
        then.status(200).json_body(ollama_reply(
            r#"{"grades": [{"index": 0, "relevant": true}, {"index": 1, "relevant": false}]}"#,
        ));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/chat")
            .matches(|req| system_prompt_contains(req.body().as_ref(), "concise RAG assistant"));
        then.status(200).json_body(ollama_reply(
            "Agent memory stores past observations. Long-term memory lives in a vector store.",
        ));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/chat")
            .matches(|req| system_prompt_contains(req.body().as_ref(), "Decide if the answer is grounded"));
        then.status(200).json_body(ollama_reply(
            r#"{"grounded": true, "answers_question": true, "verdict": "useful", "reason": "supported"}"#,
        ));
    });
    router
}

#[tokio::test]
async fn test_pipeline_from_settings_answers_from_the_index() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/api/embed");
        then.status(200).json_body(json!({ "embeddings": [[1.0, 0.0, 0.0]] }));
    });
    let router = mount_vectorstore_run(&server);

    let dir = tempfile::tempdir().unwrap();
    let index_path = dir.path().join("index.json");
    let mut index = PersistedIndex::new("nomic-embed-text");
    index
        .extend(
            vec![
                Chunk::new("Agent memory stores past observations.", "agent.md"),
                Chunk::new("Pizza needs a hot oven.", "pizza.md"),
            ],
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
        )
        .unwrap();
    index.save(&index_path).unwrap();

    let base_url = server.base_url();
    let index_path = index_path.display().to_string();
    let settings = Settings::from_lookup(env(&[
        ("LLM_PROVIDER", "ollama"),
        ("OLLAMA_MODEL", "llama3.1"),
        ("OLLAMA_BASE_URL", base_url.as_str()),
        ("TAVILY_API_KEY", "tvly-test"),
        ("RAG_INDEX_PATH", index_path.as_str()),
    ]))
    .unwrap();

    let pipeline = Pipeline::from_settings(&settings).unwrap();
    let record = pipeline.invoke("what is agent memory?", 0).await.unwrap();

    router.assert_calls(1);
    assert_eq!(record.route, Some(Datasource::Vectorstore));
    assert_eq!(record.documents.len(), 1);
    assert_eq!(record.documents[0].source.as_deref(), Some("agent.md"));
    assert!(record.generation.starts_with("Agent memory stores past observations."));
    assert!(!record.web_search);
    assert_eq!(record.retry_count, 0);
}

#[tokio::test]
async fn test_pipeline_from_settings_queries_locally_built_index() {
    let server = MockServer::start_async().await;
    let provider_embed = server.mock(|when, then| {
        when.method(POST).path("/api/embed");
        then.status(500);
    });
    let router = mount_vectorstore_run(&server);

    let dir = tempfile::tempdir().unwrap();
    let index_path = dir.path().join("index.json");
    let embedder = Embedder::local(32);
    let mut index = PersistedIndex::new(embedder.model_name());
    let docs = vec![
        ("agent.md".to_string(), "Agent memory stores past observations.".to_string()),
        ("pizza.md".to_string(), "Pizza needs a hot oven.".to_string()),
    ];
    index
        .ingest(&docs, &Chunker::default(), &embedder, 8)
        .await
        .unwrap();
    index.save(&index_path).unwrap();

    let base_url = server.base_url();
    let index_path = index_path.display().to_string();
    let settings = Settings::from_lookup(env(&[
        ("LLM_PROVIDER", "ollama"),
        ("OLLAMA_MODEL", "llama3.1"),
        ("OLLAMA_BASE_URL", base_url.as_str()),
        ("TAVILY_API_KEY", "tvly-test"),
        ("RAG_INDEX_PATH", index_path.as_str()),
    ]))
    .unwrap();

    let pipeline = Pipeline::from_settings(&settings).unwrap();
    let record = pipeline.invoke("what is agent memory?", 0).await.unwrap();

    router.assert_calls(1);
    provider_embed.assert_calls(0);
    assert_eq!(record.documents.len(), 1);
    assert_eq!(record.documents[0].source.as_deref(), Some("agent.md"));
}

#[test]
fn test_pipeline_requires_built_index() {
    let settings = Settings::from_lookup(env(&[
        ("LLM_PROVIDER", "ollama"),
        ("OLLAMA_MODEL", "llama3.1"),
        ("TAVILY_API_KEY", "tvly-test"),
        ("RAG_INDEX_PATH", "/nonexistent/index.json"),
    ]))
    .unwrap();

    let err = Pipeline::from_settings(&settings).err().unwrap();
    assert!(matches!(err, Error::Index(_)));
}
