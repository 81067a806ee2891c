//! CLI tool for building the document index used by retrieval
//!
//! Usage:
//!   ingest                              - index the default agent/prompting/attack articles
//!   ingest --source docs/               - index .txt/.md/.html files under docs/
//!   ingest --url https://example.com/a  - index a web page
//!   ingest --local-dim 256              - embed offline with the hashing embedder

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use agentic_rag::config::{ProviderSettings, DEFAULT_INDEX_PATH};
use agentic_rag::store::loader::{fetch_urls, load_path, DEFAULT_URLS};
use agentic_rag::store::{Chunker, Embedder, PersistedIndex};
use agentic_rag::Settings;

#[derive(Parser)]
#[command(name = "ingest")]
#[command(about = "Chunk, embed and index documents for retrieval")]
struct Cli {
    /// File or directory to index (repeatable)
    #[arg(short, long)]
    source: Vec<PathBuf>,

    /// Web page to index (repeatable)
    #[arg(short, long)]
    url: Vec<String>,

    /// Index file to write
    #[arg(short, long, env = "RAG_INDEX_PATH", default_value = DEFAULT_INDEX_PATH)]
    output: PathBuf,

    /// Chunk size in words
    #[arg(long, default_value = "250")]
    chunk_size: usize,

    /// Overlap between chunks in words
    #[arg(long, default_value = "0")]
    chunk_overlap: usize,

    /// Texts per embedding request
    #[arg(long, default_value = "32")]
    batch_size: usize,

    /// Use the local hashing embedder with this dimension instead of the provider
    #[arg(long)]
    local_dim: Option<usize>,

    /// Skip loading .env
    #[arg(long, default_value_t = false)]
    no_dotenv: bool,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn embedder(cli: &Cli) -> Result<Embedder> {
    if let Some(dim) = cli.local_dim {
        return Ok(Embedder::local(dim));
    }
    let settings = Settings::from_env().context("embedding provider is not configured")?;
    let embedder = Embedder::from_settings(&settings.provider)?;
    if let ProviderSettings::Ollama { base_url, .. } = &settings.provider {
        info!(%base_url, "Embedding with Ollama");
    }
    Ok(embedder)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !cli.no_dotenv {
        let _ = dotenvy::dotenv();
    }

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("agentic_rag={}", level).parse()?)
                .add_directive(format!("ingest={}", level).parse()?),
        )
        .init();

    let urls: Vec<String> = if cli.source.is_empty() && cli.url.is_empty() {
        DEFAULT_URLS.iter().map(|u| u.to_string()).collect()
    } else {
        cli.url.clone()
    };

    let mut docs = Vec::new();
    for path in &cli.source {
        docs.extend(load_path(path)?);
    }
    docs.extend(fetch_urls(&urls).await?);
    info!(documents = docs.len(), "Sources loaded");

    let embedder = embedder(&cli)?;
    let chunker = Chunker::new(cli.chunk_size, cli.chunk_overlap);
    let mut index = PersistedIndex::new(embedder.model_name());
    let total = index
        .ingest(&docs, &chunker, &embedder, cli.batch_size)
        .await?;

    index.save(&cli.output)?;
    info!(chunks = total, path = %cli.output.display(), "Index written");
    Ok(())
}
