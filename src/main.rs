//! Agentic RAG CLI - main entry point
//!
//! Answers one question per invocation and prints either the final answer
//! or the full run record as JSON.

use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use agentic_rag::{Pipeline, Settings, Workflow};

const EXIT_FAILURE: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "agentic_rag")]
#[command(about = "Agentic RAG: routed retrieval, graded answers, web-search fallback", long_about = None)]
#[command(version)]
struct Cli {
    /// Question to answer
    #[arg(short, long, required_unless_present = "print_graph")]
    question: Option<String>,

    /// Initial retry count (advanced)
    #[arg(long, default_value_t = 0)]
    retry_count: u32,

    /// Print the full run record as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Skip loading .env
    #[arg(long, default_value_t = false)]
    no_dotenv: bool,

    /// Print the workflow as a Mermaid graph and exit
    #[arg(long, default_value_t = false)]
    print_graph: bool,
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("agentic_rag={}", level).parse()?),
        )
        .init();
    Ok(())
}

async fn answer(cli: &Cli, question: &str) -> anyhow::Result<()> {
    let settings = Settings::from_env().context("invalid configuration")?;
    let pipeline = Pipeline::from_settings(&settings)?;

    let start = Instant::now();
    let record = pipeline.invoke(question, cli.retry_count).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("{}", record.generation);
    }

    info!("Done in {} ms", start.elapsed().as_millis());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if !cli.no_dotenv {
        // Load .env for local development
        let _ = dotenvy::dotenv();
    }

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(EXIT_FAILURE);
    }

    if cli.print_graph {
        println!("{}", Workflow::standard().to_mermaid());
        return ExitCode::SUCCESS;
    }

    let Some(question) = cli.question.as_deref() else {
        error!("--question is required");
        return ExitCode::from(EXIT_FAILURE);
    };

    tokio::select! {
        result = answer(&cli, question) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{:#}", e);
                ExitCode::from(EXIT_FAILURE)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}
