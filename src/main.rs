//! Sage - natural-language questions answered with read-only SQL.

use anyhow::Context;
use db_sage::app::Orchestrator;
use db_sage::cli::Cli;
use db_sage::config::Config;
use db_sage::error::SageError;
use db_sage::relevance::{create_classifier, RelevanceScorer};
use db_sage::schema::SchemaStore;
use db_sage::{db, llm, logging};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());

    // Precedence: CLI flags, then config file, then environment
    let mut config = Config::load_from_file(&config_path)?;
    config.apply_env_defaults();
    cli.apply_to(&mut config);
    config.validate()?;

    let orchestrator = build_orchestrator(&config).await?;

    if !cli.no_refresh {
        let summary = orchestrator
            .refresh_schema()
            .await
            .context("Failed to refresh schema from source database")?;
        info!(
            refreshed = summary.refreshed.len(),
            pruned = summary.pruned.len(),
            "Schema store refreshed"
        );
    }

    let outcome = match cli.question() {
        Some(question) => ask(&orchestrator, question).await.map_err(anyhow::Error::from),
        None => answer_stdin(&orchestrator).await,
    };

    orchestrator.close().await?;
    outcome
}

async fn build_orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let url = config.database_url()?;
    info!("Connecting to {}", db::redact_url(url));
    let source = db::connect(url)
        .await
        .with_context(|| format!("Failed to connect to {}", db::redact_url(url)))?;

    let provider = config.llm_provider()?;
    info!(provider = provider.as_str(), "Using LLM provider");
    let llm = llm::create_client(provider, config.llm.model.as_deref())?;

    let classifier = create_classifier(&config.classifier)?;
    if classifier.is_none() {
        info!("Semantic classifier disabled, ranking is lexical only");
    }

    let store_path = config.schema_store_path()?;
    let store = SchemaStore::open(&store_path)
        .await
        .with_context(|| format!("Failed to open schema store at {}", store_path.display()))?;

    let scorer = RelevanceScorer::new(config.relevance.clone(), classifier);
    Ok(Orchestrator::new(source, llm, store, scorer))
}

/// Answers one question and prints it. Ctrl-C cancels the question.
async fn ask(orchestrator: &Orchestrator, question: &str) -> Result<(), SageError> {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let outcome = orchestrator.answer_with_cancel(question, token).await;
    watcher.abort();

    let answer = outcome?;
    println!("{answer}");
    Ok(())
}

/// Answers questions read from stdin until EOF or Ctrl-C while idle.
async fn answer_stdin(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read from stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }

        if let Err(e) = ask(orchestrator, question).await {
            eprintln!("{}: {}", e.category(), e);
        }
    }

    Ok(())
}
