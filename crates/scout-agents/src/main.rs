use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use coordination::state::CheckpointStore;
use coordination::{
    ControlMode, Engine, EngineConfig, EngineError, GovernedClient, JsonlCheckpointStore,
    RateGovernor, RunReport,
};
use scout_agents::config::check_endpoint;
use scout_agents::prompts::PROMPT_VERSION;
use scout_agents::{
    build_registry, AgentDeps, DuckDuckGoSearch, HttpScraper, LlmConfig, OpenAiCompatClient,
};

const DEFAULT_STORE_DIR: &str = ".vc-scout/runs";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML engine configuration (defaults to $SCOUT_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the run checkpoint logs
    #[arg(long, global = true, default_value = DEFAULT_STORE_DIR)]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a new startup idea
    Evaluate {
        idea: String,
        /// Control mode: debate or legacy_pivot
        #[arg(long)]
        mode: Option<ControlMode>,
        /// Print the run report as JSON instead of the markdown write-up
        #[arg(long)]
        json: bool,
    },
    /// Continue an interrupted run from its last checkpoint
    Resume {
        run_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Show the latest report of a run
    Show {
        run_id: String,
        #[arg(long)]
        json: bool,
    },
    /// List stored runs
    List,
    /// Check that the reasoning service is reachable
    Check,
}

fn build_engine(config: EngineConfig, store: Arc<dyn CheckpointStore>) -> Result<Engine> {
    let llm = LlmConfig::from_env();
    if llm.api_key.is_none() {
        warn!("No API key set; requests to the reasoning service will likely be rejected");
    }
    info!(
        model = %llm.model,
        base_url = %llm.base_url,
        calls_per_minute = config.reasoning_calls_per_minute,
        mode = %config.mode,
        prompt_version = PROMPT_VERSION,
        "Reasoning service configured"
    );

    let governor = RateGovernor::per_minute(config.reasoning_calls_per_minute).shared();
    let deps = AgentDeps {
        client: Arc::new(GovernedClient::new(
            Arc::new(OpenAiCompatClient::new(llm)),
            governor,
        )),
        search: Arc::new(DuckDuckGoSearch::new(config.scrape_timeout())),
        scraper: Arc::new(HttpScraper::default()),
    };
    let registry = build_registry(&deps, &config);
    Engine::new(config, registry, store).context("failed to build engine")
}

/// Cancel the token on the first Ctrl-C so the engine stops at the next stage boundary.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current stage");
            child.cancel();
        }
    });
    token
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    eprintln!("{}", report.summary_line());
    match (&report.report, &report.rejection_reason) {
        (Some(r), _) => println!("{}", r.markdown),
        (None, Some(reason)) => println!("Rejected: {reason}"),
        (None, None) => {}
    }
    if let Some(failure) = &report.failure {
        eprintln!(
            "Stage {} failed after {} attempt(s) ({}): {}",
            failure.stage, failure.attempts, failure.category, failure.message
        );
        eprintln!("Resume with: vc-scout resume {}", report.run_id);
    }
    Ok(())
}

fn explain(err: EngineError) -> anyhow::Error {
    if err.is_resumable() {
        if let Some(run_id) = err.run_id() {
            eprintln!("Run {run_id} can be resumed with: vc-scout resume {run_id}");
        }
    }
    anyhow::Error::new(err)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = EngineConfig::load(cli.config.as_deref()).context("invalid configuration")?;
    let store = JsonlCheckpointStore::open(&cli.store)
        .await
        .with_context(|| format!("failed to open run store at {}", cli.store.display()))?
        .shared();

    match cli.command {
        Command::Evaluate { idea, mode, json } => {
            if let Some(mode) = mode {
                config.mode = mode;
            }
            let engine = build_engine(config, store)?.with_cancellation(cancel_on_ctrl_c());
            let report = engine.start(&idea).await.map_err(explain)?;
            print_report(&report, json)?;
        }
        Command::Resume { run_id, json } => {
            let engine = build_engine(config, store)?.with_cancellation(cancel_on_ctrl_c());
            let report = engine.resume(&run_id).await.map_err(explain)?;
            print_report(&report, json)?;
        }
        Command::Show { run_id, json } => {
            let Some(checkpoint) = store.load_latest(&run_id).await? else {
                bail!("no run with id {run_id}");
            };
            print_report(&RunReport::from_checkpoint(&checkpoint), json)?;
        }
        Command::List => {
            for run_id in store.list_runs().await? {
                match store.load_latest(&run_id).await {
                    Ok(Some(checkpoint)) => {
                        println!("{}", RunReport::from_checkpoint(&checkpoint).summary_line())
                    }
                    Ok(None) => {}
                    Err(e) => warn!(run_id = %run_id, error = %e, "Unreadable run log"),
                }
            }
        }
        Command::Check => {
            let llm = LlmConfig::from_env();
            if check_endpoint(&llm).await {
                println!("{} reachable ({})", llm.base_url, llm.model);
            } else {
                bail!("reasoning service at {} is not reachable", llm.base_url);
            }
        }
    }
    Ok(())
}
