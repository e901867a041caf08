mod config;
mod script;

use clap::{Parser, Subcommand, ValueEnum};
use script::Scenario;
use std::path::PathBuf;
use taskswarm_orchestrator::{Report, TaskPlan};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskswarm", about = "Taskswarm: dependency-aware task orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "taskswarm.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Maximum tasks in flight (overrides config)
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Per-task timeout in milliseconds (overrides config)
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured workers
    Workers,
    /// Validate a decomposition and print its plan
    Validate {
        /// Decomposition JSON file
        path: PathBuf,
    },
    /// Replay a scripted scenario through the engine
    Run {
        /// Scenario JSON file
        path: PathBuf,
        /// Session id (random when omitted)
        #[arg(long)]
        session: Option<String>,
        /// Print the full run as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let app = config::load_or_default(&cli.config)
        .and_then(|c| c.with_overrides(cli.max_concurrency, cli.timeout_ms))
        .map_err(|e| anyhow::anyhow!("Failed to load config '{}': {e}", cli.config.display()))?;
    let registry = app.registry();

    match cli.command {
        Commands::Workers => {
            if registry.is_empty() {
                println!("No workers configured.");
            } else {
                println!("Workers ({}):", registry.len());
                println!("{}", registry.describe());
            }
        }
        Commands::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("Failed to read '{}': {e}", path.display()))?;
            let decomposition = serde_json::from_str(&content)?;
            let plan = TaskPlan::build("", "validate", registry, decomposition)?;
            match plan.direct_answer() {
                Some(answer) => println!("Direct answer: {answer}"),
                None => {
                    println!("{}", plan.task_report());
                    println!("{}", plan.dependency_tree());
                }
            }
        }
        Commands::Run {
            path,
            session,
            json,
        } => {
            let scenario = Scenario::load(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load scenario '{}': {e}", path.display()))?;
            let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let query = scenario.query.clone();
            info!(session = %session, scenario = %path.display(), "Running scenario");

            let orchestrator = scenario.into_orchestrator(&registry, app.engine.clone());
            let run = orchestrator.run_detailed(&query, &session).await?;

            if json {
                let output = serde_json::json!({
                    "session_id": session,
                    "report": run.report,
                    "routing": run.routing,
                    "execution": run.execution,
                    "stats": run.plan.stats(),
                    "duration_ms": run.duration_ms,
                    "monitor": orchestrator.monitor().to_json().await,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                if !matches!(run.report, Report::DirectAnswer { .. }) {
                    println!("{}", run.plan.dependency_tree());
                }
                println!("{}", run.report);
            }
        }
    }

    Ok(())
}
