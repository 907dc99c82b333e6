//! `kalki`: run goals through the agent loop from the command line.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kalki_app::bootstrap::{build_agent, build_oracle, build_registry, list_models};
use kalki_app::config::{Settings, SettingsSource};
use kalki_app::{logging, report};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "kalki", version, about = "Local desktop assistant driven by a language model")]
struct Cli {
    /// Settings file.
    #[arg(long, global = true, env = "KALKI_CONFIG", default_value = kalki_app::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Work towards one or more goals concurrently.
    Run {
        #[arg(required = true)]
        goals: Vec<String>,

        /// Step budget per goal, sub-goals included.
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// List registered capabilities.
    Capabilities,
    /// List models offered by the model server.
    Models,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let (settings, source) = Settings::load(&cli.config)?;

    let level = if cli.verbose {
        "debug"
    } else {
        settings.system.log_level.as_str()
    };
    logging::init(level, cli.json);
    if source == SettingsSource::Defaults {
        info!(path = %cli.config.display(), "No settings file, using defaults");
    }

    match cli.command {
        Command::Run { goals, max_steps } => cmd_run(&settings, goals, max_steps).await,
        Command::Capabilities => cmd_capabilities(&settings),
        Command::Models => cmd_models(&settings).await,
    }
}

async fn cmd_run(settings: &Settings, goals: Vec<String>, max_steps: Option<usize>) -> Result<()> {
    let max_steps = max_steps.unwrap_or(settings.agent.max_steps);
    let registry = build_registry(&settings.capabilities);
    let oracle = build_oracle(&settings.model);
    let agent = Arc::new(build_agent(&settings.agent, oracle, registry));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling running tasks");
            on_interrupt.cancel();
        }
    });

    let mut tasks = JoinSet::new();
    for (idx, goal) in goals.into_iter().enumerate() {
        let agent = Arc::clone(&agent);
        let token = cancel.child_token();
        tasks.spawn(async move {
            let result = agent.execute_task_with_cancel(&goal, max_steps, token).await;
            (idx, goal, result)
        });
    }

    let mut finished = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        finished.push(joined.context("task panicked")?);
    }
    finished.sort_by_key(|(idx, _, _)| *idx);

    let mut failures = 0;
    for (_, goal, result) in &finished {
        if result.is_err() {
            failures += 1;
        }
        print!("{}", report::render(goal, result));
    }

    if failures > 0 {
        bail!("{failures} of {} task(s) failed", finished.len());
    }
    Ok(())
}

fn cmd_capabilities(settings: &Settings) -> Result<()> {
    let registry = build_registry(&settings.capabilities);
    for capability in registry.list() {
        println!("{:<12} {}", capability.name, capability.description);
    }
    Ok(())
}

async fn cmd_models(settings: &Settings) -> Result<()> {
    let models = list_models(&settings.model)
        .await
        .with_context(|| format!("list models at {}", settings.model.base_url))?;
    if models.is_empty() {
        println!("(no models reported)");
    }
    for model in models {
        let marker = if model == settings.model.default { "*" } else { " " };
        println!("{marker} {model}");
    }
    Ok(())
}
