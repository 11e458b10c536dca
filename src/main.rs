//! WebPilot entry point: interactive shell, one-shot objective, or batch run.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use webpilot::agent_engine::artifacts::ArtifactStore;
use webpilot::agent_engine::engine::AgentEngine;
use webpilot::agent_engine::history::SessionHistory;
use webpilot::agent_engine::parallel::{load_batch, run_batch, WebDriverFactory};
use webpilot::commands;
use webpilot::config::{load_config, AppConfig};
use webpilot::driver::webdriver::WebDriverSession;
use webpilot::driver::DocumentDriver;
use webpilot::errors::WebPilotResult;
use webpilot::oracle::provider::DecisionOracle;
use webpilot::oracle::registry::OracleRegistry;

/// Objective-driven web page automation.
#[derive(Parser)]
#[command(name = "webpilot")]
#[command(version)]
struct Cli {
    /// Configuration file path (default: config.toml next to the binary or in the working directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WebDriver endpoint, overrides `[driver] webdriver_url`
    #[arg(long)]
    webdriver_url: Option<String>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Run this objective once and exit
    #[arg(short, long, conflicts_with = "batch")]
    objective: Option<String>,

    /// Batch file with [[tasks]] entries, run in parallel sessions
    #[arg(short, long)]
    batch: Option<PathBuf>,

    /// Concurrent sessions for --batch
    #[arg(short, long, default_value_t = 2)]
    workers: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    webpilot::init_tracing();
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(url) = &cli.webdriver_url {
                config.driver.webdriver_url = url.clone();
            }
            if cli.headless {
                config.driver.headless = true;
            }
            config
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let registry = OracleRegistry::from_config(&config.oracle);
    let oracle = match registry.active() {
        Ok(oracle) => oracle,
        Err(e) => {
            tracing::error!(error = %e, available = ?registry.list_names(), "no usable decision oracle");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(oracle = %registry.active_name(), "decision oracle ready");

    let interrupt = Arc::new(AtomicBool::new(false));
    spawn_interrupt_listener(interrupt.clone());

    let result = match &cli.batch {
        Some(path) => batch(path, cli.workers, config, oracle, interrupt).await,
        None => interactive(cli.objective.as_deref(), &config, oracle, interrupt).await,
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "webpilot stopped");
            ExitCode::FAILURE
        }
    }
}

/// Ctrl-C only raises the flag; the running objective stops at its next check point.
fn spawn_interrupt_listener(flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt requested");
            flag.store(true, Ordering::SeqCst);
        }
    });
}

async fn interactive(
    objective: Option<&str>,
    config: &AppConfig,
    oracle: Arc<dyn DecisionOracle>,
    interrupt: Arc<AtomicBool>,
) -> WebPilotResult<ExitCode> {
    let driver = match WebDriverSession::connect(&config.driver).await {
        Ok(driver) => Arc::new(driver),
        Err(e) => {
            tracing::error!(error = %e, url = %config.driver.webdriver_url, "could not start a browser session");
            return Ok(ExitCode::FAILURE);
        }
    };
    tracing::info!(session = %driver.session_id(), "browser session opened");

    let data_dir = config.storage.resolve_data_dir();
    let history = SessionHistory::persistent(&data_dir)?;
    let mut engine = AgentEngine::new(
        driver.clone(),
        oracle,
        config,
        ArtifactStore::new(data_dir),
        history,
        interrupt,
    );

    let result = match objective {
        Some(objective) => engine.run_objective(objective).await.map(|outcome| {
            println!("{} after {} steps", outcome.termination, outcome.steps);
            if outcome.termination.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }),
        None => commands::run_repl(&mut engine).await.map(|_| ExitCode::SUCCESS),
    };

    if let Err(e) = driver.quit().await {
        tracing::debug!(error = %e, "browser session already closed");
    }
    result
}

async fn batch(
    path: &std::path::Path,
    workers: usize,
    config: AppConfig,
    oracle: Arc<dyn DecisionOracle>,
    interrupt: Arc<AtomicBool>,
) -> WebPilotResult<ExitCode> {
    let tasks = load_batch(path)?;
    let factory = Arc::new(WebDriverFactory::new(config, oracle, interrupt));
    let outcomes = run_batch(tasks, workers, factory).await;

    let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
    for outcome in &outcomes {
        let status = match (&outcome.termination, &outcome.error) {
            (Some(termination), _) => termination.to_string(),
            (None, Some(error)) => format!("error: {error}"),
            (None, None) => "unknown".into(),
        };
        println!("{:<20} {:>4} steps {:>8}ms  {status}", outcome.name, outcome.steps, outcome.duration_ms);
    }
    println!("{succeeded}/{} tasks succeeded", outcomes.len());
    Ok(if succeeded == outcomes.len() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
