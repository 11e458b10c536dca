//! Independent objective runs side by side, one browser session each.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::agent_engine::artifacts::ArtifactStore;
use crate::agent_engine::engine::{AgentEngine, SessionOutcome};
use crate::agent_engine::history::SessionHistory;
use crate::agent_engine::state::Termination;
use crate::config::AppConfig;
use crate::driver::webdriver::WebDriverSession;
use crate::errors::{WebPilotError, WebPilotResult};
use crate::executor::page::{normalize_url, wait_until_ready};
use crate::oracle::provider::DecisionOracle;

#[derive(Debug, Default, Deserialize)]
struct BatchFile {
    #[serde(default)]
    tasks: Vec<BatchTask>,
}

/// One `[[tasks]]` entry of a batch file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTask {
    pub name: String,
    pub objective: String,
    #[serde(default)]
    pub start_url: Option<String>,
}

pub fn load_batch(path: &Path) -> WebPilotResult<Vec<BatchTask>> {
    let content = std::fs::read_to_string(path)?;
    let file: BatchFile = toml::from_str(&content)?;
    if file.tasks.is_empty() {
        return Err(WebPilotError::Config(format!("{} defines no [[tasks]]", path.display())));
    }
    Ok(file.tasks)
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub name: String,
    pub termination: Option<Termination>,
    pub steps: u32,
    pub report_path: Option<PathBuf>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.termination.as_ref().is_some_and(Termination::is_success)
    }
}

/// Builds a fresh engine (and browser session) for one task.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(&self, task: &BatchTask) -> WebPilotResult<AgentEngine>;
}

/// One WebDriver session per task, all sharing the oracle client.
pub struct WebDriverFactory {
    config: AppConfig,
    oracle: Arc<dyn DecisionOracle>,
    interrupt: Arc<AtomicBool>,
}

impl WebDriverFactory {
    pub fn new(config: AppConfig, oracle: Arc<dyn DecisionOracle>, interrupt: Arc<AtomicBool>) -> Self {
        Self {
            config,
            oracle,
            interrupt,
        }
    }
}

#[async_trait]
impl EngineFactory for WebDriverFactory {
    async fn create(&self, task: &BatchTask) -> WebPilotResult<AgentEngine> {
        let driver = WebDriverSession::connect(&self.config.driver).await?;
        tracing::info!(task = %task.name, session = %driver.session_id(), "browser session opened");
        let data_dir = self.config.storage.resolve_data_dir();
        let history = SessionHistory::persistent(&data_dir)?;
        Ok(AgentEngine::new(
            Arc::new(driver),
            self.oracle.clone(),
            &self.config,
            ArtifactStore::new(data_dir),
            history,
            self.interrupt.clone(),
        ))
    }
}

/// Run every task with at most `workers` at a time. Outcomes are collected in
/// completion order.
pub async fn run_batch(tasks: Vec<BatchTask>, workers: usize, factory: Arc<dyn EngineFactory>) -> Vec<TaskOutcome> {
    let limit = Arc::new(Semaphore::new(workers.max(1)));
    let mut join_set = JoinSet::new();
    tracing::info!(tasks = tasks.len(), workers = workers.max(1), "batch started");

    for task in tasks {
        let limit = limit.clone();
        let factory = factory.clone();
        join_set.spawn(async move {
            let started = Instant::now();
            let result = match limit.acquire_owned().await {
                Ok(_permit) => run_task(&task, factory.as_ref()).await,
                Err(_) => Err(WebPilotError::Cancelled),
            };
            finish(task.name, result, started.elapsed())
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(outcome) => {
                tracing::info!(
                    task = %outcome.name,
                    success = outcome.succeeded(),
                    steps = outcome.steps,
                    error = ?outcome.error,
                    "task finished"
                );
                outcomes.push(outcome);
            }
            Err(e) => tracing::error!(error = %e, "batch task panicked or was cancelled"),
        }
    }
    outcomes
}

async fn run_task(task: &BatchTask, factory: &dyn EngineFactory) -> WebPilotResult<SessionOutcome> {
    let mut engine = factory.create(task).await?;
    let result = async {
        if let Some(url) = task.start_url.as_deref().filter(|u| !u.trim().is_empty()) {
            engine.driver().navigate(&normalize_url(url)).await?;
            wait_until_ready(engine.driver(), Duration::from_secs(30)).await?;
        }
        engine.run_objective(&task.objective).await
    }
    .await;

    if let Err(e) = engine.driver().quit().await {
        tracing::debug!(task = %task.name, error = %e, "session already closed");
    }
    result
}

fn finish(name: String, result: WebPilotResult<SessionOutcome>, elapsed: Duration) -> TaskOutcome {
    let duration_ms = elapsed.as_millis() as u64;
    match result {
        Ok(outcome) => TaskOutcome {
            name,
            termination: Some(outcome.termination),
            steps: outcome.steps,
            report_path: outcome.report_path,
            error: None,
            duration_ms,
        },
        Err(e) => TaskOutcome {
            name,
            termination: None,
            steps: 0,
            report_path: None,
            error: Some(e.to_string()),
            duration_ms,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::config::PacingConfig;
    use crate::driver::Rect;
    use crate::testing::{decision, raw_node, FakeDriver, ScriptedOracle};

    struct FakeFactory {
        dir: tempfile::TempDir,
        created: AtomicUsize,
        drivers: Mutex<Vec<Arc<FakeDriver>>>,
    }

    #[async_trait]
    impl EngineFactory for FakeFactory {
        async fn create(&self, task: &BatchTask) -> WebPilotResult<AgentEngine> {
            if task.name == "broken" {
                return Err(WebPilotError::SessionLost("no browser available".into()));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            let driver = Arc::new(FakeDriver::with_nodes(vec![raw_node(
                "m-0",
                "a",
                "Home",
                Rect::new(0.0, 0.0, 50.0, 20.0),
            )]));
            driver.set_url("https://example.com/");
            self.drivers.lock().unwrap().push(driver.clone());
            let oracle = ScriptedOracle::repeating(decision("ANSWER", serde_json::json!({ "text": task.name })));
            let mut config = AppConfig::default();
            config.pacing = PacingConfig::immediate();
            Ok(AgentEngine::new(
                driver,
                Arc::new(oracle),
                &config,
                ArtifactStore::new(self.dir.path().join(&task.name)),
                SessionHistory::in_memory(),
                Arc::new(AtomicBool::new(false)),
            ))
        }
    }

    fn task(name: &str, start_url: Option<&str>) -> BatchTask {
        BatchTask {
            name: name.into(),
            objective: format!("finish {name}"),
            start_url: start_url.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn every_task_gets_its_own_engine_and_an_outcome() {
        let factory = Arc::new(FakeFactory {
            dir: tempfile::tempdir().unwrap(),
            created: AtomicUsize::new(0),
            drivers: Mutex::new(Vec::new()),
        });
        let tasks = vec![
            task("alpha", Some("example.org")),
            task("beta", None),
            task("broken", None),
            task("gamma", None),
        ];

        let mut outcomes = run_batch(tasks, 2, factory.clone()).await;
        outcomes.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(outcomes.len(), 4);
        assert_eq!(factory.created.load(Ordering::SeqCst), 3);
        let names: Vec<&str> = outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "broken", "gamma"]);
        assert!(outcomes[0].succeeded());
        assert_eq!(
            outcomes[0].termination,
            Some(Termination::Success {
                answer: "alpha".into()
            })
        );
        assert!(!outcomes[2].succeeded());
        assert!(outcomes[2].error.as_deref().unwrap().contains("no browser available"));

        let drivers = factory.drivers.lock().unwrap();
        assert_eq!(drivers.iter().map(|d| d.calls_named("navigate:https://example.org")).sum::<usize>(), 1);
        assert!(drivers.iter().all(|d| d.calls_named("quit") == 1));
    }

    #[test]
    fn batch_file_parses_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.toml");
        std::fs::write(
            &path,
            r#"
[[tasks]]
name = "docs"
objective = "open docs.rs and search tokio"

[[tasks]]
name = "news"
objective = "read the top headline"
start_url = "https://news.ycombinator.com"
"#,
        )
        .unwrap();

        let tasks = load_batch(&path).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].start_url, None);
        assert_eq!(tasks[1].start_url.as_deref(), Some("https://news.ycombinator.com"));
    }

    #[test]
    fn empty_batch_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(load_batch(&path), Err(WebPilotError::Config(_))));
    }
}
