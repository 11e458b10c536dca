use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::agent_engine::artifacts::ArtifactStore;
use crate::agent_engine::budget::LoopBudget;
use crate::agent_engine::history::SessionHistory;
use crate::agent_engine::loop_control::{LoopController, RetryDecision, Verdict};
use crate::agent_engine::recorder::{Macro, MacroRecorder};
use crate::agent_engine::report::SessionReport;
use crate::agent_engine::state::{LoopState, Termination};
use crate::agent_engine::url_hint;
use crate::config::{AppConfig, BudgetConfig, PacingConfig};
use crate::driver::DocumentDriver;
use crate::errors::{WebPilotError, WebPilotResult};
use crate::executor::action::{ActionKind, ActionResult};
use crate::executor::obstruction::{ObstructionHandler, PageObstructionHandler};
use crate::executor::{ActionExecutor, ExecutionContext};
use crate::oracle::provider::DecisionOracle;
use crate::oracle::types::Decision;
use crate::perception::catalog::CandidateCatalogBuilder;
use crate::perception::observation::{Observation, ObservationComposer};
use crate::perception::types::Catalog;

const FIRST_FEEDBACK: &str = "Starting new objective";

/// What one objective run ended with.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub termination: Termination,
    pub steps: u32,
    pub report: SessionReport,
    pub report_path: Option<PathBuf>,
    pub final_snapshot: Option<PathBuf>,
}

/// Data carried from one state to the next within a run.
struct Cycle {
    catalog: Catalog,
    observation: Observation,
    feedback: String,
}

/// Drives one browser session through perceive → decide → act cycles.
/// Objectives run one at a time; history, artifacts and the macro recorder
/// span every objective of the session.
pub struct AgentEngine {
    driver: Arc<dyn DocumentDriver>,
    oracle: Arc<dyn DecisionOracle>,
    budget: BudgetConfig,
    pacing: PacingConfig,
    navigation_timeout: Duration,
    builder: CandidateCatalogBuilder,
    composer: ObservationComposer,
    executor: ActionExecutor,
    obstruction: Arc<dyn ObstructionHandler>,
    artifacts: ArtifactStore,
    history: SessionHistory,
    recorder: MacroRecorder,
    interrupt: Arc<AtomicBool>,
    started_at: DateTime<Utc>,
}

impl AgentEngine {
    pub fn new(
        driver: Arc<dyn DocumentDriver>,
        oracle: Arc<dyn DecisionOracle>,
        config: &AppConfig,
        artifacts: ArtifactStore,
        history: SessionHistory,
        interrupt: Arc<AtomicBool>,
    ) -> Self {
        Self {
            driver,
            oracle,
            budget: config.budget.clone(),
            pacing: config.pacing.clone(),
            navigation_timeout: Duration::from_secs(config.driver.navigation_timeout_secs),
            builder: CandidateCatalogBuilder::new(config.perception.clone()),
            composer: ObservationComposer::new(&config.perception),
            executor: ActionExecutor::default(),
            obstruction: Arc::new(PageObstructionHandler),
            artifacts,
            history,
            recorder: MacroRecorder::default(),
            interrupt,
            started_at: Utc::now(),
        }
    }

    pub fn with_obstruction_handler(mut self, handler: Arc<dyn ObstructionHandler>) -> Self {
        self.obstruction = handler;
        self
    }

    pub fn driver(&self) -> &dyn DocumentDriver {
        self.driver.as_ref()
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn recorder(&mut self) -> &mut MacroRecorder {
        &mut self.recorder
    }

    pub fn obstruction(&self) -> &dyn ObstructionHandler {
        self.obstruction.as_ref()
    }

    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// One catalog build outside any run, for page inspection.
    pub async fn scan(&self) -> WebPilotResult<Catalog> {
        self.builder.build(self.driver.as_ref()).await
    }

    /// Summary over every action of the session so far.
    pub fn session_report(&self) -> SessionReport {
        SessionReport::summarize(&self.history.session_id, self.started_at, self.history.entries())
    }

    /// Run one objective to termination. Every ending goes through the same
    /// cleanup (final screenshot, report); a lost session or an unopenable start
    /// page is then returned as `Err`.
    pub async fn run_objective(&mut self, objective: &str) -> WebPilotResult<SessionOutcome> {
        let objective = objective.trim();
        if objective.is_empty() {
            return Err(WebPilotError::Objective("objective is empty".into()));
        }
        let run_started = Utc::now();
        let history_start = self.history.len();
        let mut ctl = LoopController::new(
            LoopBudget::for_objective(objective, &self.budget),
            self.pacing.clone(),
            self.interrupt.clone(),
        );
        tracing::info!(
            objective,
            tier = ?ctl.budget().tier,
            step_ceiling = ctl.budget().step_ceiling,
            "objective started"
        );

        let mut cycle = Cycle {
            catalog: Catalog::default(),
            observation: Observation::default(),
            feedback: FIRST_FEEDBACK.to_string(),
        };

        let mut fatal: Option<WebPilotError> = None;
        let termination = match self.open_start_page(objective, &ctl).await {
            Ok(Some(result)) => {
                cycle.feedback = feedback_for(&result);
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::error!(error = %e, "start page could not be opened");
                let termination = Termination::Fatal { reason: e.to_string() };
                fatal = Some(e);
                Some(termination)
            }
        };
        let termination = match termination {
            Some(t) => t,
            None => self.drive(objective, &mut ctl, &mut cycle, &mut fatal).await,
        };

        let outcome = self.finalize(objective, &ctl, termination, run_started, history_start).await;
        tracing::info!(
            termination = %outcome.termination,
            steps = outcome.steps,
            elapsed_ms = ctl.budget().elapsed().as_millis() as u64,
            "objective finished"
        );
        match (&outcome.termination, fatal) {
            (Termination::Fatal { .. }, Some(e)) => Err(e),
            (Termination::Fatal { reason }, None) => Err(WebPilotError::SessionLost(reason.clone())),
            _ => Ok(outcome),
        }
    }

    /// Re-run a recorded macro through the executor. Element ids resolve
    /// against a fresh catalog per step, numbered as the oracle saw it.
    /// Failed steps are recorded and skipped; an interrupt stops the replay
    /// and a lost session is returned as `Err`.
    pub async fn replay(&mut self, recorded: &Macro) -> WebPilotResult<Vec<ActionResult>> {
        tracing::info!(name = %recorded.name, steps = recorded.steps.len(), "replaying macro");
        let mut results = Vec::with_capacity(recorded.steps.len());
        for (index, step) in recorded.steps.iter().enumerate() {
            if self.interrupt.load(Ordering::SeqCst) {
                tracing::warn!(name = %recorded.name, step = index + 1, "macro replay interrupted");
                break;
            }
            if index > 0 {
                pause(Duration::from_millis(self.pacing.scroll_settle_ms)).await;
            }
            let mut catalog = match self.builder.build(self.driver.as_ref()).await {
                Ok(catalog) => catalog,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, step = index + 1, "catalog unavailable for macro step");
                    Catalog::default()
                }
            };
            let decision = Decision::action(&step.action, serde_json::Value::Object(step.parameters.clone()));
            let observation = Observation {
                generation: catalog.generation,
                elements: self.composer.select(&catalog),
                ..Observation::default()
            };
            let mut ctx = ExecutionContext {
                driver: self.driver.as_ref(),
                builder: &self.builder,
                catalog: &mut catalog,
                observation: &observation,
                artifacts: &self.artifacts,
                pacing: &self.pacing,
                navigation_timeout: self.navigation_timeout,
                deadline: None,
            };
            let result = self.executor.execute(&decision, &mut ctx, &mut self.history, 0).await?;
            results.push(result);
        }
        let succeeded = results.iter().filter(|r| r.success).count();
        tracing::info!(name = %recorded.name, succeeded, executed = results.len(), "macro replay finished");
        Ok(results)
    }

    // ── State machine ───────────────────────────────────────────────────────

    async fn drive(
        &mut self,
        objective: &str,
        ctl: &mut LoopController,
        cycle: &mut Cycle,
        fatal: &mut Option<WebPilotError>,
    ) -> Termination {
        let mut state = LoopState::Perceiving;
        loop {
            match state.clone() {
                // ── Perceiving: fresh catalog, step accounting ─────────────
                LoopState::Perceiving => {
                    if let Some(termination) = ctl.begin_cycle() {
                        state = LoopState::Terminated { termination };
                        continue;
                    }
                    match self.perceive(ctl).await {
                        Ok(Some(catalog)) => {
                            cycle.catalog = catalog;
                            state = LoopState::Observing;
                        }
                        Ok(None) => {
                            tracing::info!(step = ctl.budget().steps, "nothing actionable yet; restarting cycle");
                        }
                        Err(e) => state = lost(e, fatal),
                    }
                }

                // ── Observing: annotated snapshot for the oracle ───────────
                LoopState::Observing => {
                    match self
                        .composer
                        .compose(self.driver.as_ref(), objective, &cycle.feedback, &cycle.catalog)
                        .await
                    {
                        Ok(observation) => {
                            cycle.observation = observation;
                            state = LoopState::Deciding;
                        }
                        Err(e) if e.is_fatal() => state = lost(e, fatal),
                        Err(e) => {
                            tracing::warn!(error = %e, "observation failed");
                            cycle.feedback = format!("Observation failed: {e}");
                            ctl.record_cycle_failure();
                            state = LoopState::Evaluating { success: false };
                        }
                    }
                }

                // ── Deciding: one oracle round-trip ────────────────────────
                LoopState::Deciding => match self.oracle.decide(&cycle.observation.to_request()).await {
                    Ok(decision) if decision.proposed().is_some() => {
                        tracing::info!(
                            thought = %decision.thought,
                            confidence = decision.confidence,
                            action = ?decision.proposed().map(|a| &a.name),
                            "decision received"
                        );
                        state = LoopState::Acting { decision };
                    }
                    Ok(_) => {
                        tracing::warn!("decision carried no action");
                        cycle.feedback =
                            "Previous reply had no action. Reply with exactly one action in the JSON format.".into();
                        ctl.record_cycle_failure();
                        state = LoopState::Evaluating { success: false };
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, oracle = %self.oracle.name(), "decision failed");
                        cycle.feedback = format!("Decision service error: {e}");
                        ctl.record_cycle_failure();
                        state = LoopState::Evaluating { success: false };
                    }
                },

                // ── Acting: execute, retrying the same decision on failure ─
                LoopState::Acting { decision } => {
                    let result = match self.act(&decision, ctl, cycle).await {
                        Ok(result) => result,
                        Err(e) => {
                            state = lost(e, fatal);
                            continue;
                        }
                    };
                    cycle.feedback = feedback_for(&result);
                    if result.success {
                        self.recorder.capture(&decision);
                        ctl.record_success();
                        state = if result.is_answer() {
                            LoopState::Terminated {
                                termination: Termination::Success { answer: result.message },
                            }
                        } else {
                            LoopState::Evaluating { success: true }
                        };
                    } else {
                        match ctl.record_action_failure() {
                            RetryDecision::Retry { delay } => {
                                pause(delay).await;
                                state = LoopState::Acting { decision };
                            }
                            RetryDecision::Consumed => state = LoopState::Evaluating { success: false },
                        }
                    }
                }

                // ── Evaluating: budgets decide continue or stop ────────────
                LoopState::Evaluating { success } => match ctl.evaluate(success) {
                    Verdict::Continue { pause: wait } => {
                        pause(wait).await;
                        state = LoopState::Perceiving;
                    }
                    Verdict::Stop(termination) => state = LoopState::Terminated { termination },
                },

                LoopState::Terminated { termination } => return termination,
            }

            tokio::task::yield_now().await;
        }
    }

    /// Build a catalog, tolerating an empty page: quick rebuilds, then one
    /// obstruction-clearing attempt and a wait. `None` restarts the cycle.
    async fn perceive(&self, ctl: &LoopController) -> WebPilotResult<Option<Catalog>> {
        let driver = self.driver.as_ref();
        let catalog = self.builder.build(driver).await?;
        if !catalog.is_empty() {
            return Ok(Some(catalog));
        }

        for attempt in 1..=self.budget.empty_catalog_retries {
            pause(ctl.bounded(Duration::from_millis(self.pacing.empty_catalog_backoff_ms))).await;
            let catalog = self.builder.build(driver).await?;
            if !catalog.is_empty() {
                return Ok(Some(catalog));
            }
            tracing::debug!(attempt, "catalog still empty");
        }

        tracing::warn!("no actionable elements; trying to clear obstructions");
        let cleared = match self.obstruction.clear(driver).await {
            Ok(cleared) => cleared,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "obstruction handling failed");
                false
            }
        };
        let wait = if cleared {
            self.pacing.obstruction_settle_ms
        } else {
            self.pacing.unready_wait_ms
        };
        pause(ctl.bounded(Duration::from_millis(wait))).await;
        Ok(None)
    }

    async fn act(&mut self, decision: &Decision, ctl: &LoopController, cycle: &mut Cycle) -> WebPilotResult<ActionResult> {
        let mut ctx = ExecutionContext {
            driver: self.driver.as_ref(),
            builder: &self.builder,
            catalog: &mut cycle.catalog,
            observation: &cycle.observation,
            artifacts: &self.artifacts,
            pacing: &self.pacing,
            navigation_timeout: self.navigation_timeout,
            deadline: Some(ctl.budget().deadline),
        };
        self.executor
            .execute(decision, &mut ctx, &mut self.history, ctl.retries())
            .await
    }

    /// On a blank tab, open the page the objective names through a
    /// synthesized NAVIGATE. `Ok(None)` when a page is already loaded.
    async fn open_start_page(&mut self, objective: &str, ctl: &LoopController) -> WebPilotResult<Option<ActionResult>> {
        let current = match self.driver.current_url().await {
            Ok(url) => url,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "current url unavailable; assuming blank tab");
                String::new()
            }
        };
        if !url_hint::is_blank(&current) {
            return Ok(None);
        }
        let url = url_hint::start_url(objective).ok_or_else(|| {
            WebPilotError::Objective(format!("no start page could be derived from '{objective}'"))
        })?;
        tracing::info!(url = %url, "opening start page");

        let decision = Decision::action(ActionKind::Navigate.name(), serde_json::json!({ "url": url }));
        let mut cycle = Cycle {
            catalog: Catalog::default(),
            observation: Observation::default(),
            feedback: String::new(),
        };
        self.act(&decision, ctl, &mut cycle).await.map(Some)
    }

    // ── Cleanup ─────────────────────────────────────────────────────────────

    async fn finalize(
        &mut self,
        objective: &str,
        ctl: &LoopController,
        termination: Termination,
        run_started: DateTime<Utc>,
        history_start: usize,
    ) -> SessionOutcome {
        let final_snapshot = match self.driver.screenshot().await {
            Ok(png) => match self.artifacts.save_screenshot("final", &png) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(error = %e, "could not store final screenshot");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "could not capture final screenshot");
                None
            }
        };

        let budget = ctl.budget();
        let report = SessionReport::summarize(&self.history.session_id, run_started, self.history.since(history_start))
            .with_run(
                objective,
                &termination,
                budget.steps,
                budget.step_ceiling,
                final_snapshot.clone(),
            );
        let report_path = match report.write(&self.artifacts) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "could not write session report");
                None
            }
        };

        SessionOutcome {
            termination,
            steps: budget.steps,
            report,
            report_path,
            final_snapshot,
        }
    }
}

fn lost(error: WebPilotError, slot: &mut Option<WebPilotError>) -> LoopState {
    tracing::error!(error = %error, "driver session lost; stopping");
    let termination = Termination::Fatal {
        reason: error.to_string(),
    };
    *slot = Some(error);
    LoopState::Terminated { termination }
}

fn feedback_for(result: &ActionResult) -> String {
    if result.success {
        format!("{} succeeded: {}", result.action_type, result.message)
    } else {
        format!(
            "{} failed: {}",
            result.action_type,
            result.error.as_deref().unwrap_or(&result.message)
        )
    }
}

async fn pause(wait: Duration) {
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::agent_engine::recorder::MacroStep;
    use crate::agent_engine::state::ExhaustionCause;
    use crate::driver::Rect;
    use crate::testing::{decision, raw_node, FakeDriver, ScriptedOracle};

    struct Fixture {
        driver: Arc<FakeDriver>,
        oracle: Arc<ScriptedOracle>,
        interrupt: Arc<AtomicBool>,
        dir: tempfile::TempDir,
        config: AppConfig,
    }

    impl Fixture {
        fn new(oracle: ScriptedOracle) -> Self {
            let driver = FakeDriver::with_nodes(vec![
                raw_node("m-0", "a", "Docs", Rect::new(10.0, 10.0, 80.0, 20.0)),
                raw_node("m-1", "button", "Save", Rect::new(10.0, 40.0, 80.0, 20.0)),
            ]);
            driver.set_url("https://example.com/");
            let mut config = AppConfig::default();
            config.pacing = PacingConfig::immediate();
            Self {
                driver: Arc::new(driver),
                oracle: Arc::new(oracle),
                interrupt: Arc::new(AtomicBool::new(false)),
                dir: tempfile::tempdir().unwrap(),
                config,
            }
        }

        fn engine(&self) -> AgentEngine {
            AgentEngine::new(
                self.driver.clone(),
                self.oracle.clone(),
                &self.config,
                ArtifactStore::new(self.dir.path()),
                SessionHistory::in_memory(),
                self.interrupt.clone(),
            )
        }

        fn reports(&self) -> usize {
            std::fs::read_dir(self.dir.path().join("reports"))
                .map(|entries| entries.count())
                .unwrap_or(0)
        }
    }

    fn answer(text: &str) -> Decision {
        decision("ANSWER", json!({ "text": text }))
    }

    #[tokio::test]
    async fn answer_ends_with_success() {
        let fx = Fixture::new(ScriptedOracle::repeating(answer("found it")));
        let mut engine = fx.engine();

        let outcome = engine.run_objective("find the docs").await.unwrap();

        assert_eq!(
            outcome.termination,
            Termination::Success {
                answer: "found it".into()
            }
        );
        assert_eq!(outcome.steps, 1);
        assert!(outcome.final_snapshot.is_some());
        assert!(outcome.report_path.unwrap().exists());
        let request = &fx.oracle.requests()[0];
        assert_eq!(request.feedback, FIRST_FEEDBACK);
        assert_eq!(request.elements.len(), 2);
    }

    #[tokio::test]
    async fn five_consecutive_failures_exhaust_the_run() {
        let mut fx = Fixture::new(ScriptedOracle::repeating(decision("CLICK", json!({ "id": 99 }))));
        fx.config.budget.max_action_retries = 0;
        fx.config.budget.max_consecutive_failures = 5;
        let mut engine = fx.engine();

        let outcome = engine.run_objective("click the missing thing").await.unwrap();

        assert_eq!(
            outcome.termination,
            Termination::exhausted(ExhaustionCause::ConsecutiveFailures)
        );
        assert_eq!(outcome.report.trailing_failures, 5);
        assert_eq!(outcome.report.trailing_successes, 0);
        assert_eq!(engine.history().len(), 5);
        assert_eq!(fx.reports(), 1);
    }

    #[tokio::test]
    async fn step_ceiling_bounds_the_run() {
        let mut fx = Fixture::new(ScriptedOracle::repeating(decision("SCROLL", json!({}))));
        fx.config.budget.simple_step_ceiling = 3;
        let mut engine = fx.engine();

        let outcome = engine.run_objective("keep scrolling").await.unwrap();

        assert_eq!(outcome.termination, Termination::exhausted(ExhaustionCause::Steps));
        assert_eq!(outcome.steps, 3);
        assert_eq!(fx.oracle.calls(), 3);
        assert_eq!(fx.oracle.requests()[1].feedback, "SCROLL succeeded: Scrolled down 500px");
    }

    #[tokio::test]
    async fn spent_deadline_stops_before_any_cycle() {
        let mut fx = Fixture::new(ScriptedOracle::repeating(answer("x")));
        fx.config.budget.time_budget_ms = 0;
        let mut engine = fx.engine();

        let outcome = engine.run_objective("anything").await.unwrap();

        assert_eq!(outcome.termination, Termination::exhausted(ExhaustionCause::Deadline));
        assert_eq!(outcome.steps, 0);
        assert_eq!(fx.oracle.calls(), 0);
        assert_eq!(fx.reports(), 1);
    }

    #[tokio::test]
    async fn malformed_decisions_count_as_failures_but_not_retries() {
        let oracle = ScriptedOracle::sequence(vec![
            Ok(Decision::default()),
            Err(WebPilotError::Oracle("overloaded".into())),
        ])
        .then_repeat(answer("done"));
        let fx = Fixture::new(oracle);
        let mut engine = fx.engine();

        let outcome = engine.run_objective("find the docs").await.unwrap();

        assert!(outcome.termination.is_success());
        assert_eq!(outcome.steps, 3);
        assert_eq!(engine.history().len(), 1);
        assert!(fx.oracle.requests()[2].feedback.contains("overloaded"));
    }

    #[tokio::test]
    async fn retries_the_same_decision_before_a_new_cycle() {
        let oracle = ScriptedOracle::sequence(vec![Ok(decision("CLICK", json!({ "id": 42 })))]).then_repeat(answer("ok"));
        let mut fx = Fixture::new(oracle);
        fx.config.budget.max_action_retries = 2;
        let mut engine = fx.engine();

        let outcome = engine.run_objective("click it").await.unwrap();

        assert!(outcome.termination.is_success());
        let retries: Vec<u32> = engine.history().entries().iter().map(|r| r.retry_count).collect();
        assert_eq!(retries, vec![0, 1, 2, 0]);
        assert_eq!(fx.oracle.calls(), 2);
        assert_eq!(outcome.steps, 2);
    }

    struct RevealingHandler {
        driver: Arc<FakeDriver>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ObstructionHandler for RevealingHandler {
        async fn clear(&self, _driver: &dyn DocumentDriver) -> WebPilotResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.driver
                .set_nodes(vec![raw_node("m-0", "button", "Continue", Rect::new(0.0, 0.0, 50.0, 20.0))]);
            Ok(true)
        }
    }

    #[tokio::test]
    async fn empty_page_gets_one_obstruction_attempt_per_cycle() {
        let fx = Fixture::new(ScriptedOracle::repeating(answer("through")));
        fx.driver.set_nodes(Vec::new());
        let handler = Arc::new(RevealingHandler {
            driver: fx.driver.clone(),
            calls: AtomicUsize::new(0),
        });
        let mut engine = fx.engine().with_obstruction_handler(handler.clone());

        let outcome = engine.run_objective("get past the banner").await.unwrap();

        assert!(outcome.termination.is_success());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.driver.calls_named("scan_document"), 3);
        assert_eq!(outcome.steps, 2);
    }

    #[tokio::test]
    async fn lost_session_is_returned_after_cleanup() {
        let fx = Fixture::new(ScriptedOracle::repeating(decision("CLICK", json!({ "id": 1 }))));
        fx.driver.lose_session_on("click");
        let mut engine = fx.engine();

        let err = engine.run_objective("click docs").await.unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(fx.reports(), 1);
        assert_eq!(engine.history().len(), 1);
    }

    #[tokio::test]
    async fn interrupt_routes_through_cleanup() {
        let fx = Fixture::new(ScriptedOracle::repeating(answer("x")));
        fx.interrupt.store(true, std::sync::atomic::Ordering::SeqCst);
        let mut engine = fx.engine();

        let outcome = engine.run_objective("anything").await.unwrap();

        assert_eq!(outcome.termination, Termination::Interrupted);
        assert_eq!(fx.oracle.calls(), 0);
        assert_eq!(fx.reports(), 1);
    }

    #[tokio::test]
    async fn blank_tab_opens_the_named_site_first() {
        let fx = Fixture::new(ScriptedOracle::repeating(answer("title read")));
        fx.driver.set_url("about:blank");
        let mut engine = fx.engine();

        let outcome = engine.run_objective("open example.com and read the title").await.unwrap();

        assert!(outcome.termination.is_success());
        assert_eq!(fx.driver.calls_named("navigate:https://example.com"), 1);
        let first = &engine.history().entries()[0];
        assert_eq!(first.action_type, "NAVIGATE");
        assert!(first.success);
        assert!(fx.oracle.requests()[0].feedback.starts_with("NAVIGATE succeeded"));
    }

    #[tokio::test]
    async fn blank_tab_without_a_site_is_an_objective_error() {
        let fx = Fixture::new(ScriptedOracle::repeating(answer("x")));
        fx.driver.set_url("about:blank");
        let mut engine = fx.engine();

        let err = engine.run_objective("?? !!").await.unwrap_err();

        assert!(matches!(err, WebPilotError::Objective(_)));
        assert_eq!(fx.reports(), 1);
        assert_eq!(fx.oracle.calls(), 0);
    }

    #[tokio::test]
    async fn deadline_expiring_mid_run_cuts_long_waits_short() {
        let mut fx = Fixture::new(ScriptedOracle::repeating(decision("WAIT", json!({ "seconds": 10 }))));
        fx.config.budget.time_budget_ms = 200;
        fx.config.pacing.max_wait_ms = 30_000;
        let mut engine = fx.engine();

        let started = std::time::Instant::now();
        let outcome = engine.run_objective("wait for the page").await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(outcome.termination, Termination::exhausted(ExhaustionCause::Deadline));
        assert!(outcome.steps >= 1);
        assert!(elapsed < Duration::from_millis(1_200), "run took {elapsed:?}");
        assert!(engine.history().entries().iter().all(|r| r.action_type == "WAIT" && r.success));
        assert_eq!(fx.reports(), 1);
    }

    #[tokio::test]
    async fn macro_replay_runs_steps_through_the_executor() {
        let fx = Fixture::new(ScriptedOracle::sequence(vec![]));
        let mut engine = fx.engine();
        let recorded = Macro {
            name: "docs".into(),
            created_at: Utc::now(),
            steps: vec![
                MacroStep {
                    action: "CLICK".into(),
                    parameters: json!({ "id": 1 }).as_object().cloned().unwrap(),
                },
                MacroStep {
                    action: "CLICK".into(),
                    parameters: json!({ "id": 99 }).as_object().cloned().unwrap(),
                },
                MacroStep {
                    action: "NAVIGATE".into(),
                    parameters: json!({ "url": "https://example.org" }).as_object().cloned().unwrap(),
                },
            ],
        };

        let results = engine.replay(&recorded).await.unwrap();

        let outcomes: Vec<bool> = results.iter().map(|r| r.success).collect();
        assert_eq!(outcomes, vec![true, false, true]);
        assert_eq!(fx.driver.calls_named("click:m-0"), 1);
        assert_eq!(fx.driver.calls_named("navigate:https://example.org"), 1);
        assert_eq!(engine.history().len(), 3);
        assert_eq!(fx.oracle.calls(), 0);
    }

    #[tokio::test]
    async fn macro_replay_stops_on_interrupt_and_lost_session() {
        let fx = Fixture::new(ScriptedOracle::sequence(vec![]));
        let mut engine = fx.engine();
        let step = MacroStep {
            action: "CLICK".into(),
            parameters: json!({ "id": 1 }).as_object().cloned().unwrap(),
        };
        let recorded = Macro {
            name: "twice".into(),
            created_at: Utc::now(),
            steps: vec![step.clone(), step],
        };

        fx.interrupt.store(true, Ordering::SeqCst);
        assert!(engine.replay(&recorded).await.unwrap().is_empty());

        fx.interrupt.store(false, Ordering::SeqCst);
        fx.driver.lose_session_on("click");
        let err = engine.replay(&recorded).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(engine.history().len(), 1);
    }

    #[tokio::test]
    async fn successful_decisions_are_captured_while_recording() {
        let oracle = ScriptedOracle::sequence(vec![Ok(decision("SCROLL", json!({ "direction": "down" })))])
            .then_repeat(answer("done"));
        let fx = Fixture::new(oracle);
        let mut engine = fx.engine();
        engine.recorder().start("scroll_then_answer").unwrap();

        engine.run_objective("scroll and answer").await.unwrap();
        let artifacts = engine.artifacts().clone();
        let (saved, _) = engine.recorder().stop(&artifacts).unwrap();

        let actions: Vec<&str> = saved.steps.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, vec!["SCROLL", "ANSWER"]);
    }
}
