use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent_engine::artifacts::{stamp, ArtifactStore};
use crate::agent_engine::state::Termination;
use crate::errors::WebPilotResult;
use crate::executor::action::ActionResult;

const RECENT_ACTIONS: usize = 20;

/// Summary written at the end of every run and on the `report` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub objective: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub total_actions: usize,
    pub successful_actions: usize,
    pub failed_actions: usize,
    /// Percentage, one decimal.
    pub success_rate: f64,
    /// Length of the run of failures at the end of the history.
    pub trailing_failures: usize,
    pub trailing_successes: usize,
    pub termination: Option<Termination>,
    pub steps_used: Option<u32>,
    pub step_ceiling: Option<u32>,
    pub final_snapshot: Option<PathBuf>,
    pub recent_actions: Vec<ActionResult>,
}

impl SessionReport {
    pub fn summarize(session_id: &str, started_at: DateTime<Utc>, results: &[ActionResult]) -> Self {
        let finished_at = Utc::now();
        let successful_actions = results.iter().filter(|r| r.success).count();
        let total_actions = results.len();
        let success_rate = if total_actions == 0 {
            0.0
        } else {
            (successful_actions as f64 / total_actions as f64 * 1000.0).round() / 10.0
        };
        let trailing_failures = results.iter().rev().take_while(|r| !r.success).count();
        let trailing_successes = results.iter().rev().take_while(|r| r.success).count();

        Self {
            session_id: session_id.to_string(),
            objective: None,
            started_at,
            finished_at,
            duration_secs: (finished_at - started_at).num_milliseconds() as f64 / 1000.0,
            total_actions,
            successful_actions,
            failed_actions: total_actions - successful_actions,
            success_rate,
            trailing_failures,
            trailing_successes,
            termination: None,
            steps_used: None,
            step_ceiling: None,
            final_snapshot: None,
            recent_actions: results[total_actions.saturating_sub(RECENT_ACTIONS)..].to_vec(),
        }
    }

    /// Attach the outcome of one objective run.
    pub fn with_run(
        mut self,
        objective: &str,
        termination: &Termination,
        steps_used: u32,
        step_ceiling: u32,
        final_snapshot: Option<PathBuf>,
    ) -> Self {
        self.objective = Some(objective.to_string());
        self.termination = Some(termination.clone());
        self.steps_used = Some(steps_used);
        self.step_ceiling = Some(step_ceiling);
        self.final_snapshot = final_snapshot;
        self
    }

    /// Writes `reports/report_<session>_<timestamp>.json`.
    pub fn write(&self, artifacts: &ArtifactStore) -> WebPilotResult<PathBuf> {
        let name = format!("report_{}_{}", self.session_id, stamp());
        let path = artifacts.write_json("reports", &name, self)?;
        tracing::info!(path = %path.display(), "session report written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::ExhaustionCause;
    use crate::testing::result;

    #[test]
    fn counts_trailing_runs_and_keeps_recent_actions() {
        let mut results: Vec<ActionResult> = (0..25).map(|_| result("CLICK", true)).collect();
        results.extend((0..5).map(|_| result("CLICK", false)));

        let report = SessionReport::summarize("s1", Utc::now(), &results);
        assert_eq!(report.total_actions, 30);
        assert_eq!(report.successful_actions, 25);
        assert_eq!(report.trailing_failures, 5);
        assert_eq!(report.trailing_successes, 0);
        assert_eq!(report.recent_actions.len(), 20);
        assert!(!report.recent_actions.last().unwrap().success);
        assert_eq!(report.success_rate, 83.3);
    }

    #[test]
    fn empty_history_has_zero_rate() {
        let report = SessionReport::summarize("s1", Utc::now(), &[]);
        assert_eq!(report.success_rate, 0.0);
        assert_eq!(report.trailing_failures, 0);
    }

    #[test]
    fn written_report_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let report = SessionReport::summarize("abc", Utc::now(), &[result("ANSWER", true)]).with_run(
            "say hi",
            &Termination::exhausted(ExhaustionCause::Deadline),
            4,
            100,
            None,
        );
        let path = report.write(&store).unwrap();
        assert!(path.starts_with(dir.path().join("reports")));
        let back: SessionReport = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back.steps_used, Some(4));
        assert_eq!(back.termination, Some(Termination::exhausted(ExhaustionCause::Deadline)));
    }
}
