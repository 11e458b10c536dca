use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::budget::LoopBudget;
use crate::agent_engine::state::{ExhaustionCause, Termination};
use crate::config::PacingConfig;

/// What the loop does after a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Continue { pause: Duration },
    Stop(Termination),
}

/// What happens to a decision whose action failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    /// Counted as one consecutive failure; move to a fresh cycle.
    Consumed,
}

/// Sole owner of the `LoopBudget`: counts steps, failures and retries and
/// decides continue, retry or stop.
pub struct LoopController {
    budget: LoopBudget,
    pacing: PacingConfig,
    interrupt: Arc<AtomicBool>,
}

impl LoopController {
    pub fn new(budget: LoopBudget, pacing: PacingConfig, interrupt: Arc<AtomicBool>) -> Self {
        Self {
            budget,
            pacing,
            interrupt,
        }
    }

    pub fn budget(&self) -> &LoopBudget {
        &self.budget
    }

    pub fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Entry check of `Perceiving`. Counts the step when the cycle may run.
    pub fn begin_cycle(&mut self) -> Option<Termination> {
        if let Some(termination) = self.check() {
            return Some(termination);
        }
        self.budget.steps += 1;
        tracing::debug!(
            step = self.budget.steps,
            ceiling = self.budget.step_ceiling,
            remaining_ms = self.budget.remaining().as_millis() as u64,
            "cycle started"
        );
        None
    }

    /// A cycle that produced no usable observation or decision.
    pub fn record_cycle_failure(&mut self) {
        self.budget.consecutive_failures += 1;
        self.budget.retries = 0;
        tracing::warn!(
            consecutive_failures = self.budget.consecutive_failures,
            ceiling = self.budget.failure_ceiling,
            "cycle failed"
        );
    }

    pub fn record_action_failure(&mut self) -> RetryDecision {
        let can_retry = self.budget.retries < self.budget.retry_ceiling
            && !self.interrupted()
            && !self.budget.deadline_passed();
        if can_retry {
            self.budget.retries += 1;
            tracing::info!(retry = self.budget.retries, ceiling = self.budget.retry_ceiling, "retrying decision");
            return RetryDecision::Retry {
                delay: self.bounded(self.pacing.retry_delay.sample()),
            };
        }
        self.record_cycle_failure();
        RetryDecision::Consumed
    }

    pub fn record_success(&mut self) {
        self.budget.consecutive_failures = 0;
        self.budget.retries = 0;
    }

    pub fn retries(&self) -> u32 {
        self.budget.retries
    }

    /// `Evaluating`: stop on any exhausted budget, else pause (only after a success).
    pub fn evaluate(&self, after_success: bool) -> Verdict {
        match self.check() {
            Some(termination) => Verdict::Stop(termination),
            None => Verdict::Continue {
                pause: if after_success {
                    self.bounded(self.pacing.cycle_delay.sample())
                } else {
                    Duration::ZERO
                },
            },
        }
    }

    /// Clamp a wait to what is left of the wall-clock budget.
    pub fn bounded(&self, wait: Duration) -> Duration {
        wait.min(self.budget.remaining())
    }

    fn check(&self) -> Option<Termination> {
        if self.interrupted() {
            Some(Termination::Interrupted)
        } else if self.budget.failures_exhausted() {
            Some(Termination::exhausted(ExhaustionCause::ConsecutiveFailures))
        } else if self.budget.steps_exhausted() {
            Some(Termination::exhausted(ExhaustionCause::Steps))
        } else if self.budget.deadline_passed() {
            Some(Termination::exhausted(ExhaustionCause::Deadline))
        } else {
            None
        }
    }
}
