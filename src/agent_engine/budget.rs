use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::BudgetConfig;

/// Step ceiling tier, chosen by objective length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepTier {
    Simple,
    Medium,
    Complex,
}

impl StepTier {
    pub fn for_objective(objective: &str, config: &BudgetConfig) -> Self {
        let words = objective.split_whitespace().count();
        if words <= config.simple_max_words {
            Self::Simple
        } else if words <= config.medium_max_words {
            Self::Medium
        } else {
            Self::Complex
        }
    }

    pub fn ceiling(self, config: &BudgetConfig) -> u32 {
        match self {
            Self::Simple => config.simple_step_ceiling,
            Self::Medium => config.medium_step_ceiling,
            Self::Complex => config.complex_step_ceiling,
        }
    }
}

/// Run-state of one objective. Created at session start and mutated only by
/// the `LoopController`; each session owns its own.
#[derive(Debug, Clone)]
pub struct LoopBudget {
    pub tier: StepTier,
    pub steps: u32,
    pub step_ceiling: u32,
    pub started: Instant,
    pub deadline: Instant,
    pub consecutive_failures: u32,
    pub failure_ceiling: u32,
    /// Attempts of the current decision beyond the first.
    pub retries: u32,
    pub retry_ceiling: u32,
}

impl LoopBudget {
    pub fn for_objective(objective: &str, config: &BudgetConfig) -> Self {
        let tier = StepTier::for_objective(objective, config);
        let started = Instant::now();
        Self {
            tier,
            steps: 0,
            step_ceiling: tier.ceiling(config),
            started,
            deadline: started + Duration::from_millis(config.time_budget_ms),
            consecutive_failures: 0,
            failure_ceiling: config.max_consecutive_failures,
            retries: 0,
            retry_ceiling: config.max_action_retries,
        }
    }

    pub fn steps_exhausted(&self) -> bool {
        self.steps >= self.step_ceiling
    }

    pub fn deadline_passed(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn failures_exhausted(&self) -> bool {
        self.consecutive_failures >= self.failure_ceiling
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_ceiling_follows_objective_length() {
        let config = BudgetConfig::default();
        let cases = [
            (3, StepTier::Simple, 100),
            (5, StepTier::Simple, 100),
            (6, StepTier::Medium, 200),
            (10, StepTier::Medium, 200),
            (15, StepTier::Medium, 200),
            (16, StepTier::Complex, 500),
            (20, StepTier::Complex, 500),
        ];
        for (words, tier, ceiling) in cases {
            let objective = vec!["word"; words].join(" ");
            let budget = LoopBudget::for_objective(&objective, &config);
            assert_eq!(budget.tier, tier, "{words} words");
            assert_eq!(budget.step_ceiling, ceiling, "{words} words");
        }
    }

    #[test]
    fn deadline_uses_the_fixed_time_budget() {
        let config = BudgetConfig {
            time_budget_ms: 1_000,
            ..BudgetConfig::default()
        };
        let short = LoopBudget::for_objective("open github", &config);
        let long = LoopBudget::for_objective(&vec!["step"; 40].join(" "), &config);
        assert_eq!(short.deadline - short.started, Duration::from_millis(1_000));
        assert_eq!(long.deadline - long.started, Duration::from_millis(1_000));
        assert!(!short.deadline_passed());
    }

    #[test]
    fn zero_budget_is_immediately_exhausted() {
        let config = BudgetConfig {
            time_budget_ms: 0,
            max_consecutive_failures: 0,
            ..BudgetConfig::default()
        };
        let budget = LoopBudget::for_objective("x", &config);
        assert!(budget.deadline_passed());
        assert!(budget.failures_exhausted());
        assert_eq!(budget.remaining(), Duration::ZERO);
    }
}
