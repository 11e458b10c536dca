use serde::{Deserialize, Serialize};

use crate::oracle::types::Decision;

/// Phases of one objective run.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    Perceiving,
    Observing,
    Deciding,
    Acting { decision: Decision },
    Evaluating { success: bool },
    Terminated { termination: Termination },
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// The oracle issued ANSWER.
    Success { answer: String },
    Exhausted { cause: ExhaustionCause },
    Interrupted,
    /// The driver session is gone, or the run could not reach a start page.
    Fatal { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionCause {
    Steps,
    Deadline,
    ConsecutiveFailures,
}

impl Termination {
    pub fn exhausted(cause: ExhaustionCause) -> Self {
        Self::Exhausted { cause }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Exhausted { .. } => "exhausted",
            Self::Interrupted => "interrupted",
            Self::Fatal { .. } => "fatal",
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success { answer } => write!(f, "success: {answer}"),
            Self::Exhausted { cause } => write!(f, "exhausted ({cause:?})"),
            Self::Interrupted => f.write_str("interrupted"),
            Self::Fatal { reason } => write!(f, "fatal: {reason}"),
        }
    }
}
