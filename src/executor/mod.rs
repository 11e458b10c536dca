pub mod action;
pub mod element;
pub mod frame;
pub mod obstruction;
pub mod page;
pub mod pointer;
pub mod resolver;
pub mod targeting;
pub mod text_input;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::agent_engine::artifacts::ArtifactStore;
use crate::agent_engine::history::SessionHistory;
use crate::config::PacingConfig;
use crate::driver::DocumentDriver;
use crate::errors::{WebPilotError, WebPilotResult};
use crate::executor::action::{ActionKind, ActionParams, ActionResult, Resolution};
use crate::executor::targeting::Target;
use crate::oracle::types::Decision;
use crate::perception::catalog::CandidateCatalogBuilder;
use crate::perception::observation::Observation;
use crate::perception::types::Catalog;

/// Everything a strategy may touch while applying one action.
pub struct ExecutionContext<'a> {
    pub driver: &'a dyn DocumentDriver,
    pub builder: &'a CandidateCatalogBuilder,
    /// Replaced when a stale target forces a rebuild.
    pub catalog: &'a mut Catalog,
    pub observation: &'a Observation,
    pub artifacts: &'a ArtifactStore,
    pub pacing: &'a PacingConfig,
    pub navigation_timeout: Duration,
    /// Wall-clock limit of the running objective, if any.
    pub deadline: Option<Instant>,
}

impl ExecutionContext<'_> {
    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.pacing.scroll_settle_ms)
    }
}

/// What a strategy reports back on success.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub message: String,
    pub target_id: Option<u32>,
    pub artifact: Option<PathBuf>,
    pub resolution: Option<Resolution>,
}

impl Outcome {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn on_target(target: &Target, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if target.resolution == Resolution::Recovered {
            message.push_str(" (recovered after stale reference)");
        }
        Self {
            message,
            target_id: Some(target.id),
            artifact: None,
            resolution: Some(target.resolution),
        }
    }
}

/// One entry of the action table. Validation and fallbacks live here, not in
/// the executor.
#[async_trait]
pub trait ActionStrategy: Send + Sync {
    async fn execute(&self, params: &ActionParams, ctx: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome>;
}

pub struct StrategyTable {
    strategies: HashMap<ActionKind, Arc<dyn ActionStrategy>>,
}

impl StrategyTable {
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// The full vocabulary.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.register(ActionKind::Navigate, Arc::new(page::Navigate));
        table.register(ActionKind::Click, Arc::new(pointer::PointerStrategy::click()));
        table.register(ActionKind::DoubleClick, Arc::new(pointer::PointerStrategy::double_click()));
        table.register(ActionKind::RightClick, Arc::new(pointer::PointerStrategy::right_click()));
        table.register(ActionKind::Hover, Arc::new(pointer::PointerStrategy::hover()));
        table.register(ActionKind::Type, Arc::new(text_input::TypeText));
        table.register(ActionKind::Clear, Arc::new(element::ClearField));
        table.register(ActionKind::Select, Arc::new(element::SelectOption));
        table.register(ActionKind::GetText, Arc::new(element::ReadText));
        table.register(ActionKind::Scroll, Arc::new(page::Scroll));
        table.register(ActionKind::Wait, Arc::new(page::Wait));
        table.register(ActionKind::PressKey, Arc::new(page::PressKey));
        table.register(ActionKind::TakeScreenshot, Arc::new(page::TakeScreenshot));
        table.register(ActionKind::ExecuteJs, Arc::new(page::ExecuteJs));
        table.register(ActionKind::Refresh, Arc::new(page::Refresh));
        table.register(ActionKind::GoBack, Arc::new(page::GoBack));
        table.register(ActionKind::GoForward, Arc::new(page::GoForward));
        table.register(ActionKind::Answer, Arc::new(page::Answer));
        table
    }

    pub fn register(&mut self, kind: ActionKind, strategy: Arc<dyn ActionStrategy>) {
        self.strategies.insert(kind, strategy);
    }

    pub fn get(&self, kind: ActionKind) -> Option<&Arc<dyn ActionStrategy>> {
        self.strategies.get(&kind)
    }
}

/// Validates a decision, dispatches it through the strategy table and records
/// the result.
pub struct ActionExecutor {
    table: StrategyTable,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new(StrategyTable::standard())
    }
}

impl ActionExecutor {
    pub fn new(table: StrategyTable) -> Self {
        Self { table }
    }

    /// Apply one decision. Every attempt is recorded in `history`; only a lost
    /// session comes back as `Err` (after recording).
    pub async fn execute(
        &self,
        decision: &Decision,
        ctx: &mut ExecutionContext<'_>,
        history: &mut SessionHistory,
        retry_count: u32,
    ) -> WebPilotResult<ActionResult> {
        let started = Instant::now();
        let proposed = decision.proposed();
        let name = proposed
            .map(|a| a.name.trim().to_ascii_uppercase())
            .unwrap_or_default();
        let params = ActionParams::new(proposed.map(|a| a.parameters.clone()).unwrap_or_default());

        let outcome = match ActionKind::from_name(&name) {
            None => Err(WebPilotError::Execution(format!(
                "Unknown action '{name}'; no driver interaction attempted"
            ))),
            Some(kind) => match self.table.get(kind) {
                Some(strategy) => {
                    tracing::info!(action = %kind, params = %serde_json::Value::Object(params.as_map().clone()), retry = retry_count, "executing action");
                    strategy.execute(&params, ctx).await
                }
                None => Err(WebPilotError::Execution(format!("No strategy registered for {kind}"))),
            },
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let action_type = if name.is_empty() { "NONE".to_string() } else { name };
        let (result, fatal) = match outcome {
            Ok(out) => {
                tracing::info!(action = %action_type, duration_ms, message = %out.message, "action succeeded");
                (
                    ActionResult {
                        success: true,
                        action_type,
                        message: out.message,
                        duration_ms,
                        artifact: out.artifact,
                        target_id: out.target_id,
                        error: None,
                        timestamp: chrono::Utc::now(),
                        retry_count,
                        resolution: out.resolution,
                    },
                    None,
                )
            }
            Err(e) => {
                tracing::warn!(action = %action_type, duration_ms, error = %e, "action failed");
                let result = ActionResult {
                    success: false,
                    action_type,
                    message: format!("Action failed: {e}"),
                    duration_ms,
                    artifact: None,
                    target_id: params.target_id(),
                    error: Some(e.to_string()),
                    timestamp: chrono::Utc::now(),
                    retry_count,
                    resolution: None,
                };
                (result, e.is_fatal().then_some(e))
            }
        };

        history.record(result.clone());
        match fatal {
            Some(e) => Err(e),
            None => Ok(result),
        }
    }
}
