use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The fixed action vocabulary the oracle may choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Navigate,
    Click,
    DoubleClick,
    RightClick,
    Type,
    Hover,
    Clear,
    Select,
    GetText,
    Scroll,
    Wait,
    PressKey,
    TakeScreenshot,
    ExecuteJs,
    Refresh,
    GoBack,
    GoForward,
    Answer,
}

impl ActionKind {
    pub const ALL: [ActionKind; 18] = [
        ActionKind::Navigate,
        ActionKind::Click,
        ActionKind::DoubleClick,
        ActionKind::RightClick,
        ActionKind::Type,
        ActionKind::Hover,
        ActionKind::Clear,
        ActionKind::Select,
        ActionKind::GetText,
        ActionKind::Scroll,
        ActionKind::Wait,
        ActionKind::PressKey,
        ActionKind::TakeScreenshot,
        ActionKind::ExecuteJs,
        ActionKind::Refresh,
        ActionKind::GoBack,
        ActionKind::GoForward,
        ActionKind::Answer,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Navigate => "NAVIGATE",
            ActionKind::Click => "CLICK",
            ActionKind::DoubleClick => "DOUBLE_CLICK",
            ActionKind::RightClick => "RIGHT_CLICK",
            ActionKind::Type => "TYPE",
            ActionKind::Hover => "HOVER",
            ActionKind::Clear => "CLEAR",
            ActionKind::Select => "SELECT",
            ActionKind::GetText => "GET_TEXT",
            ActionKind::Scroll => "SCROLL",
            ActionKind::Wait => "WAIT",
            ActionKind::PressKey => "PRESS_KEY",
            ActionKind::TakeScreenshot => "TAKE_SCREENSHOT",
            ActionKind::ExecuteJs => "EXECUTE_JS",
            ActionKind::Refresh => "REFRESH",
            ActionKind::GoBack => "GO_BACK",
            ActionKind::GoForward => "GO_FORWARD",
            ActionKind::Answer => "ANSWER",
        }
    }

    /// Case-insensitive lookup; `None` for anything outside the vocabulary.
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|kind| kind.name() == wanted)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed accessors over the untrusted parameter map of a decision.
#[derive(Debug, Clone, Default)]
pub struct ActionParams {
    values: Map<String, Value>,
}

impl ActionParams {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// `id` (or `element_id`) as a number or numeric string.
    pub fn target_id(&self) -> Option<u32> {
        ["id", "element_id"]
            .iter()
            .filter_map(|key| self.values.get(*key))
            .find_map(|v| match v {
                Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Non-empty string, or any scalar rendered as text.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        match self.values.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// How the target of an element action was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Direct,
    /// Handle was stale; the element was re-found by tag and label.
    Recovered,
}

/// Immutable record of one execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub action_type: String,
    pub message: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

impl ActionResult {
    /// A successful ANSWER ends the objective.
    pub fn is_answer(&self) -> bool {
        self.success && self.action_type == ActionKind::Answer.name()
    }
}
