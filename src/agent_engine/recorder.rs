use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent_engine::artifacts::ArtifactStore;
use crate::errors::{WebPilotError, WebPilotResult};
use crate::oracle::types::Decision;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroStep {
    pub action: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Macro {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub steps: Vec<MacroStep>,
}

/// Captures successfully executed decisions between `record` and `stop`.
#[derive(Debug, Default)]
pub struct MacroRecorder {
    active: Option<Macro>,
}

impl MacroRecorder {
    pub fn start(&mut self, name: &str) -> WebPilotResult<()> {
        let name = checked_name(name)?;
        if let Some(current) = &self.active {
            tracing::warn!(replaced = %current.name, "discarding unfinished macro");
        }
        tracing::info!(name, "macro recording started");
        self.active = Some(Macro {
            name: name.to_string(),
            created_at: Utc::now(),
            steps: Vec::new(),
        });
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn capture(&mut self, decision: &Decision) {
        let (Some(recording), Some(action)) = (self.active.as_mut(), decision.proposed()) else {
            return;
        };
        recording.steps.push(MacroStep {
            action: action.name.trim().to_ascii_uppercase(),
            parameters: action.parameters.clone(),
        });
    }

    /// Ends the recording and saves it as `macros/<name>.json`.
    pub fn stop(&mut self, artifacts: &ArtifactStore) -> WebPilotResult<(Macro, PathBuf)> {
        let recording = self
            .active
            .take()
            .ok_or_else(|| WebPilotError::Persistence("no macro is being recorded".into()))?;
        let path = artifacts.write_json("macros", &recording.name, &recording)?;
        tracing::info!(name = %recording.name, steps = recording.steps.len(), path = %path.display(), "macro saved");
        Ok((recording, path))
    }

    /// Reads `macros/<name>.json` back from the artifact store.
    pub fn load(artifacts: &ArtifactStore, name: &str) -> WebPilotResult<Macro> {
        let name = checked_name(name)?;
        let path = artifacts.root().join("macros").join(format!("{name}.json"));
        if !path.exists() {
            return Err(WebPilotError::Persistence(format!("macro '{name}' not found")));
        }
        let recorded: Macro = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        tracing::info!(name, steps = recorded.steps.len(), "macro loaded");
        Ok(recorded)
    }
}

fn checked_name(name: &str) -> WebPilotResult<&str> {
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(WebPilotError::Persistence(format!("invalid macro name '{name}'")));
    }
    Ok(name)
}
