use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::WebPilotResult;
use crate::executor::action::ActionResult;

/// Append-only destination for action results.
pub trait ResultSink: Send + Sync {
    fn append(&mut self, result: &ActionResult) -> WebPilotResult<()>;
}

/// One JSON object per line in `sessions/session_<id>.jsonl`.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn create(dir: &Path, session_id: &str) -> WebPilotResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(format!("session_{session_id}.jsonl")),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonlSink {
    fn append(&mut self, result: &ActionResult) -> WebPilotResult<()> {
        let line = serde_json::to_string(result)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        tracing::debug!(path = %self.path.display(), "history entry flushed");
        Ok(())
    }
}

/// Ordered results of one REPL/batch session, spanning every objective run in it.
pub struct SessionHistory {
    pub session_id: String,
    entries: Vec<ActionResult>,
    sink: Option<Box<dyn ResultSink>>,
}

impl SessionHistory {
    pub fn new(sink: Option<Box<dyn ResultSink>>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), sink)
    }

    pub fn with_id(session_id: String, sink: Option<Box<dyn ResultSink>>) -> Self {
        Self {
            session_id,
            entries: Vec::new(),
            sink,
        }
    }

    /// History persisted under `<data_dir>/sessions`.
    pub fn persistent(data_dir: &Path) -> WebPilotResult<Self> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let sink = JsonlSink::create(&data_dir.join("sessions"), &session_id)?;
        tracing::info!(session = %session_id, path = %sink.path().display(), "session history opened");
        Ok(Self::with_id(session_id, Some(Box::new(sink))))
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Append and persist. A failing sink is logged; the entry is still kept.
    pub fn record(&mut self, result: ActionResult) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.append(&result) {
                tracing::warn!(error = %e, "failed to persist action result");
            }
        }
        self.entries.push(result);
    }

    pub fn entries(&self) -> &[ActionResult] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries recorded at or after `start`.
    pub fn since(&self, start: usize) -> &[ActionResult] {
        self.entries.get(start..).unwrap_or_default()
    }
}
