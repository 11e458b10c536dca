use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebPilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Decision oracle error: {0}")]
    Oracle(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    /// Document not ready or scan failed; retried locally, never fatal.
    #[error("Perception error: {0}")]
    Perception(String),

    /// A node handle no longer points at a live element.
    #[error("Stale element reference: {0}")]
    StaleTarget(String),

    #[error("Action failed: {0}")]
    Execution(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Driver call timed out: {0}")]
    DriverTimeout(String),

    /// The automation session itself is gone. Aborts the loop.
    #[error("Automation session lost: {0}")]
    SessionLost(String),

    #[error("Objective error: {0}")]
    Objective(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Task cancelled")]
    Cancelled,
}

impl WebPilotError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionLost(_))
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleTarget(_))
    }
}

pub type WebPilotResult<T> = Result<T, WebPilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_session_loss_is_fatal() {
        assert!(WebPilotError::SessionLost("gone".into()).is_fatal());
        assert!(!WebPilotError::DriverTimeout("slow".into()).is_fatal());
        assert!(!WebPilotError::StaleTarget("detached".into()).is_fatal());
        assert!(WebPilotError::StaleTarget("detached".into()).is_stale());
    }
}
