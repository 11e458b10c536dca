use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{WebPilotError, WebPilotResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub perception: PerceptionConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

// ── Decision oracle ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "mistral".to_string(),
            ProviderEntry {
                display_name: "Mistral".into(),
                api_base: "https://api.mistral.ai/v1/chat/completions".into(),
                model: "pixtral-large-latest".into(),
                temperature: default_temperature(),
                max_tokens: default_max_tokens(),
                stream: true,
                stream_timeout_secs: default_stream_timeout(),
                request_timeout_secs: default_request_timeout(),
                api_key: None,
            },
        );
        Self {
            active_provider: "mistral".into(),
            providers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    #[serde(default)]
    pub display_name: String,
    /// Full chat-completions endpoint URL.
    pub api_base: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Use SSE streaming; a failed stream falls back to one plain request.
    #[serde(default = "default_true")]
    pub stream: bool,
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Optional API key stored in config.toml (falls back to env var WEBPILOT_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_temperature() -> f64 {
    0.2
}

fn default_max_tokens() -> u32 {
    1500
}

fn default_stream_timeout() -> u64 {
    90
}

fn default_request_timeout() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

// ── Loop budget ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Objectives with at most this many words use the simple tier.
    pub simple_max_words: usize,
    pub medium_max_words: usize,
    pub simple_step_ceiling: u32,
    pub medium_step_ceiling: u32,
    pub complex_step_ceiling: u32,
    /// Fixed wall-clock budget for one objective.
    pub time_budget_ms: u64,
    pub max_consecutive_failures: u32,
    /// Extra attempts of the same decision before it counts as consumed.
    pub max_action_retries: u32,
    /// Immediate rebuilds when a scan yields nothing actionable.
    pub empty_catalog_retries: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            simple_max_words: 5,
            medium_max_words: 15,
            simple_step_ceiling: 100,
            medium_step_ceiling: 200,
            complex_step_ceiling: 500,
            time_budget_ms: 480_000,
            max_consecutive_failures: 5,
            max_action_retries: 2,
            empty_catalog_retries: 1,
        }
    }
}

// ── Pacing ──────────────────────────────────────────────────────────────────

/// Inclusive millisecond range sampled uniformly for jittered delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub empty_catalog_backoff_ms: u64,
    /// Wait after an obstruction was cleared.
    pub obstruction_settle_ms: u64,
    /// Wait when nothing actionable appeared and nothing could be cleared.
    pub unready_wait_ms: u64,
    pub retry_delay: DelayRange,
    pub cycle_delay: DelayRange,
    pub keystroke_delay: DelayRange,
    pub scroll_settle_ms: u64,
    /// Upper bound for a single WAIT action.
    pub max_wait_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            empty_catalog_backoff_ms: 1000,
            obstruction_settle_ms: 2000,
            unready_wait_ms: 3000,
            retry_delay: DelayRange::new(1000, 2000),
            cycle_delay: DelayRange::new(1500, 2500),
            keystroke_delay: DelayRange::new(50, 150),
            scroll_settle_ms: 300,
            max_wait_ms: 30_000,
        }
    }
}

impl PacingConfig {
    /// No delays at all.
    pub fn immediate() -> Self {
        Self {
            empty_catalog_backoff_ms: 0,
            obstruction_settle_ms: 0,
            unready_wait_ms: 0,
            retry_delay: DelayRange::zero(),
            cycle_delay: DelayRange::zero(),
            keystroke_delay: DelayRange::zero(),
            scroll_settle_ms: 0,
            max_wait_ms: 0,
        }
    }
}

// ── Perception ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    pub max_candidates: usize,
    pub observation_limit: usize,
    pub confidence_floor: f64,
    /// Elements further than this many CSS pixels outside the viewport are dropped.
    pub viewport_margin: f64,
    pub ready_timeout_ms: u64,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            max_candidates: 50,
            observation_limit: 30,
            confidence_floor: 0.3,
            viewport_margin: 100.0,
            ready_timeout_ms: 5000,
        }
    }
}

// ── Driver ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub webdriver_url: String,
    pub browser: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub command_timeout_secs: u64,
    pub navigation_timeout_secs: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".into(),
            browser: "chrome".into(),
            headless: false,
            window_width: 1920,
            window_height: 1080,
            command_timeout_secs: 30,
            navigation_timeout_secs: 15,
        }
    }
}

// ── Storage ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for sessions/, screenshots/, reports/ and macros/.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Configured directory, else `<local data dir>/webpilot`, else the working directory.
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        match dirs::data_local_dir() {
            Some(base) => base.join("webpilot"),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

// ── Loading ─────────────────────────────────────────────────────────────────

fn resolve_config_path() -> WebPilotResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(WebPilotError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config_from(path: &Path) -> WebPilotResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), provider = %config.oracle.active_provider, "config loaded");
    Ok(config)
}

/// Load an explicit path, or the discovered `config.toml`, or the built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> WebPilotResult<AppConfig> {
    if let Some(path) = explicit {
        return load_config_from(path);
    }
    match resolve_config_path() {
        Ok(path) => load_config_from(&path),
        Err(e) => {
            tracing::warn!(error = %e, "using built-in default configuration");
            Ok(AppConfig::default())
        }
    }
}

pub fn save_config(config: &AppConfig, path: &Path) -> WebPilotResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
