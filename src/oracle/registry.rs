use std::collections::HashMap;
use std::sync::Arc;

use crate::config::OracleConfig;
use crate::errors::{WebPilotError, WebPilotResult};
use crate::oracle::openai_compatible::OpenAiCompatibleOracle;
use crate::oracle::provider::DecisionOracle;

/// Configured oracles keyed by their config.toml identifier.
pub struct OracleRegistry {
    providers: HashMap<String, Arc<dyn DecisionOracle>>,
    active: String,
}

impl OracleRegistry {
    pub fn new(active: String) -> Self {
        Self {
            providers: HashMap::new(),
            active,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn DecisionOracle>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn active(&self) -> WebPilotResult<Arc<dyn DecisionOracle>> {
        self.providers.get(&self.active).cloned().ok_or_else(|| {
            WebPilotError::Config(format!(
                "decision oracle '{}' has no credential; set WEBPILOT_{}_API_KEY",
                self.active,
                self.active.to_uppercase()
            ))
        })
    }

    pub fn active_name(&self) -> &str {
        &self.active
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build from config. Keys come from `WEBPILOT_<ID>_API_KEY`, else the
    /// config entry; providers without any key are left out.
    pub fn from_config(config: &OracleConfig) -> Self {
        let mut registry = Self::new(config.active_provider.clone());
        for (id, entry) in &config.providers {
            let api_key = std::env::var(format!("WEBPILOT_{}_API_KEY", id.to_uppercase()))
                .ok()
                .or_else(|| entry.api_key.clone())
                .unwrap_or_default();
            if api_key.trim().is_empty() {
                tracing::debug!(provider = %id, "no API key; provider skipped");
                continue;
            }
            registry.register(Arc::new(OpenAiCompatibleOracle::new(id.clone(), entry, api_key)));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_with_config_key_is_active() {
        let mut config = OracleConfig::default();
        config.active_provider = "local".into();
        let mut entry = config.providers["mistral"].clone();
        entry.api_key = Some("from-config".into());
        config.providers.insert("local".into(), entry);

        let registry = OracleRegistry::from_config(&config);
        assert_eq!(registry.active().unwrap().name(), "local");
        assert!(registry.list_names().contains(&"local".to_string()));
    }

    #[test]
    fn missing_credential_is_a_config_error() {
        let mut config = OracleConfig::default();
        config.active_provider = "nokey_provider".into();
        let mut entry = config.providers["mistral"].clone();
        entry.api_key = None;
        config.providers.insert("nokey_provider".into(), entry);

        let registry = OracleRegistry::from_config(&config);
        assert!(matches!(registry.active(), Err(WebPilotError::Config(_))));
    }
}
