use async_trait::async_trait;

use crate::errors::WebPilotResult;
use crate::oracle::types::{Decision, DecisionRequest};

/// External service mapping an observation to the next action.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Identifier matching the config.toml provider key.
    fn name(&self) -> &str;

    /// One complete, parsed decision. Transport details (streaming, retries)
    /// stay inside the implementation.
    async fn decide(&self, request: &DecisionRequest) -> WebPilotResult<Decision>;
}
