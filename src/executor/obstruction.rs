use async_trait::async_trait;
use serde_json::Value;

use crate::driver::{scripts, DocumentDriver};
use crate::errors::WebPilotResult;

/// Something that may be hiding the page's actionable surface.
#[async_trait]
pub trait ObstructionHandler: Send + Sync {
    /// Try once to clear it. `Ok(true)` when something was acted on.
    async fn clear(&self, driver: &dyn DocumentDriver) -> WebPilotResult<bool>;
}

/// Verification-challenge checkbox first, then overlay/cookie-banner dismissal.
#[derive(Debug, Default, Clone, Copy)]
pub struct PageObstructionHandler;

impl PageObstructionHandler {
    /// Tick a visible "verify you are human" style checkbox.
    pub async fn solve_challenge(&self, driver: &dyn DocumentDriver) -> WebPilotResult<bool> {
        let ticked = soft(driver.execute_script(scripts::CHALLENGE_CHECKBOX, vec![]).await)?;
        let ticked = matches!(ticked, Some(Value::Bool(true)));
        if ticked {
            tracing::info!("verification checkbox ticked");
        }
        Ok(ticked)
    }

    pub async fn dismiss_popups(&self, driver: &dyn DocumentDriver) -> WebPilotResult<u64> {
        let clicked = soft(driver.execute_script(scripts::DISMISS_POPUPS, vec![]).await)?
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if clicked > 0 {
            tracing::info!(clicked, "dismissed overlays");
        }
        Ok(clicked)
    }
}

#[async_trait]
impl ObstructionHandler for PageObstructionHandler {
    async fn clear(&self, driver: &dyn DocumentDriver) -> WebPilotResult<bool> {
        if self.solve_challenge(driver).await? {
            return Ok(true);
        }
        Ok(self.dismiss_popups(driver).await? > 0)
    }
}

/// Keep fatal errors, downgrade the rest to "nothing happened".
fn soft(result: WebPilotResult<Value>) -> WebPilotResult<Option<Value>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::debug!(error = %e, "obstruction script failed");
            Ok(None)
        }
    }
}
