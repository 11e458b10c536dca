//! Single-step actions that act on the page rather than on an element.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use crate::driver::{scripts, DocumentDriver};
use crate::errors::{WebPilotError, WebPilotResult};
use crate::executor::action::ActionParams;
use crate::executor::{ActionStrategy, ExecutionContext, Outcome};

const READY_POLL: Duration = Duration::from_millis(250);
const DEFAULT_SCROLL_PIXELS: f64 = 500.0;
const DEFAULT_WAIT_SECS: f64 = 2.0;

/// Poll `document.readyState` until it reports `complete`.
pub async fn wait_until_ready(driver: &dyn DocumentDriver, timeout: Duration) -> WebPilotResult<()> {
    let started = Instant::now();
    loop {
        match driver.ready_state().await {
            Ok(state) if state == "complete" => return Ok(()),
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => tracing::debug!(error = %e, "ready state unavailable"),
        }
        if started.elapsed() >= timeout {
            return Err(WebPilotError::DriverTimeout(format!(
                "page not ready after {}s",
                timeout.as_secs()
            )));
        }
        tokio::time::sleep(READY_POLL).await;
    }
}

/// Prefix `https://` onto bare hosts.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("://") || trimmed.starts_with("about:") || trimmed.starts_with("data:") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

pub struct Navigate;

#[async_trait]
impl ActionStrategy for Navigate {
    async fn execute(&self, params: &ActionParams, ctx: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome> {
        let raw = params
            .str("url")
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| WebPilotError::Execution("NAVIGATE requires a 'url'".into()))?;
        let url = normalize_url(raw);
        ctx.driver.navigate(&url).await?;
        wait_until_ready(ctx.driver, ctx.navigation_timeout).await?;
        Ok(Outcome::message(format!("Navigated to {url}")))
    }
}

pub struct Refresh;

#[async_trait]
impl ActionStrategy for Refresh {
    async fn execute(&self, _: &ActionParams, ctx: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome> {
        ctx.driver.refresh().await?;
        wait_until_ready(ctx.driver, ctx.navigation_timeout).await?;
        Ok(Outcome::message("Page refreshed"))
    }
}

pub struct GoBack;

#[async_trait]
impl ActionStrategy for GoBack {
    async fn execute(&self, _: &ActionParams, ctx: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome> {
        ctx.driver.back().await?;
        Ok(Outcome::message("Navigated back"))
    }
}

pub struct GoForward;

#[async_trait]
impl ActionStrategy for GoForward {
    async fn execute(&self, _: &ActionParams, ctx: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome> {
        ctx.driver.forward().await?;
        Ok(Outcome::message("Navigated forward"))
    }
}

pub struct Scroll;

#[async_trait]
impl ActionStrategy for Scroll {
    async fn execute(&self, params: &ActionParams, ctx: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome> {
        let direction = params.str("direction").unwrap_or("down").trim().to_ascii_lowercase();
        let pixels = params.f64_or("pixels", DEFAULT_SCROLL_PIXELS).abs();
        let (dx, dy) = match direction.as_str() {
            "down" => (0.0, pixels),
            "up" => (0.0, -pixels),
            "right" => (pixels, 0.0),
            "left" => (-pixels, 0.0),
            other => {
                return Err(WebPilotError::Execution(format!("unknown scroll direction '{other}'")))
            }
        };
        ctx.driver
            .execute_script(scripts::SCROLL_BY, vec![json!(dx), json!(dy)])
            .await?;
        let settle = ctx.scroll_settle();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        Ok(Outcome::message(format!("Scrolled {direction} {pixels}px")))
    }
}

pub struct Wait;

#[async_trait]
impl ActionStrategy for Wait {
    async fn execute(&self, params: &ActionParams, ctx: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome> {
        let seconds = params.f64_or("seconds", DEFAULT_WAIT_SECS);
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { DEFAULT_WAIT_SECS };
        let cap = Duration::from_millis(ctx.pacing.max_wait_ms);
        let mut wait = Duration::from_secs_f64(seconds.min(cap.as_secs_f64()));
        if let Some(deadline) = ctx.deadline {
            wait = wait.min(deadline.saturating_duration_since(Instant::now()));
        }
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        Ok(Outcome::message(format!("Waited {:.1}s", wait.as_secs_f64())))
    }
}

pub struct PressKey;

#[async_trait]
impl ActionStrategy for PressKey {
    async fn execute(&self, params: &ActionParams, ctx: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome> {
        let key = params.str("key").filter(|k| !k.trim().is_empty()).unwrap_or("Enter");
        ctx.driver.press_key(key).await?;
        Ok(Outcome::message(format!("Pressed {key}")))
    }
}

pub struct ExecuteJs;

#[async_trait]
impl ActionStrategy for ExecuteJs {
    async fn execute(&self, params: &ActionParams, ctx: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome> {
        let script = params
            .str("script")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| WebPilotError::Execution("EXECUTE_JS requires a 'script'".into()))?;
        let value = ctx.driver.execute_script(script, vec![]).await?;
        let rendered: String = value.to_string().chars().take(200).collect();
        Ok(Outcome::message(format!("Script result: {rendered}")))
    }
}

pub struct TakeScreenshot;

#[async_trait]
impl ActionStrategy for TakeScreenshot {
    async fn execute(&self, _: &ActionParams, ctx: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome> {
        let png = ctx.driver.screenshot().await?;
        let path = ctx.artifacts.save_screenshot("action", &png)?;
        Ok(Outcome {
            message: format!("Screenshot saved to {}", path.display()),
            artifact: Some(path),
            ..Outcome::default()
        })
    }
}

/// Terminal action: the oracle considers the objective complete.
pub struct Answer;

#[async_trait]
impl ActionStrategy for Answer {
    async fn execute(&self, params: &ActionParams, _: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome> {
        let text = params.text("text").unwrap_or_else(|| "Objective complete".into());
        Ok(Outcome::message(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_hosts_get_https() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url(" http://x.org/a "), "http://x.org/a");
        assert_eq!(normalize_url("about:blank"), "about:blank");
    }
}
