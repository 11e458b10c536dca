use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use crate::config::PacingConfig;
use crate::driver::{scripts, DocumentDriver, NodeHandle};
use crate::errors::{WebPilotError, WebPilotResult};
use crate::executor::action::ActionParams;
use crate::executor::{frame, targeting, ActionStrategy, ExecutionContext, Outcome};
use crate::perception::observation::Observation;
use crate::perception::types::CandidateElement;

const INTERACTABLE_WAIT: Duration = Duration::from_secs(5);
const INTERACTABLE_POLL: Duration = Duration::from_millis(250);

/// Ctrl+A, release modifiers, Delete.
const SELECT_ALL_DELETE: &str = "\u{E009}a\u{E000}\u{E017}";

const QUERY_TERMS: [&str; 7] = ["search", "query", "q", "input", "text", "find", "lookup"];

/// TYPE: keyboard entry with per-character and script-assignment fallbacks.
/// Without an id the most query-like input field is chosen.
pub struct TypeText;

#[async_trait]
impl ActionStrategy for TypeText {
    async fn execute(&self, params: &ActionParams, ctx: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome> {
        let text = params
            .text("text")
            .ok_or_else(|| WebPilotError::Execution("TYPE requires a non-empty 'text'".into()))?;
        let target = targeting::acquire(params, ctx, Some(auto_detect_field)).await?;
        let driver = ctx.driver;
        let handle = target.element.handle.clone();
        frame::within(driver, &target.element.frame, enter_text(driver, &handle, &text, ctx.pacing)).await?;
        Ok(Outcome::on_target(
            &target,
            format!("Typed '{}' into element {}: '{}'", text, target.id, target.element.label),
        ))
    }
}

async fn enter_text(
    driver: &dyn DocumentDriver,
    handle: &NodeHandle,
    text: &str,
    pacing: &PacingConfig,
) -> WebPilotResult<()> {
    match keyboard_entry(driver, handle, text, pacing).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::warn!(error = %e, "keyboard entry failed; assigning value by script");
            driver
                .execute_on(handle, scripts::ASSIGN_VALUE, vec![json!(text)])
                .await
                .map(|_| ())
        }
    }
}

async fn keyboard_entry(
    driver: &dyn DocumentDriver,
    handle: &NodeHandle,
    text: &str,
    pacing: &PacingConfig,
) -> WebPilotResult<()> {
    wait_interactable(driver, handle).await?;
    driver.execute_on(handle, scripts::SCROLL_INTO_VIEW, vec![]).await?;
    let settle = Duration::from_millis(pacing.scroll_settle_ms);
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
    driver.execute_on(handle, scripts::FOCUS, vec![]).await?;

    if let Err(e) = driver.clear(handle).await {
        if e.is_fatal() {
            return Err(e);
        }
        tracing::debug!(error = %e, "native clear failed; using select-all + delete");
        driver.send_keys(handle, SELECT_ALL_DELETE).await?;
    }

    if let Err(e) = driver.send_keys(handle, text).await {
        if e.is_fatal() {
            return Err(e);
        }
        tracing::debug!(error = %e, "key-send failed; typing character by character");
        for ch in text.chars() {
            driver.send_keys(handle, ch.encode_utf8(&mut [0; 4])).await?;
            let pause = pacing.keystroke_delay.sample();
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
    }

    driver.execute_on(handle, scripts::DISPATCH_INPUT_CHANGE, vec![]).await?;
    Ok(())
}

async fn wait_interactable(driver: &dyn DocumentDriver, handle: &NodeHandle) -> WebPilotResult<()> {
    let started = Instant::now();
    loop {
        match driver.is_interactable(handle).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) if e.is_fatal() || e.is_stale() => return Err(e),
            Err(e) => tracing::debug!(error = %e, "interactable check failed"),
        }
        if started.elapsed() >= INTERACTABLE_WAIT {
            return Err(WebPilotError::Execution("element never became interactable".into()));
        }
        tokio::time::sleep(INTERACTABLE_POLL).await;
    }
}

/// Highest-scoring text field of the observation, by similarity to common query terms.
pub fn auto_detect_field(observation: &Observation) -> Option<u32> {
    let mut best: Option<(u32, f64)> = None;
    for observed in &observation.elements {
        if !matches!(observed.element.tag.as_str(), "input" | "textarea") {
            continue;
        }
        let score = field_score(&observed.element);
        if score > 0.0 && best.map_or(true, |(_, top)| score > top) {
            best = Some((observed.id, score));
        }
    }
    best.map(|(id, _)| id)
}

fn field_score(element: &CandidateElement) -> f64 {
    let label = element.label.to_lowercase();
    let mut score = QUERY_TERMS.iter().filter(|t| label.contains(*t)).count() as f64 * 0.3;
    if element.visible {
        score += 0.2;
    }
    score += element.confidence * 0.3;
    if element.tag == "input" {
        score += 0.1;
    }
    for value in element.attributes.values() {
        let value = value.to_lowercase();
        score += QUERY_TERMS.iter().filter(|t| value.contains(*t)).count() as f64 * 0.2;
    }
    score
}
