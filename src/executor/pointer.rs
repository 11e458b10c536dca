use async_trait::async_trait;
use serde_json::json;

use crate::driver::{scripts, DocumentDriver, NodeHandle, PointerGesture};
use crate::errors::{WebPilotError, WebPilotResult};
use crate::executor::action::ActionParams;
use crate::executor::{frame, targeting, ActionStrategy, ExecutionContext, Outcome};

/// One way of activating an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rung {
    /// The driver's own element click.
    Native,
    /// `element.click()` in page script.
    Scripted,
    /// Pointer action sequence.
    Composed(PointerGesture),
    /// Synthetic `MouseEvent` of the given type.
    Dispatch(&'static str),
}

/// Pointer actions: each tries its ladder top to bottom and stops at the first
/// rung that works.
pub struct PointerStrategy {
    verb: &'static str,
    ladder: Vec<Rung>,
}

impl PointerStrategy {
    pub fn click() -> Self {
        Self {
            verb: "Clicked",
            ladder: vec![
                Rung::Native,
                Rung::Scripted,
                Rung::Composed(PointerGesture::Click),
                Rung::Dispatch("click"),
                Rung::Composed(PointerGesture::MoveThenClick),
            ],
        }
    }

    pub fn double_click() -> Self {
        Self {
            verb: "Double-clicked",
            ladder: vec![Rung::Composed(PointerGesture::DoubleClick), Rung::Dispatch("dblclick")],
        }
    }

    pub fn right_click() -> Self {
        Self {
            verb: "Right-clicked",
            ladder: vec![Rung::Composed(PointerGesture::ContextClick), Rung::Dispatch("contextmenu")],
        }
    }

    pub fn hover() -> Self {
        Self {
            verb: "Hovered over",
            ladder: vec![Rung::Composed(PointerGesture::Hover), Rung::Dispatch("mouseover")],
        }
    }

    pub fn ladder(&self) -> &[Rung] {
        &self.ladder
    }

    async fn climb(
        &self,
        driver: &dyn DocumentDriver,
        handle: &NodeHandle,
        settle: std::time::Duration,
    ) -> WebPilotResult<()> {
        let mut last_error: Option<WebPilotError> = None;
        for (step, rung) in self.ladder.iter().enumerate() {
            if let Err(e) = driver.execute_on(handle, scripts::SCROLL_INTO_VIEW, vec![]).await {
                if e.is_fatal() {
                    return Err(e);
                }
                tracing::debug!(error = %e, "scroll into view failed");
            }
            if !settle.is_zero() {
                tokio::time::sleep(settle).await;
            }

            match apply(driver, handle, *rung).await {
                Ok(()) => {
                    if step > 0 {
                        tracing::info!(rung = ?rung, step, "activation succeeded on fallback");
                    }
                    return Ok(());
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::debug!(rung = ?rung, error = %e, "activation rung failed");
                    last_error = Some(e);
                }
            }
        }
        Err(WebPilotError::Execution(format!(
            "all {} activation strategies failed; last error: {}",
            self.ladder.len(),
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

async fn apply(driver: &dyn DocumentDriver, handle: &NodeHandle, rung: Rung) -> WebPilotResult<()> {
    match rung {
        Rung::Native => driver.click(handle).await,
        Rung::Scripted => driver
            .execute_on(handle, scripts::SCRIPTED_CLICK, vec![])
            .await
            .map(|_| ()),
        Rung::Composed(gesture) => driver.pointer(handle, gesture).await,
        Rung::Dispatch(event) => driver
            .execute_on(handle, scripts::DISPATCH_MOUSE_EVENT, vec![json!(event)])
            .await
            .map(|_| ()),
    }
}

#[async_trait]
impl ActionStrategy for PointerStrategy {
    async fn execute(&self, params: &ActionParams, ctx: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome> {
        let target = targeting::acquire(params, ctx, None).await?;
        let driver = ctx.driver;
        let handle = target.element.handle.clone();
        frame::within(driver, &target.element.frame, self.climb(driver, &handle, ctx.scroll_settle())).await?;
        Ok(Outcome::on_target(
            &target,
            format!("{} element {}: '{}'", self.verb, target.id, target.element.label),
        ))
    }
}
