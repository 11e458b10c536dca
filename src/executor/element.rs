//! Single-step element actions: clear, select, read text.

use async_trait::async_trait;

use crate::errors::{WebPilotError, WebPilotResult};
use crate::executor::action::ActionParams;
use crate::executor::{frame, targeting, ActionStrategy, ExecutionContext, Outcome};

pub struct ClearField;

#[async_trait]
impl ActionStrategy for ClearField {
    async fn execute(&self, params: &ActionParams, ctx: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome> {
        let target = targeting::acquire(params, ctx, None).await?;
        let driver = ctx.driver;
        frame::within(driver, &target.element.frame, driver.clear(&target.element.handle)).await?;
        Ok(Outcome::on_target(&target, format!("Cleared element {}", target.id)))
    }
}

pub struct SelectOption;

#[async_trait]
impl ActionStrategy for SelectOption {
    async fn execute(&self, params: &ActionParams, ctx: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome> {
        let choice = params
            .text("option")
            .ok_or_else(|| WebPilotError::Execution("SELECT requires an 'option'".into()))?;
        let target = targeting::acquire(params, ctx, None).await?;
        let driver = ctx.driver;
        frame::within(
            driver,
            &target.element.frame,
            driver.select_option(&target.element.handle, &choice),
        )
        .await?;
        Ok(Outcome::on_target(
            &target,
            format!("Selected '{choice}' in element {}", target.id),
        ))
    }
}

pub struct ReadText;

#[async_trait]
impl ActionStrategy for ReadText {
    async fn execute(&self, params: &ActionParams, ctx: &mut ExecutionContext<'_>) -> WebPilotResult<Outcome> {
        let target = targeting::acquire(params, ctx, None).await?;
        let driver = ctx.driver;
        let text = frame::within(driver, &target.element.frame, driver.text(&target.element.handle)).await?;
        let shown: String = text.chars().take(500).collect();
        Ok(Outcome::on_target(
            &target,
            format!("Text of element {}: {shown}", target.id),
        ))
    }
}
