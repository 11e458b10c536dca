use std::future::Future;

use crate::driver::DocumentDriver;
use crate::errors::WebPilotResult;
use crate::perception::types::FrameOrigin;

/// Run `op` inside the frame the target lives in, then return to the top-level
/// document whether `op` succeeded or not.
pub async fn within<T, Fut>(driver: &dyn DocumentDriver, origin: &FrameOrigin, op: Fut) -> WebPilotResult<T>
where
    Fut: Future<Output = WebPilotResult<T>>,
{
    let FrameOrigin::Nested { index } = *origin else {
        return op.await;
    };

    driver.switch_to_frame(index).await?;
    tracing::debug!(frame = index, "entered frame");

    let outcome = op.await;

    if let Err(e) = driver.switch_to_main().await {
        tracing::warn!(frame = index, error = %e, "failed to return to top-level document");
        if e.is_fatal() || outcome.is_ok() {
            return Err(e);
        }
    }
    outcome
}
