use crate::errors::{WebPilotError, WebPilotResult};
use crate::executor::action::{ActionParams, Resolution};
use crate::executor::frame;
use crate::executor::resolver::StaleReferenceResolver;
use crate::executor::ExecutionContext;
use crate::perception::observation::Observation;
use crate::perception::types::CandidateElement;

/// A dereferenceable element for the current action.
#[derive(Debug, Clone)]
pub struct Target {
    /// Id as the oracle saw it.
    pub id: u32,
    pub element: CandidateElement,
    pub resolution: Resolution,
}

/// How to pick an element when the decision carries no id.
pub type AutoDetect = fn(&Observation) -> Option<u32>;

/// Resolve the decision's id against the observation numbering, then make
/// sure the handle still dereferences, recovering it once if it went stale.
///
/// Unknown ids fail before any driver call.
pub async fn acquire(
    params: &ActionParams,
    ctx: &mut ExecutionContext<'_>,
    auto_detect: Option<AutoDetect>,
) -> WebPilotResult<Target> {
    let id = match (params.target_id(), auto_detect) {
        (Some(id), _) => id,
        (None, Some(detect)) => {
            let id = detect(ctx.observation).ok_or_else(|| {
                WebPilotError::Execution("No element id given and no suitable input field found".into())
            })?;
            tracing::info!(target_id = id, "auto-detected input field");
            id
        }
        (None, None) => {
            return Err(WebPilotError::Execution(format!(
                "Element id required. Available: {:?}",
                ctx.observation.ids()
            )))
        }
    };

    let observed = ctx.observation.get(id).ok_or_else(|| {
        WebPilotError::Execution(format!(
            "Element ID {id} not found. Available: {:?}",
            ctx.observation.ids()
        ))
    })?;
    let original = observed.element.clone();

    // A handle from an older generation is never dereferenced directly.
    if let Some(current) = ctx.catalog.by_handle(&original.handle).cloned() {
        let driver = ctx.driver;
        match frame::within(driver, &current.frame, driver.probe(&current.handle)).await {
            Ok(()) => {
                return Ok(Target {
                    id,
                    element: current,
                    resolution: Resolution::Direct,
                })
            }
            Err(e) if e.is_stale() => {
                tracing::warn!(target_id = id, error = %e, "target handle is stale");
            }
            Err(e) => return Err(e),
        }
    } else {
        tracing::warn!(target_id = id, generation = original.handle.generation, "target from an older catalog");
    }

    let recovered = StaleReferenceResolver
        .recover(ctx.driver, ctx.builder, ctx.catalog, &original)
        .await?;
    match recovered {
        Some(element) => {
            tracing::info!(
                target_id = id,
                tag = %element.tag,
                label = %element.label,
                new_catalog_id = element.id,
                "stale target recovered"
            );
            Ok(Target {
                id,
                element,
                resolution: Resolution::Recovered,
            })
        }
        None => Err(WebPilotError::Execution(format!(
            "Element ID {id} ({} '{}') went stale and could not be recovered",
            original.tag, original.label
        ))),
    }
}
