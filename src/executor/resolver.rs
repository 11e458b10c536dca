use crate::driver::DocumentDriver;
use crate::errors::WebPilotResult;
use crate::perception::catalog::CandidateCatalogBuilder;
use crate::perception::types::{Catalog, CandidateElement};

/// Re-finds an invalidated target in a freshly built catalog by tag and label.
///
/// Heuristic only: a different element with the same tag and label is an
/// accepted false match. Callers record such targets as recovered.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaleReferenceResolver;

impl StaleReferenceResolver {
    /// Rebuild the catalog (replacing `catalog`) and look for a match.
    pub async fn recover(
        &self,
        driver: &dyn DocumentDriver,
        builder: &CandidateCatalogBuilder,
        catalog: &mut Catalog,
        lost: &CandidateElement,
    ) -> WebPilotResult<Option<CandidateElement>> {
        let fresh = builder.build(driver).await?;
        let found = find_match(&fresh, &lost.tag, &lost.label).cloned();
        tracing::debug!(
            tag = %lost.tag,
            label = %lost.label,
            generation = fresh.generation,
            found = found.is_some(),
            "stale target lookup"
        );
        *catalog = fresh;
        Ok(found)
    }
}

/// First element whose tag and label both equal the originals.
pub fn find_match<'c>(catalog: &'c Catalog, tag: &str, label: &str) -> Option<&'c CandidateElement> {
    catalog
        .elements
        .iter()
        .find(|e| e.tag == tag && e.label == label)
}
