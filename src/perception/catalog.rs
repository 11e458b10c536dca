use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::PerceptionConfig;
use crate::driver::{DocumentDriver, DocumentScan, NodeHandle, RawNode, Rect, ScanRequest, Viewport};
use crate::errors::WebPilotResult;
use crate::perception::types::{AttributeSnapshot, Catalog, CandidateElement, FrameOrigin};

/// Interactive tags, ARIA roles, explicit handlers, editable regions and
/// common clickable class markers.
pub const ACTIONABLE_SELECTORS: &str = "a, button, input, textarea, select, \
[role=\"button\"], [role=\"link\"], [onclick], [tabindex]:not([tabindex=\"-1\"]), \
[contenteditable=\"true\"], [data-testid], [data-cy], .btn, .button, .link, .clickable, \
label, option, summary, details, [href]";

const LABEL_LIMIT: usize = 100;

// ── Scoring weights ─────────────────────────────────────────────────────────
const BASE_CONFIDENCE: f64 = 0.5;
const VISIBLE_BONUS: f64 = 0.2;
const CLICK_HANDLER_BONUS: f64 = 0.1;
const CANONICAL_TAG_BONUS: f64 = 0.1;
const ROLE_BONUS: f64 = 0.1;

/// Scans the live document into a fresh, sorted, id-numbered [`Catalog`].
pub struct CandidateCatalogBuilder {
    config: PerceptionConfig,
    generation: AtomicU64,
}

impl CandidateCatalogBuilder {
    pub fn new(config: PerceptionConfig) -> Self {
        Self {
            config,
            generation: AtomicU64::new(0),
        }
    }

    /// Build a catalog from the current document.
    ///
    /// An unready document or a failed scan yields an empty catalog; only a
    /// lost session is returned as an error.
    pub async fn build(&self, driver: &dyn DocumentDriver) -> WebPilotResult<Catalog> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let timeout = Duration::from_millis(self.config.ready_timeout_ms);
        match driver.wait_for_root(timeout).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(generation, "document root not reachable; empty catalog");
                return Ok(Catalog::empty(generation));
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "readiness check failed; empty catalog");
                return Ok(Catalog::empty(generation));
            }
        }

        let request = ScanRequest {
            generation,
            selectors: ACTIONABLE_SELECTORS,
        };
        let scan = match driver.scan_document(&request).await {
            Ok(scan) => scan,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "document scan failed; empty catalog");
                return Ok(Catalog::empty(generation));
            }
        };

        let catalog = self.assemble(generation, scan);
        tracing::info!(generation, candidates = catalog.len(), "catalog built");
        Ok(catalog)
    }

    /// Filter, score, sort and number the raw scan.
    pub fn assemble(&self, generation: u64, scan: DocumentScan) -> Catalog {
        let viewport = scan.viewport;
        let mut elements: Vec<CandidateElement> = scan
            .nodes
            .iter()
            .filter_map(|node| self.candidate(generation, node, FrameOrigin::Main, (0.0, 0.0), viewport))
            .collect();

        for frame in &scan.frames {
            if !frame.accessible {
                tracing::debug!(frame = frame.index, "skipping cross-origin frame");
                continue;
            }
            let origin = FrameOrigin::Nested { index: frame.index };
            let offset = (frame.offset.x, frame.offset.y);
            elements.extend(
                frame
                    .nodes
                    .iter()
                    .filter_map(|node| self.candidate(generation, node, origin, offset, viewport)),
            );
        }

        // Stable: equal keys keep document order.
        elements.sort_by(|a, b| {
            b.visible
                .cmp(&a.visible)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
        });
        elements.truncate(self.config.max_candidates);
        for (i, element) in elements.iter_mut().enumerate() {
            element.id = i as u32 + 1;
        }

        Catalog {
            generation,
            viewport,
            elements,
        }
    }

    fn candidate(
        &self,
        generation: u64,
        node: &RawNode,
        frame: FrameOrigin,
        (dx, dy): (f64, f64),
        viewport: Viewport,
    ) -> Option<CandidateElement> {
        let bbox = node.rect.translated(dx, dy);
        if bbox.area() <= 0.0 || node.hidden {
            return None;
        }
        if node.tag == "input" && node.attributes.kind.eq_ignore_ascii_case("file") {
            return None;
        }
        if !within_margin(&bbox, viewport, self.config.viewport_margin) {
            return None;
        }

        let visible = fully_visible(&bbox, viewport);
        let role = node.attributes.role.trim();
        let clickable = matches!(node.tag.as_str(), "button" | "a")
            || node.has_click_handler
            || role == "button";
        let form_field = matches!(node.tag.as_str(), "input" | "textarea" | "select");

        Some(CandidateElement {
            id: 0,
            handle: NodeHandle::new(generation, node.key.clone()),
            tag: node.tag.clone(),
            label: derive_label(node),
            visible,
            clickable,
            form_field,
            bbox,
            attributes: AttributeSnapshot {
                id: node.attributes.id.clone(),
                class: node.attributes.class.clone(),
                name: node.attributes.name.clone(),
                kind: node.attributes.kind.clone(),
                role: node.attributes.role.clone(),
            },
            confidence: score(visible, node.has_click_handler, &node.tag, !role.is_empty()),
            frame,
        })
    }
}

/// Heuristic ranking signal; monotonic in every factor and clipped to 1.0.
pub fn score(visible: bool, click_handler: bool, tag: &str, has_role: bool) -> f64 {
    let mut confidence = BASE_CONFIDENCE;
    if visible {
        confidence += VISIBLE_BONUS;
    }
    if click_handler {
        confidence += CLICK_HANDLER_BONUS;
    }
    if matches!(tag, "button" | "a") {
        confidence += CANONICAL_TAG_BONUS;
    }
    if has_role {
        confidence += ROLE_BONUS;
    }
    confidence.min(1.0)
}

/// First non-empty of text, aria-label, placeholder, title, alt, value; else the tag.
pub fn derive_label(node: &RawNode) -> String {
    let source = [
        &node.text,
        &node.aria_label,
        &node.placeholder,
        &node.title,
        &node.alt,
        &node.value,
    ]
    .into_iter()
    .flatten()
    .map(|s| s.trim())
    .find(|s| !s.is_empty())
    .unwrap_or(node.tag.as_str());

    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(LABEL_LIMIT).collect()
}

fn within_margin(bbox: &Rect, viewport: Viewport, margin: f64) -> bool {
    bbox.y >= -margin
        && bbox.x >= -margin
        && bbox.bottom() <= viewport.height + margin
        && bbox.right() <= viewport.width + margin
}

fn fully_visible(bbox: &Rect, viewport: Viewport) -> bool {
    bbox.y >= 0.0 && bbox.x >= 0.0 && bbox.bottom() <= viewport.height && bbox.right() <= viewport.width
}
