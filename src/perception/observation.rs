use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::config::PerceptionConfig;
use crate::driver::DocumentDriver;
use crate::errors::WebPilotResult;
use crate::oracle::types::DecisionRequest;
use crate::perception::annotator;
use crate::perception::types::{Catalog, CandidateElement};

/// A catalog entry as numbered for the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedElement {
    /// Observation-local id (1..K). Authoritative for the next decision.
    pub id: u32,
    pub element: CandidateElement,
}

impl ObservedElement {
    pub fn describe(&self) -> String {
        let label: String = self.element.label.chars().take(40).collect();
        let kind = if self.element.form_field {
            "form field"
        } else if self.element.clickable {
            "clickable"
        } else {
            "element"
        };
        format!(
            "- ID {}: \"{}\" ({}) [conf:{:.1}] {}",
            self.id, label, self.element.tag, self.element.confidence, kind
        )
    }
}

/// Everything the oracle sees for one decision.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub objective: String,
    pub url: String,
    pub feedback: String,
    pub generation: u64,
    pub elements: Vec<ObservedElement>,
    /// Annotated PNG, base64. `None` when no screenshot could be taken.
    pub image_base64: Option<String>,
}

impl Observation {
    pub fn get(&self, id: u32) -> Option<&ObservedElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn ids(&self) -> Vec<u32> {
        self.elements.iter().map(|e| e.id).collect()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.elements.iter().map(ObservedElement::describe).collect()
    }

    pub fn to_request(&self) -> DecisionRequest {
        DecisionRequest {
            objective: self.objective.clone(),
            url: self.url.clone(),
            feedback: self.feedback.clone(),
            elements: self.descriptions(),
            image_base64: self.image_base64.clone(),
        }
    }
}

pub struct ObservationComposer {
    confidence_floor: f64,
    limit: usize,
}

impl ObservationComposer {
    pub fn new(config: &PerceptionConfig) -> Self {
        Self {
            confidence_floor: config.confidence_floor,
            limit: config.observation_limit,
        }
    }

    /// Visible entries at or above the floor, renumbered 1..K. Leaves the catalog untouched.
    pub fn select(&self, catalog: &Catalog) -> Vec<ObservedElement> {
        catalog
            .elements
            .iter()
            .filter(|e| e.visible && e.confidence >= self.confidence_floor)
            .take(self.limit)
            .enumerate()
            .map(|(i, e)| ObservedElement {
                id: i as u32 + 1,
                element: e.clone(),
            })
            .collect()
    }

    /// Build the observation payload. An unreadable URL is tolerated; a failed
    /// screenshot is returned as an error so the caller can count it against the budget.
    pub async fn compose(
        &self,
        driver: &dyn DocumentDriver,
        objective: &str,
        feedback: &str,
        catalog: &Catalog,
    ) -> WebPilotResult<Observation> {
        let url = match driver.current_url().await {
            Ok(url) => url,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "current url unavailable");
                String::from("unknown")
            }
        };

        let elements = self.select(catalog);
        let screenshot = driver.screenshot().await?;

        let scale = match image::load_from_memory(&screenshot) {
            Ok(img) if catalog.viewport.width > 0.0 => f64::from(img.width()) / catalog.viewport.width,
            _ => 1.0,
        };
        let png = match annotator::annotate_image(&screenshot, &elements, scale) {
            Ok(annotated) => annotated,
            Err(e) => {
                tracing::warn!(error = %e, "annotation failed; sending raw screenshot");
                screenshot
            }
        };

        tracing::info!(
            url = %url,
            observed = elements.len(),
            catalog = catalog.len(),
            "observation composed"
        );

        Ok(Observation {
            objective: objective.to_string(),
            url,
            feedback: feedback.to_string(),
            generation: catalog.generation,
            elements,
            image_base64: Some(base64::engine::general_purpose::STANDARD.encode(png)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Rect, Viewport};
    use crate::testing::{candidate, FakeDriver};

    fn catalog(elements: Vec<CandidateElement>) -> Catalog {
        Catalog {
            generation: 2,
            viewport: Viewport { width: 1000.0, height: 800.0 },
            elements,
        }
    }

    #[test]
    fn select_filters_and_renumbers() {
        let mut hidden = candidate(2, "button", "Offscreen", Rect::new(0.0, 900.0, 10.0, 10.0));
        hidden.visible = false;
        let mut weak = candidate(3, "span", "Weak", Rect::new(0.0, 0.0, 10.0, 10.0));
        weak.confidence = 0.2;
        let catalog = catalog(vec![
            candidate(1, "a", "Home", Rect::new(0.0, 0.0, 10.0, 10.0)),
            hidden,
            weak,
            candidate(4, "button", "Go", Rect::new(20.0, 0.0, 10.0, 10.0)),
        ]);
        let composer = ObservationComposer::new(&PerceptionConfig::default());

        let observed = composer.select(&catalog);
        let summary: Vec<(u32, &str)> = observed.iter().map(|o| (o.id, o.element.label.as_str())).collect();
        assert_eq!(summary, vec![(1, "Home"), (2, "Go")]);
        assert_eq!(observed[1].element.id, 4);
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn select_respects_limit() {
        let elements = (1..=45)
            .map(|i| candidate(i, "a", &format!("link {i}"), Rect::new(0.0, 0.0, 10.0, 10.0)))
            .collect();
        let composer = ObservationComposer::new(&PerceptionConfig::default());
        let observed = composer.select(&catalog(elements));
        assert_eq!(observed.len(), 30);
        assert_eq!(observed.last().map(|o| o.id), Some(30));
    }

    #[test]
    fn description_truncates_label_and_names_kind() {
        let mut element = candidate(1, "input", &"q".repeat(60), Rect::new(0.0, 0.0, 10.0, 10.0));
        element.confidence = 0.7;
        let line = ObservedElement { id: 5, element }.describe();
        assert_eq!(line, format!("- ID 5: \"{}\" (input) [conf:0.7] form field", "q".repeat(40)));
    }

    #[tokio::test]
    async fn compose_bundles_url_feedback_and_image() {
        let driver = FakeDriver::default();
        driver.set_url("https://example.org/");
        let composer = ObservationComposer::new(&PerceptionConfig::default());
        let catalog = catalog(vec![candidate(1, "a", "Home", Rect::new(0.0, 0.0, 10.0, 10.0))]);

        let obs = composer.compose(&driver, "find docs", "clicked", &catalog).await.unwrap();
        assert_eq!(obs.url, "https://example.org/");
        assert_eq!(obs.feedback, "clicked");
        assert_eq!(obs.generation, 2);
        assert_eq!(obs.ids(), vec![1]);
        assert!(obs.image_base64.is_some());
        let request = obs.to_request();
        assert_eq!(request.elements.len(), 1);
        assert_eq!(request.objective, "find docs");
    }
}
