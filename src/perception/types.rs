use serde::{Deserialize, Serialize};

use crate::driver::{NodeHandle, Rect, Viewport};

/// Where a candidate lives: the top-level document or an accessible iframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameOrigin {
    Main,
    Nested { index: u16 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSnapshot {
    pub id: String,
    pub class: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
}

impl AttributeSnapshot {
    pub fn values(&self) -> [&str; 5] {
        [&self.id, &self.class, &self.name, &self.kind, &self.role]
    }
}

/// One actionable element discovered in a single perception cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateElement {
    /// Catalog-local id, 1..N after sorting. Not stable across cycles.
    pub id: u32,
    pub handle: NodeHandle,
    pub tag: String,
    pub label: String,
    /// Bounding box fully inside the viewport.
    pub visible: bool,
    pub clickable: bool,
    pub form_field: bool,
    /// Viewport coordinates, frame offset already applied.
    pub bbox: Rect,
    pub attributes: AttributeSnapshot,
    /// Opaque ranking signal in [0, 1].
    pub confidence: f64,
    pub frame: FrameOrigin,
}

impl CandidateElement {
    /// Same content regardless of id/handle; used to compare two builds.
    pub fn same_content(&self, other: &CandidateElement) -> bool {
        self.tag == other.tag
            && self.label == other.label
            && self.bbox == other.bbox
            && self.confidence == other.confidence
            && self.frame == other.frame
    }
}

/// The ordered candidates of one build. Replaced wholesale on every rebuild.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub generation: u64,
    pub viewport: Viewport,
    pub elements: Vec<CandidateElement>,
}

impl Catalog {
    pub fn empty(generation: u64) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn get(&self, id: u32) -> Option<&CandidateElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Resolve a handle only when it belongs to this generation.
    pub fn by_handle(&self, handle: &NodeHandle) -> Option<&CandidateElement> {
        if handle.generation != self.generation {
            return None;
        }
        self.elements.iter().find(|e| &e.handle == handle)
    }
}
