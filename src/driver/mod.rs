pub mod scripts;
pub mod webdriver;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::WebPilotResult;

/// Non-owning reference to a node discovered during one catalog build.
///
/// The driver stamps every scanned node with `<generation>:<key>`; a handle is
/// only dereferenceable while the document still carries that stamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle {
    pub generation: u64,
    pub key: String,
}

impl NodeHandle {
    pub fn new(generation: u64, key: impl Into<String>) -> Self {
        Self {
            generation,
            key: key.into(),
        }
    }

    /// Value of the `data-webpilot-ref` attribute written by the scan script.
    pub fn marker(&self) -> String {
        format!("{}:{}", self.generation, self.key)
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.marker())
    }
}

#[derive(Debug, Clone)]
pub struct ScanRequest<'a> {
    pub generation: u64,
    pub selectors: &'a str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// Raw attribute snapshot as reported by the scan script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAttributes {
    pub id: String,
    pub class: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
}

/// One node matched by the actionable-role selectors, before filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawNode {
    pub key: String,
    pub tag: String,
    pub text: Option<String>,
    pub aria_label: Option<String>,
    pub placeholder: Option<String>,
    pub title: Option<String>,
    pub alt: Option<String>,
    pub value: Option<String>,
    pub rect: Rect,
    pub hidden: bool,
    pub has_click_handler: bool,
    pub attributes: RawAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameScan {
    pub index: u16,
    /// Position of the iframe element in the top-level viewport.
    pub offset: Rect,
    /// False for cross-origin frames whose document cannot be read.
    pub accessible: bool,
    pub nodes: Vec<RawNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentScan {
    pub viewport: Viewport,
    pub nodes: Vec<RawNode>,
    pub frames: Vec<FrameScan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerGesture {
    Click,
    DoubleClick,
    ContextClick,
    Hover,
    /// Pointer travels to the element, pauses, then clicks.
    MoveThenClick,
}

/// Everything the control loop needs from the rendering/automation backend.
///
/// Element-level calls resolve the handle inside whatever frame context is
/// current; callers switch frames first. A handle whose node is gone yields
/// `StaleTarget`; a vanished session yields `SessionLost`.
#[async_trait]
pub trait DocumentDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> WebPilotResult<()>;

    async fn current_url(&self) -> WebPilotResult<String>;

    async fn title(&self) -> WebPilotResult<String>;

    async fn ready_state(&self) -> WebPilotResult<String>;

    /// Poll until the document root is reachable. `Ok(false)` on timeout.
    async fn wait_for_root(&self, timeout: Duration) -> WebPilotResult<bool>;

    async fn scan_document(&self, request: &ScanRequest<'_>) -> WebPilotResult<DocumentScan>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&self) -> WebPilotResult<Vec<u8>>;

    async fn execute_script(
        &self,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> WebPilotResult<serde_json::Value>;

    /// Run `script` with the element as `arguments[0]` and `args` after it.
    async fn execute_on(
        &self,
        handle: &NodeHandle,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> WebPilotResult<serde_json::Value>;

    async fn switch_to_frame(&self, index: u16) -> WebPilotResult<()>;

    async fn switch_to_main(&self) -> WebPilotResult<()>;

    /// Cheap dereference check; `StaleTarget` when the node is gone.
    async fn probe(&self, handle: &NodeHandle) -> WebPilotResult<()>;

    async fn click(&self, handle: &NodeHandle) -> WebPilotResult<()>;

    async fn pointer(&self, handle: &NodeHandle, gesture: PointerGesture) -> WebPilotResult<()>;

    async fn clear(&self, handle: &NodeHandle) -> WebPilotResult<()>;

    async fn send_keys(&self, handle: &NodeHandle, text: &str) -> WebPilotResult<()>;

    /// Select by visible text, then by value, then by numeric index.
    async fn select_option(&self, handle: &NodeHandle, choice: &str) -> WebPilotResult<()>;

    async fn text(&self, handle: &NodeHandle) -> WebPilotResult<String>;

    async fn is_interactable(&self, handle: &NodeHandle) -> WebPilotResult<bool>;

    /// Key press delivered to the focused element.
    async fn press_key(&self, key: &str) -> WebPilotResult<()>;

    async fn refresh(&self) -> WebPilotResult<()>;

    async fn back(&self) -> WebPilotResult<()>;

    async fn forward(&self) -> WebPilotResult<()>;

    async fn quit(&self) -> WebPilotResult<()>;
}

/// Maps a human key name to the WebDriver private-use code point.
pub fn key_code(name: &str) -> Option<char> {
    let code = match name.trim().to_ascii_lowercase().as_str() {
        "enter" | "return" => '\u{E007}',
        "tab" => '\u{E004}',
        "escape" | "esc" => '\u{E00C}',
        "backspace" => '\u{E003}',
        "delete" | "del" => '\u{E017}',
        "space" => '\u{E00D}',
        "arrowup" | "up" => '\u{E013}',
        "arrowdown" | "down" => '\u{E015}',
        "arrowleft" | "left" => '\u{E012}',
        "arrowright" | "right" => '\u{E014}',
        "home" => '\u{E011}',
        "end" => '\u{E010}',
        "pageup" => '\u{E00E}',
        "pagedown" => '\u{E00F}',
        "control" | "ctrl" => '\u{E009}',
        "shift" => '\u{E008}',
        "alt" => '\u{E00A}',
        "f5" => '\u{E035}',
        _ => return None,
    };
    Some(code)
}
