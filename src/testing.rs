//! In-memory collaborators shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::driver::{
    scripts, DocumentDriver, DocumentScan, FrameScan, NodeHandle, PointerGesture, RawNode, Rect,
    ScanRequest, Viewport,
};
use crate::errors::{WebPilotError, WebPilotResult};
use crate::executor::action::ActionResult;
use crate::oracle::provider::DecisionOracle;
use crate::oracle::types::{Decision, DecisionRequest};
use crate::perception::catalog::score;
use crate::perception::types::{AttributeSnapshot, CandidateElement, FrameOrigin};

// ── Builders ────────────────────────────────────────────────────────────────

pub fn raw_node(key: &str, tag: &str, label: &str, rect: Rect) -> RawNode {
    RawNode {
        key: key.to_string(),
        tag: tag.to_string(),
        text: (!label.is_empty()).then(|| label.to_string()),
        rect,
        ..RawNode::default()
    }
}

pub fn candidate(id: u32, tag: &str, label: &str, bbox: Rect) -> CandidateElement {
    CandidateElement {
        id,
        handle: NodeHandle::new(1, format!("m-{id}")),
        tag: tag.to_string(),
        label: label.to_string(),
        visible: true,
        clickable: matches!(tag, "button" | "a"),
        form_field: matches!(tag, "input" | "textarea" | "select"),
        bbox,
        attributes: AttributeSnapshot::default(),
        confidence: score(true, false, tag, false),
        frame: FrameOrigin::Main,
    }
}

pub fn blank_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

pub fn result(action_type: &str, success: bool) -> ActionResult {
    ActionResult {
        success,
        action_type: action_type.to_string(),
        message: String::new(),
        duration_ms: 1,
        artifact: None,
        target_id: None,
        error: (!success).then(|| "failed".to_string()),
        timestamp: chrono::Utc::now(),
        retry_count: 0,
        resolution: None,
    }
}

pub fn decision(name: &str, parameters: Value) -> Decision {
    Decision::action(name, parameters)
}

fn script_name(script: &str) -> &'static str {
    let known = [
        (scripts::SCAN_DOCUMENT, "scan_document"),
        (scripts::ROOT_READY, "root_ready"),
        (scripts::READY_STATE, "ready_state"),
        (scripts::SCROLL_INTO_VIEW, "scroll_into_view"),
        (scripts::SCRIPTED_CLICK, "scripted_click"),
        (scripts::DISPATCH_MOUSE_EVENT, "dispatch_mouse_event"),
        (scripts::FOCUS, "focus"),
        (scripts::DISPATCH_INPUT_CHANGE, "dispatch_input_change"),
        (scripts::ASSIGN_VALUE, "assign_value"),
        (scripts::SELECT_OPTION, "select_option"),
        (scripts::TEXT_CONTENT, "text_content"),
        (scripts::SCROLL_BY, "scroll_by"),
        (scripts::CHALLENGE_CHECKBOX, "challenge_checkbox"),
        (scripts::DISMISS_POPUPS, "dismiss_popups"),
        (scripts::PAGE_DATA, "page_data"),
        (scripts::PERFORMANCE_SAMPLE, "performance_sample"),
    ];
    known
        .iter()
        .find(|(source, _)| *source == script)
        .map(|(_, name)| *name)
        .unwrap_or("custom")
}

// ── FakeDriver ──────────────────────────────────────────────────────────────

struct FakeState {
    ready: bool,
    session_lost: bool,
    url: String,
    viewport: Viewport,
    nodes: Vec<RawNode>,
    frames: Vec<FrameScan>,
    last_generation: u64,
    stale_once: HashSet<String>,
    failing: HashSet<String>,
    fatal_on: HashSet<String>,
    script_values: HashMap<String, Value>,
    frame_depth: i32,
    max_frame_depth: i32,
    calls: Vec<String>,
    screenshot: Vec<u8>,
}

/// Scripted document: records every call, simulates stale markers, frame
/// switching, failing operations and session loss.
pub struct FakeDriver {
    state: Mutex<FakeState>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState {
                ready: true,
                session_lost: false,
                url: "about:blank".into(),
                viewport: Viewport { width: 1000.0, height: 800.0 },
                nodes: Vec::new(),
                frames: Vec::new(),
                last_generation: 0,
                stale_once: HashSet::new(),
                failing: HashSet::new(),
                fatal_on: HashSet::new(),
                script_values: HashMap::new(),
                frame_depth: 0,
                max_frame_depth: 0,
                calls: Vec::new(),
                screenshot: blank_png(100, 80),
            }),
        }
    }
}

impl FakeDriver {
    pub fn with_nodes(nodes: Vec<RawNode>) -> Self {
        let driver = Self::default();
        driver.state.lock().unwrap().nodes = nodes;
        driver
    }

    pub fn set_url(&self, url: &str) {
        self.state.lock().unwrap().url = url.to_string();
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.lock().unwrap().ready = ready;
    }

    pub fn set_nodes(&self, nodes: Vec<RawNode>) {
        self.state.lock().unwrap().nodes = nodes;
    }

    pub fn set_frames(&self, frames: Vec<FrameScan>) {
        self.state.lock().unwrap().frames = frames;
    }

    pub fn lose_session(&self) {
        self.state.lock().unwrap().session_lost = true;
    }

    /// The named operation reports the session as gone.
    pub fn lose_session_on(&self, op: &str) {
        self.state.lock().unwrap().fatal_on.insert(op.to_string());
    }

    /// The named operation (e.g. `click`, `send_keys`, `execute_on:scripted_click`) always fails.
    pub fn fail(&self, op: &str) {
        self.state.lock().unwrap().failing.insert(op.to_string());
    }

    /// Next dereference of this node key reports a stale reference.
    pub fn stale_once(&self, key: &str) {
        self.state.lock().unwrap().stale_once.insert(key.to_string());
    }

    pub fn script_returns(&self, name: &str, value: Value) {
        self.state.lock().unwrap().script_values.insert(name.to_string(), value);
    }

    pub fn frame_depth(&self) -> i32 {
        self.state.lock().unwrap().frame_depth
    }

    pub fn max_frame_depth(&self) -> i32 {
        self.state.lock().unwrap().max_frame_depth
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn calls_named(&self, name: &str) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| *c == name).count()
    }

    pub fn calls_with_prefix(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn enter(&self, call: String, op: &str) -> WebPilotResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.session_lost {
            return Err(WebPilotError::SessionLost("fake session closed".into()));
        }
        state.calls.push(call);
        if state.fatal_on.contains(op) {
            state.session_lost = true;
            return Err(WebPilotError::SessionLost(format!("session died during {op}")));
        }
        if state.failing.contains(op) {
            return Err(WebPilotError::Driver(format!("{op} failed")));
        }
        Ok(())
    }

    fn element(&self, handle: &NodeHandle, op: &str) -> WebPilotResult<()> {
        self.enter(format!("{op}:{}", handle.key), op)?;
        let mut state = self.state.lock().unwrap();
        if handle.generation != state.last_generation {
            return Err(WebPilotError::StaleTarget(format!("marker {handle} is gone")));
        }
        if state.stale_once.remove(&handle.key) {
            return Err(WebPilotError::StaleTarget(format!("{handle} detached")));
        }
        let exists = state.nodes.iter().any(|n| n.key == handle.key)
            || state.frames.iter().flat_map(|f| &f.nodes).any(|n| n.key == handle.key);
        if !exists {
            return Err(WebPilotError::StaleTarget(format!("{handle} not in document")));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> WebPilotResult<()> {
        self.enter(format!("navigate:{url}"), "navigate")?;
        self.state.lock().unwrap().url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> WebPilotResult<String> {
        self.enter("current_url".into(), "current_url")?;
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn title(&self) -> WebPilotResult<String> {
        self.enter("title".into(), "title")?;
        Ok("Fake page".into())
    }

    async fn ready_state(&self) -> WebPilotResult<String> {
        self.enter("ready_state".into(), "ready_state")?;
        Ok("complete".into())
    }

    async fn wait_for_root(&self, _timeout: Duration) -> WebPilotResult<bool> {
        self.enter("wait_for_root".into(), "wait_for_root")?;
        Ok(self.state.lock().unwrap().ready)
    }

    async fn scan_document(&self, request: &ScanRequest<'_>) -> WebPilotResult<DocumentScan> {
        self.enter("scan_document".into(), "scan_document")?;
        let mut state = self.state.lock().unwrap();
        state.last_generation = request.generation;
        Ok(DocumentScan {
            viewport: state.viewport,
            nodes: state.nodes.clone(),
            frames: state.frames.clone(),
        })
    }

    async fn screenshot(&self) -> WebPilotResult<Vec<u8>> {
        self.enter("screenshot".into(), "screenshot")?;
        Ok(self.state.lock().unwrap().screenshot.clone())
    }

    async fn execute_script(&self, script: &str, _args: Vec<Value>) -> WebPilotResult<Value> {
        let name = script_name(script);
        let op = format!("execute_script:{name}");
        self.enter(op.clone(), &op)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .script_values
            .get(name)
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn execute_on(&self, handle: &NodeHandle, script: &str, _args: Vec<Value>) -> WebPilotResult<Value> {
        let name = script_name(script);
        self.element(handle, &format!("execute_on:{name}"))?;
        let value = self.state.lock().unwrap().script_values.get(name).cloned();
        Ok(value.unwrap_or(match name {
            "select_option" => Value::Bool(true),
            _ => Value::Null,
        }))
    }

    async fn switch_to_frame(&self, index: u16) -> WebPilotResult<()> {
        self.enter(format!("switch_to_frame:{index}"), "switch_to_frame")?;
        let mut state = self.state.lock().unwrap();
        state.frame_depth += 1;
        state.max_frame_depth = state.max_frame_depth.max(state.frame_depth);
        Ok(())
    }

    async fn switch_to_main(&self) -> WebPilotResult<()> {
        self.enter("switch_to_main".into(), "switch_to_main")?;
        self.state.lock().unwrap().frame_depth = 0;
        Ok(())
    }

    async fn probe(&self, handle: &NodeHandle) -> WebPilotResult<()> {
        self.element(handle, "probe")
    }

    async fn click(&self, handle: &NodeHandle) -> WebPilotResult<()> {
        self.element(handle, "click")
    }

    async fn pointer(&self, handle: &NodeHandle, _gesture: PointerGesture) -> WebPilotResult<()> {
        self.element(handle, "pointer")
    }

    async fn clear(&self, handle: &NodeHandle) -> WebPilotResult<()> {
        self.element(handle, "clear")
    }

    async fn send_keys(&self, handle: &NodeHandle, _text: &str) -> WebPilotResult<()> {
        self.element(handle, "send_keys")
    }

    async fn select_option(&self, handle: &NodeHandle, _choice: &str) -> WebPilotResult<()> {
        self.element(handle, "select_option")
    }

    async fn text(&self, handle: &NodeHandle) -> WebPilotResult<String> {
        self.element(handle, "text")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .nodes
            .iter()
            .find(|n| n.key == handle.key)
            .and_then(|n| n.text.clone())
            .unwrap_or_default())
    }

    async fn is_interactable(&self, handle: &NodeHandle) -> WebPilotResult<bool> {
        self.element(handle, "is_interactable").map(|_| true)
    }

    async fn press_key(&self, key: &str) -> WebPilotResult<()> {
        self.enter(format!("press_key:{key}"), "press_key")
    }

    async fn refresh(&self) -> WebPilotResult<()> {
        self.enter("refresh".into(), "refresh")
    }

    async fn back(&self) -> WebPilotResult<()> {
        self.enter("back".into(), "back")
    }

    async fn forward(&self) -> WebPilotResult<()> {
        self.enter("forward".into(), "forward")
    }

    async fn quit(&self) -> WebPilotResult<()> {
        self.enter("quit".into(), "quit")
    }
}

// ── ScriptedOracle ──────────────────────────────────────────────────────────

/// Replays queued decisions, then repeats `fallback` (or errors when unset).
pub struct ScriptedOracle {
    queue: Mutex<VecDeque<WebPilotResult<Decision>>>,
    fallback: Option<Decision>,
    calls: AtomicUsize,
    requests: Mutex<Vec<DecisionRequest>>,
}

impl ScriptedOracle {
    pub fn sequence(items: Vec<WebPilotResult<Decision>>) -> Self {
        Self {
            queue: Mutex::new(items.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(decision: Decision) -> Self {
        Self {
            fallback: Some(decision),
            ..Self::sequence(Vec::new())
        }
    }

    pub fn then_repeat(mut self, decision: Decision) -> Self {
        self.fallback = Some(decision);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<DecisionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(&self, request: &DecisionRequest) -> WebPilotResult<Decision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(next) = self.queue.lock().unwrap().pop_front() {
            return next;
        }
        self.fallback
            .clone()
            .ok_or_else(|| WebPilotError::Oracle("script exhausted".into()))
    }
}
