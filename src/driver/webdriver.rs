//! W3C WebDriver client speaking plain HTTP/JSON through reqwest.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Method;
use serde_json::{json, Value};

use crate::config::DriverConfig;
use crate::driver::scripts;
use crate::driver::{
    key_code, DocumentDriver, DocumentScan, NodeHandle, PointerGesture, ScanRequest,
};
use crate::errors::{WebPilotError, WebPilotResult};

/// Key under which WebDriver serializes element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const MARKER_ATTRIBUTE: &str = "data-webpilot-ref";
const ROOT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct WebDriverSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
    command_timeout: Duration,
}

impl WebDriverSession {
    /// Open a new browser session on the configured WebDriver endpoint.
    pub async fn connect(config: &DriverConfig) -> WebPilotResult<Self> {
        let client = reqwest::Client::new();
        let base_url = config.webdriver_url.trim_end_matches('/').to_string();
        let command_timeout = Duration::from_secs(config.command_timeout_secs);

        tracing::info!(url = %base_url, browser = %config.browser, headless = config.headless, "creating webdriver session");
        let response = client
            .post(format!("{base_url}/session"))
            .timeout(command_timeout)
            .json(&capabilities(config))
            .send()
            .await
            .map_err(transport_error)?;
        let value = unwrap_response(response).await?;
        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| WebPilotError::Driver("session response lacks sessionId".into()))?
            .to_string();

        let session = Self {
            client,
            base_url,
            session_id,
            command_timeout,
        };

        let rect = json!({ "width": config.window_width, "height": config.window_height });
        if let Err(e) = session.command(Method::POST, "/window/rect", Some(rect)).await {
            tracing::warn!(error = %e, "could not resize browser window");
        }
        tracing::info!(session = %session.session_id, "webdriver session ready");
        Ok(session)
    }

    /// Wrap an already running session.
    pub fn attach(base_url: &str, session_id: &str, command_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: session_id.to_string(),
            command_timeout,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> WebPilotResult<Value> {
        let url = format!("{}/session/{}{}", self.base_url, self.session_id, path);
        tracing::trace!(method = %method, path = %path, "webdriver command");
        let mut request = self.client.request(method.clone(), &url).timeout(self.command_timeout);
        if method == Method::POST {
            request = request.json(&body.unwrap_or_else(|| json!({})));
        }
        let response = request.send().await.map_err(transport_error)?;
        unwrap_response(response).await
    }

    async fn locate(&self, handle: &NodeHandle) -> WebPilotResult<String> {
        let selector = format!("[{MARKER_ATTRIBUTE}=\"{}\"]", handle.marker());
        let value = self
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        element_id(&value)
    }

    async fn script(&self, script: &str, args: Vec<Value>) -> WebPilotResult<Value> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn perform_actions(&self, actions: Value) -> WebPilotResult<()> {
        let performed = self
            .command(Method::POST, "/actions", Some(json!({ "actions": [actions] })))
            .await;
        // Release whatever is still pressed, even when the sequence failed.
        if let Err(e) = self.command(Method::DELETE, "/actions", None).await {
            if e.is_fatal() {
                return Err(e);
            }
            tracing::debug!(error = %e, "releasing input state failed");
        }
        performed.map(|_| ())
    }
}

fn capabilities(config: &DriverConfig) -> Value {
    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        format!("--window-size={},{}", config.window_width, config.window_height),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
    }
    let mut always_match = json!({ "browserName": config.browser });
    match config.browser.as_str() {
        "firefox" => {
            let ff_args: Vec<&str> = if config.headless { vec!["-headless"] } else { vec![] };
            always_match["moz:firefoxOptions"] = json!({ "args": ff_args });
        }
        _ => {
            always_match["goog:chromeOptions"] = json!({ "args": args });
        }
    }
    json!({ "capabilities": { "alwaysMatch": always_match } })
}

async fn unwrap_response(response: reqwest::Response) -> WebPilotResult<Value> {
    let status = response.status();
    let body: Value = response.json().await.map_err(transport_error)?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);
    if status.is_success() {
        Ok(value)
    } else {
        Err(protocol_error(&value))
    }
}

/// Classify a WebDriver error payload (`{"error": ..., "message": ...}`).
pub(crate) fn protocol_error(value: &Value) -> WebPilotError {
    let code = value["error"].as_str().unwrap_or("unknown error");
    let message = value["message"].as_str().unwrap_or_default();
    let detail = if message.is_empty() {
        code.to_string()
    } else {
        format!("{code}: {message}")
    };
    match code {
        "stale element reference" | "no such element" | "detached shadow root" => {
            WebPilotError::StaleTarget(detail)
        }
        "invalid session id" | "no such window" | "session not created" => {
            WebPilotError::SessionLost(detail)
        }
        "timeout" | "script timeout" => WebPilotError::DriverTimeout(detail),
        _ => WebPilotError::Driver(detail),
    }
}

fn transport_error(e: reqwest::Error) -> WebPilotError {
    if e.is_timeout() {
        WebPilotError::DriverTimeout(e.to_string())
    } else if e.is_connect() {
        WebPilotError::SessionLost(format!("webdriver endpoint unreachable: {e}"))
    } else if e.is_decode() {
        WebPilotError::Driver(format!("malformed webdriver response: {e}"))
    } else {
        WebPilotError::Http(e)
    }
}

fn element_id(value: &Value) -> WebPilotResult<String> {
    value[ELEMENT_KEY]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| WebPilotError::Driver("malformed element reference".into()))
}

fn element_ref(id: &str) -> Value {
    json!({ ELEMENT_KEY: id })
}

fn pointer_sequence(element: &str, gesture: PointerGesture) -> Value {
    let origin = element_ref(element);
    let travel = |duration: u64| {
        json!({ "type": "pointerMove", "origin": origin.clone(), "x": 0, "y": 0, "duration": duration })
    };
    let down = |button: u8| json!({ "type": "pointerDown", "button": button });
    let up = |button: u8| json!({ "type": "pointerUp", "button": button });

    let steps = match gesture {
        PointerGesture::Click => vec![travel(0), down(0), up(0)],
        PointerGesture::DoubleClick => vec![travel(0), down(0), up(0), down(0), up(0)],
        PointerGesture::ContextClick => vec![travel(0), down(2), up(2)],
        PointerGesture::Hover => vec![travel(100)],
        PointerGesture::MoveThenClick => vec![
            travel(250),
            json!({ "type": "pause", "duration": 100 }),
            down(0),
            up(0),
        ],
    };
    json!({
        "type": "pointer",
        "id": "webpilot-mouse",
        "parameters": { "pointerType": "mouse" },
        "actions": steps,
    })
}

#[async_trait]
impl DocumentDriver for WebDriverSession {
    async fn navigate(&self, url: &str) -> WebPilotResult<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn current_url(&self) -> WebPilotResult<String> {
        let value = self.command(Method::GET, "/url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn title(&self) -> WebPilotResult<String> {
        let value = self.command(Method::GET, "/title", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn ready_state(&self) -> WebPilotResult<String> {
        let value = self.script(scripts::READY_STATE, vec![]).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn wait_for_root(&self, timeout: Duration) -> WebPilotResult<bool> {
        let started = Instant::now();
        loop {
            match self.script(scripts::ROOT_READY, vec![]).await {
                Ok(Value::Bool(true)) => return Ok(true),
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::debug!(error = %e, "document root not reachable yet"),
            }
            if started.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(ROOT_POLL_INTERVAL).await;
        }
    }

    async fn scan_document(&self, request: &ScanRequest<'_>) -> WebPilotResult<DocumentScan> {
        let value = self
            .script(
                scripts::SCAN_DOCUMENT,
                vec![json!(request.generation), json!(request.selectors)],
            )
            .await?;
        serde_json::from_value(value)
            .map_err(|e| WebPilotError::Perception(format!("unreadable scan result: {e}")))
    }

    async fn screenshot(&self) -> WebPilotResult<Vec<u8>> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| WebPilotError::Driver("screenshot payload is not a string".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| WebPilotError::Driver(format!("screenshot decode: {e}")))
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> WebPilotResult<Value> {
        self.script(script, args).await
    }

    async fn execute_on(
        &self,
        handle: &NodeHandle,
        script: &str,
        args: Vec<Value>,
    ) -> WebPilotResult<Value> {
        let id = self.locate(handle).await?;
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(element_ref(&id));
        all.extend(args);
        self.script(script, all).await
    }

    async fn switch_to_frame(&self, index: u16) -> WebPilotResult<()> {
        let frames = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": "iframe" })),
            )
            .await?;
        let frame = frames
            .as_array()
            .and_then(|list| list.get(usize::from(index)))
            .ok_or_else(|| WebPilotError::Driver(format!("no iframe at index {index}")))?;
        let id = element_id(frame)?;
        self.command(Method::POST, "/frame", Some(json!({ "id": element_ref(&id) })))
            .await
            .map(|_| ())
    }

    async fn switch_to_main(&self) -> WebPilotResult<()> {
        self.command(Method::POST, "/frame", Some(json!({ "id": null })))
            .await
            .map(|_| ())
    }

    async fn probe(&self, handle: &NodeHandle) -> WebPilotResult<()> {
        self.locate(handle).await.map(|_| ())
    }

    async fn click(&self, handle: &NodeHandle) -> WebPilotResult<()> {
        let id = self.locate(handle).await?;
        self.command(Method::POST, &format!("/element/{id}/click"), None)
            .await
            .map(|_| ())
    }

    async fn pointer(&self, handle: &NodeHandle, gesture: PointerGesture) -> WebPilotResult<()> {
        let id = self.locate(handle).await?;
        self.perform_actions(pointer_sequence(&id, gesture)).await
    }

    async fn clear(&self, handle: &NodeHandle) -> WebPilotResult<()> {
        let id = self.locate(handle).await?;
        self.command(Method::POST, &format!("/element/{id}/clear"), None)
            .await
            .map(|_| ())
    }

    async fn send_keys(&self, handle: &NodeHandle, text: &str) -> WebPilotResult<()> {
        let id = self.locate(handle).await?;
        self.command(
            Method::POST,
            &format!("/element/{id}/value"),
            Some(json!({ "text": text })),
        )
        .await
        .map(|_| ())
    }

    async fn select_option(&self, handle: &NodeHandle, choice: &str) -> WebPilotResult<()> {
        match self.execute_on(handle, scripts::SELECT_OPTION, vec![json!(choice)]).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(WebPilotError::Execution(format!("no option matching '{choice}'"))),
        }
    }

    async fn text(&self, handle: &NodeHandle) -> WebPilotResult<String> {
        let id = self.locate(handle).await?;
        let value = self
            .command(Method::GET, &format!("/element/{id}/text"), None)
            .await?;
        let text = value.as_str().unwrap_or_default().trim().to_string();
        if !text.is_empty() {
            return Ok(text);
        }
        let fallback = self.execute_on(handle, scripts::TEXT_CONTENT, vec![]).await?;
        Ok(fallback.as_str().unwrap_or_default().to_string())
    }

    async fn is_interactable(&self, handle: &NodeHandle) -> WebPilotResult<bool> {
        let id = self.locate(handle).await?;
        let displayed = self
            .command(Method::GET, &format!("/element/{id}/displayed"), None)
            .await?;
        let enabled = self
            .command(Method::GET, &format!("/element/{id}/enabled"), None)
            .await?;
        Ok(displayed.as_bool().unwrap_or(false) && enabled.as_bool().unwrap_or(false))
    }

    async fn press_key(&self, key: &str) -> WebPilotResult<()> {
        let value = match key_code(key) {
            Some(code) => code.to_string(),
            None if key.chars().count() == 1 => key.to_string(),
            None => return Err(WebPilotError::Execution(format!("unknown key '{key}'"))),
        };
        self.perform_actions(json!({
            "type": "key",
            "id": "webpilot-keyboard",
            "actions": [
                { "type": "keyDown", "value": value },
                { "type": "keyUp", "value": value },
            ],
        }))
        .await
    }

    async fn refresh(&self) -> WebPilotResult<()> {
        self.command(Method::POST, "/refresh", None).await.map(|_| ())
    }

    async fn back(&self) -> WebPilotResult<()> {
        self.command(Method::POST, "/back", None).await.map(|_| ())
    }

    async fn forward(&self) -> WebPilotResult<()> {
        self.command(Method::POST, "/forward", None).await.map(|_| ())
    }

    async fn quit(&self) -> WebPilotResult<()> {
        self.command(Method::DELETE, "", None).await?;
        tracing::info!(session = %self.session_id, "webdriver session closed");
        Ok(())
    }
}
