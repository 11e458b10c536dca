use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::config::ProviderEntry;
use crate::errors::{WebPilotError, WebPilotResult};
use crate::oracle::prompt;
use crate::oracle::provider::DecisionOracle;
use crate::oracle::sse_parser;
use crate::oracle::types::{Decision, DecisionRequest, StreamChunkKind};

pub struct OpenAiCompatibleOracle {
    id: String,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    stream: bool,
    stream_timeout: Duration,
    request_timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatibleOracle {
    pub fn new(id: String, entry: &ProviderEntry, api_key: String) -> Self {
        Self {
            id,
            api_base: entry.api_base.clone(),
            api_key,
            model: entry.model.clone(),
            temperature: entry.temperature,
            max_tokens: entry.max_tokens,
            stream: entry.stream,
            stream_timeout: Duration::from_secs(entry.stream_timeout_secs),
            request_timeout: Duration::from_secs(entry.request_timeout_secs),
            client: reqwest::Client::new(),
        }
    }

    fn body(&self, request: &DecisionRequest, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": prompt::build_messages(request),
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
            "stream": stream,
        })
    }

    async fn send(&self, body: &serde_json::Value, timeout: Duration) -> WebPilotResult<reqwest::Response> {
        tracing::debug!(body = %sanitized(body), "oracle request body (base64 omitted)");
        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(WebPilotError::Oracle(format!("{status}: {err_body}")));
        }
        Ok(response)
    }

    /// Assemble the SSE stream into one reply and parse it.
    async fn decide_streaming(&self, request: &DecisionRequest) -> WebPilotResult<Decision> {
        let response = self.send(&self.body(request, true), self.stream_timeout).await?;
        let mut byte_stream = response.bytes_stream();
        let mut line_buf = String::new();
        let mut content = String::new();
        let mut reasoning = String::new();

        'stream: while let Some(result) = byte_stream.next().await {
            let bytes = result?;
            line_buf.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = line_buf.find('\n') {
                let line = line_buf[..pos].trim().to_string();
                line_buf.drain(..=pos);
                if line.is_empty() {
                    continue;
                }
                if let Some(chunk) = sse_parser::parse_sse_line(&line)? {
                    match chunk.kind {
                        StreamChunkKind::Content => content.push_str(&chunk.content),
                        StreamChunkKind::Reasoning => reasoning.push_str(&chunk.content),
                        StreamChunkKind::Done => break 'stream,
                    }
                }
            }
        }

        tracing::info!(
            provider = %self.id,
            content_len = content.len(),
            reasoning_len = reasoning.len(),
            "oracle stream complete"
        );
        if content.trim().is_empty() {
            return Err(WebPilotError::Oracle("streamed reply was empty".into()));
        }
        prompt::parse_decision(&content)
    }

    async fn decide_plain(&self, request: &DecisionRequest) -> WebPilotResult<Decision> {
        let response = self.send(&self.body(request, false), self.request_timeout).await?;
        let json: serde_json::Value = response.json().await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();
        tracing::info!(provider = %self.id, content_len = content.len(), "oracle JSON response received");
        prompt::parse_decision(content)
    }
}

#[async_trait]
impl DecisionOracle for OpenAiCompatibleOracle {
    fn name(&self) -> &str {
        &self.id
    }

    async fn decide(&self, request: &DecisionRequest) -> WebPilotResult<Decision> {
        tracing::debug!(provider = %self.id, model = %self.model, stream = self.stream, "requesting decision");
        let first = if self.stream {
            self.decide_streaming(request).await
        } else {
            self.decide_plain(request).await
        };
        match first.and_then(actionable) {
            Ok(decision) => Ok(decision),
            Err(e) => {
                tracing::warn!(provider = %self.id, error = %e, "decision unusable; retrying once without streaming");
                self.decide_plain(request).await.and_then(actionable)
            }
        }
    }
}

/// A reply without an action name is malformed.
fn actionable(decision: Decision) -> WebPilotResult<Decision> {
    if decision.proposed().is_none() {
        return Err(WebPilotError::Oracle("decision names no action".into()));
    }
    Ok(decision)
}

/// Copy of the body with image payloads replaced, for logging only.
fn sanitized(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                    part["image_url"]["url"] = serde_json::Value::String("<omitted_base64_image>".into());
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}
