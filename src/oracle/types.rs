use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub kind: StreamChunkKind,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamChunkKind {
    Reasoning,
    Content,
    Done,
}

/// What the oracle is asked about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub objective: String,
    pub url: String,
    pub feedback: String,
    /// One line per observed element.
    pub elements: Vec<String>,
    pub image_base64: Option<String>,
}

/// Untrusted proposal returned by the oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Decision {
    pub thought: String,
    pub confidence: f64,
    pub reasoning: String,
    pub action: Option<ProposedAction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposedAction {
    pub name: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl Decision {
    /// Shorthand for internally synthesized decisions.
    pub fn action(name: &str, parameters: serde_json::Value) -> Self {
        Self {
            action: Some(ProposedAction {
                name: name.to_string(),
                parameters: match parameters {
                    serde_json::Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                },
            }),
            ..Self::default()
        }
    }

    /// The proposed action, if it names anything at all.
    pub fn proposed(&self) -> Option<&ProposedAction> {
        self.action.as_ref().filter(|a| !a.name.trim().is_empty())
    }
}
