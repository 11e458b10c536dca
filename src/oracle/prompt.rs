use crate::errors::{WebPilotError, WebPilotResult};
use crate::oracle::types::{ChatMessage, ContentPart, Decision, DecisionRequest, ImageUrl};

const ACTIONS: &str = "\
- NAVIGATE {\"url\": \"https://...\"}
- CLICK {\"id\": <element id>}
- DOUBLE_CLICK {\"id\": <element id>}
- RIGHT_CLICK {\"id\": <element id>}
- TYPE {\"id\": <element id, optional>, \"text\": \"...\"}
- HOVER {\"id\": <element id>}
- CLEAR {\"id\": <element id>}
- SELECT {\"id\": <element id>, \"option\": \"visible text, value or index\"}
- GET_TEXT {\"id\": <element id>}
- SCROLL {\"direction\": \"up|down|left|right\", \"pixels\": 500}
- WAIT {\"seconds\": 2}
- PRESS_KEY {\"key\": \"Enter|Tab|Escape|...\"}
- TAKE_SCREENSHOT {}
- EXECUTE_JS {\"script\": \"...\"}
- REFRESH {}
- GO_BACK {}
- GO_FORWARD {}
- ANSWER {\"text\": \"final answer for the operator\"}";

const RESPONSE_FORMAT: &str = r#"{
  "thought": "what you see and what should happen next",
  "confidence": 0.0,
  "reasoning": "why this action moves toward the objective",
  "action": {"name": "CLICK", "parameters": {"id": 3}}
}"#;

pub fn system_prompt(request: &DecisionRequest) -> String {
    let elements = if request.elements.is_empty() {
        "No interactive elements are currently visible.".to_string()
    } else {
        request.elements.join("\n")
    };
    format!(
        "You are WebPilot, an agent operating a web browser to complete an objective.\n\
         The screenshot shows the current viewport; numbered boxes mark the elements listed below.\n\
         Only use element ids from this list. Use ANSWER once the objective is complete.\n\n\
         OBJECTIVE: {objective}\n\
         CURRENT URL: {url}\n\
         PREVIOUS RESULT: {feedback}\n\n\
         ELEMENTS:\n{elements}\n\n\
         ACTIONS:\n{ACTIONS}\n\n\
         Respond with a single JSON object in exactly this format:\n{RESPONSE_FORMAT}",
        objective = request.objective,
        url = request.url,
        feedback = request.feedback,
    )
}

pub fn build_messages(request: &DecisionRequest) -> Vec<ChatMessage> {
    let mut parts = vec![ContentPart::Text {
        text: "Here is the current page. Choose the next action.".into(),
    }];
    if let Some(image) = &request.image_base64 {
        parts.push(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:image/png;base64,{image}"),
            },
        });
    }
    vec![ChatMessage::system(system_prompt(request)), ChatMessage::user(parts)]
}

/// Parse the decision object out of a model reply, tolerating code fences
/// and surrounding prose.
pub fn parse_decision(content: &str) -> WebPilotResult<Decision> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &content[s..=e],
        _ => {
            return Err(WebPilotError::Oracle(format!(
                "no JSON object in reply: {}",
                content.chars().take(120).collect::<String>()
            )))
        }
    };
    serde_json::from_str(json).map_err(|e| WebPilotError::Oracle(format!("malformed decision: {e}")))
}
