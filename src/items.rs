use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Output text reported for a function call the agent handled.
pub const FUNCTION_SUCCESS: &str = "success";

// ========================= Conversation Items =========================

/// One entry of a Responses-style conversation.
///
/// Serialized with a `type` discriminator. Deserialization goes through
/// [`TryFrom<Value>`] so that role-only input messages (no `type`) are read as
/// messages and unknown item kinds survive verbatim as [`ConversationItem::Other`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", try_from = "Value")]
pub enum ConversationItem {
    Message(Message),
    FunctionCall(FunctionCall),
    FunctionCallOutput(FunctionCallOutput),
    ComputerCall(ComputerCall),
    ComputerCallOutput(ComputerCallOutput),
    #[serde(untagged)]
    Other(Value),
}

impl TryFrom<Value> for ConversationItem {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        let item = match kind.as_deref() {
            Some("message") => Self::Message(serde_json::from_value(value)?),
            None if value.get("role").is_some() => Self::Message(serde_json::from_value(value)?),
            Some("function_call") => Self::FunctionCall(serde_json::from_value(value)?),
            Some("function_call_output") => Self::FunctionCallOutput(serde_json::from_value(value)?),
            Some("computer_call") => Self::ComputerCall(serde_json::from_value(value)?),
            Some("computer_call_output") => Self::ComputerCallOutput(serde_json::from_value(value)?),
            _ => Self::Other(value),
        };
        Ok(item)
    }
}

impl ConversationItem {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::Message(Message::new(Role::User, MessageContent::Text(text.into())))
    }

    pub fn developer_text(text: impl Into<String>) -> Self {
        Self::Message(Message::new(Role::Developer, MessageContent::Text(text.into())))
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Message(Message::new(
            Role::Assistant,
            MessageContent::Blocks(vec![ContentBlock::output_text(text)]),
        ))
    }

    /// Server-assigned item id, if any. Used for per-request deduplication.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Message(m) => m.id.as_deref(),
            Self::FunctionCall(c) => c.id.as_deref(),
            Self::FunctionCallOutput(o) => o.id.as_deref(),
            Self::ComputerCall(c) => c.id.as_deref(),
            Self::ComputerCallOutput(o) => o.id.as_deref(),
            Self::Other(v) => v.get("id").and_then(Value::as_str),
        }
    }

    pub fn is_assistant_message(&self) -> bool {
        matches!(self, Self::Message(m) if m.role == Role::Assistant)
    }

    /// Copy suitable for debug logs: screenshot payloads are replaced by a marker.
    pub fn sanitized(&self) -> Self {
        match self {
            Self::ComputerCallOutput(out) => {
                let mut out = out.clone();
                let ComputerCallOutputContent::InputImage { image_url, .. } = &mut out.output;
                *image_url = "[omitted]".to_string();
                Self::ComputerCallOutput(out)
            }
            other => other.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Developer,
    System,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: MessageContent) -> Self {
        Self { id: None, role, content, status: None }
    }

    /// All text of the message, blocks joined by newlines.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .map(|b| b.text.as_str())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    // annotations, logprobs and friends pass through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentBlock {
    pub fn input_text(text: impl Into<String>) -> Self {
        Self { kind: "input_text".into(), text: text.into(), extra: Map::new() }
    }

    pub fn output_text(text: impl Into<String>) -> Self {
        Self { kind: "output_text".into(), text: text.into(), extra: Map::new() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub call_id: String,
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub call_id: String,
    pub output: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputerCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub call_id: String,
    pub action: ComputerAction,
    #[serde(default)]
    pub pending_safety_checks: Vec<PendingSafetyCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSafetyCheck {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputerCallOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub call_id: String,
    #[serde(default)]
    pub acknowledged_safety_checks: Vec<PendingSafetyCheck>,
    pub output: ComputerCallOutputContent,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComputerCallOutputContent {
    InputImage {
        image_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_url: Option<String>,
    },
}

impl ComputerCallOutputContent {
    pub fn png(screenshot_b64: &str) -> Self {
        Self::InputImage {
            image_url: format!("data:image/png;base64,{screenshot_b64}"),
            current_url: None,
        }
    }
}

// ========================= Computer Actions =========================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Wheel,
    Back,
    Forward,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

/// UI action requested by a computer call, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComputerAction {
    Click {
        x: i64,
        y: i64,
        #[serde(default)]
        button: MouseButton,
    },
    DoubleClick { x: i64, y: i64 },
    Drag { path: Vec<Point> },
    Keypress { keys: Vec<String> },
    Move { x: i64, y: i64 },
    Screenshot,
    Scroll {
        x: i64,
        y: i64,
        scroll_x: i64,
        scroll_y: i64,
    },
    Type { text: String },
    Wait {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ms: Option<u64>,
    },
    /// Any action kind (or malformed action) outside the vocabulary above.
    /// Kept as sent so the rest of the response still decodes.
    #[serde(untagged)]
    Unsupported(Value),
}

impl ComputerAction {
    /// The action's `type` tag.
    pub fn kind(&self) -> &str {
        match self {
            Self::Click { .. } => "click",
            Self::DoubleClick { .. } => "double_click",
            Self::Drag { .. } => "drag",
            Self::Keypress { .. } => "keypress",
            Self::Move { .. } => "move",
            Self::Screenshot => "screenshot",
            Self::Scroll { .. } => "scroll",
            Self::Type { .. } => "type",
            Self::Wait { .. } => "wait",
            Self::Unsupported(raw) => raw.get("type").and_then(Value::as_str).unwrap_or("unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_only_input_reads_as_message() {
        let item: ConversationItem =
            serde_json::from_value(json!({"role": "user", "content": "hello"})).unwrap();
        let ConversationItem::Message(m) = &item else { panic!("expected message, got {item:?}") };
        assert_eq!(m.role, Role::User);
        assert_eq!(m.text(), "hello");
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({"type": "message", "role": "user", "content": "hello"})
        );
    }

    #[test]
    fn computer_call_decodes_action_and_checks() {
        let item: ConversationItem = serde_json::from_value(json!({
            "type": "computer_call",
            "id": "cu_1",
            "call_id": "call_1",
            "status": "completed",
            "action": {"type": "click", "x": 10, "y": 20, "button": "right"},
            "pending_safety_checks": [
                {"id": "sc_1", "code": "malicious_instructions", "message": "careful"}
            ]
        }))
        .unwrap();
        let ConversationItem::ComputerCall(call) = item else { panic!("not a computer call") };
        assert_eq!(call.action, ComputerAction::Click { x: 10, y: 20, button: MouseButton::Right });
        assert_eq!(call.pending_safety_checks.len(), 1);
        assert_eq!(call.pending_safety_checks[0].message, "careful");
    }

    #[test]
    fn unknown_item_kinds_pass_through_verbatim() {
        let raw = json!({"type": "reasoning", "id": "rs_1", "summary": []});
        let item: ConversationItem = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(item.id(), Some("rs_1"));
        assert!(matches!(item, ConversationItem::Other(_)));
        assert_eq!(serde_json::to_value(&item).unwrap(), raw);
    }

    #[test]
    fn unknown_action_kind_decodes_as_unsupported() {
        let raw = json!({"type": "teleport", "to": "mars"});
        let item: ConversationItem = serde_json::from_value(json!({
            "type": "computer_call",
            "call_id": "c",
            "action": raw.clone()
        }))
        .unwrap();
        let ConversationItem::ComputerCall(call) = &item else { panic!("not a computer call") };
        assert_eq!(call.action, ComputerAction::Unsupported(raw.clone()));
        assert_eq!(call.action.kind(), "teleport");
        assert_eq!(serde_json::to_value(&item).unwrap()["action"], raw);
    }

    #[test]
    fn sanitized_hides_screenshot_only() {
        let item = ConversationItem::ComputerCallOutput(ComputerCallOutput {
            id: None,
            call_id: "call_1".into(),
            acknowledged_safety_checks: vec![],
            output: ComputerCallOutputContent::InputImage {
                image_url: "data:image/png;base64,AAAA".into(),
                current_url: Some("https://example.com".into()),
            },
        });
        let v = serde_json::to_value(item.sanitized()).unwrap();
        assert_eq!(v["output"]["image_url"], "[omitted]");
        assert_eq!(v["output"]["current_url"], "https://example.com");
        assert_eq!(v["output"]["type"], "input_image");
        assert_eq!(v["type"], "computer_call_output");
    }

    #[test]
    fn wait_without_params() {
        let a: ComputerAction = serde_json::from_value(json!({"type": "wait"})).unwrap();
        assert_eq!(a, ComputerAction::Wait { ms: None });
        assert_eq!(a.kind(), "wait");
    }
}
