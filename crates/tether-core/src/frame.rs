use serde::Deserialize;
use serde_json::Value;

use super::state::Content;
use super::state::ConversationId;
use super::state::MessageId;
use super::state::MessageRecord;
use super::state::Role;
use super::state::TurnStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reload,
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    ApprovalResponseProcessed(MessageId),
    ToolStart(String),
    ToolSuccess(String),
    ToolError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Command {
        command: Command,
        conversation_id: Option<ConversationId>,
    },
    Alert {
        message: String,
        severity: Option<String>,
    },
    Status {
        conversation_id: Option<ConversationId>,
        update: StatusUpdate,
    },
    ChatTurn {
        conversation_id: ConversationId,
        status: TurnStatus,
        message: MessageRecord,
    },
    PlainMessage {
        conversation_id: ConversationId,
        message: MessageRecord,
    },
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub xray: Option<Value>,
    pub frame: Frame,
}

#[derive(Debug, Deserialize)]
struct WireFrame {
    #[serde(default)]
    xray: Option<Value>,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    conversation_id: Option<ConversationId>,
    #[serde(default)]
    id: Option<MessageId>,
    #[serde(default)]
    content: Option<Content>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    is_archived: Option<bool>,
}

/// Decodes one inbound text frame. Returns `None` for text that is not a
/// non-empty JSON object; callers drop those without surfacing anything.
pub fn decode_frame(text: &str) -> Option<DecodedFrame> {
    let value: Value = serde_json::from_str(text).ok()?;
    match &value {
        Value::Object(fields) if !fields.is_empty() => {}
        _ => return None,
    }
    let wire: WireFrame = serde_json::from_value(value).ok()?;
    let xray = wire.xray.clone().filter(|xray| !xray.is_null());
    Some(DecodedFrame {
        xray,
        frame: classify(wire),
    })
}

fn classify(wire: WireFrame) -> Frame {
    match wire.role {
        Some(Role::Command) => {
            let command = match wire.content.as_ref().and_then(Content::text) {
                Some("reload") => Command::Reload,
                Some(other) => Command::Other(other.to_string()),
                None => Command::Other(String::new()),
            };
            Frame::Command {
                command,
                conversation_id: wire.conversation_id,
            }
        }
        Some(Role::Alert) => Frame::Alert {
            message: wire
                .content
                .as_ref()
                .and_then(Content::text)
                .unwrap_or_default()
                .to_string(),
            severity: wire.kind,
        },
        Some(Role::Status) => match wire.content.as_ref().and_then(status_update) {
            Some(update) => Frame::Status {
                conversation_id: wire.conversation_id,
                update,
            },
            None => Frame::Unknown,
        },
        role => {
            let Some(conversation_id) = wire.conversation_id else {
                return Frame::Unknown;
            };
            let status = turn_status(wire.status.as_ref());
            let message = MessageRecord {
                id: wire.id,
                conversation_id: Some(conversation_id),
                role: role.unwrap_or(Role::Assistant),
                status,
                content: wire.content.unwrap_or_default(),
                is_archived: wire.is_archived,
            };
            match status {
                Some(status) => Frame::ChatTurn {
                    conversation_id,
                    status,
                    message,
                },
                None => Frame::PlainMessage {
                    conversation_id,
                    message,
                },
            }
        }
    }
}

fn turn_status(status: Option<&Value>) -> Option<TurnStatus> {
    match status.and_then(Value::as_str) {
        Some("incomplete") => Some(TurnStatus::Incomplete),
        Some("complete") => Some(TurnStatus::Complete),
        _ => None,
    }
}

fn status_update(content: &Content) -> Option<StatusUpdate> {
    if let Some(id) = content.field("approval_response_processed") {
        let id: MessageId = serde_json::from_value(id.clone()).ok()?;
        return Some(StatusUpdate::ApprovalResponseProcessed(id));
    }
    let text = |key: &str| {
        content
            .field(key)
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
    };
    if let Some(text) = text("tool_start") {
        return Some(StatusUpdate::ToolStart(text));
    }
    if let Some(text) = text("tool_success") {
        return Some(StatusUpdate::ToolSuccess(text));
    }
    text("tool_error").map(StatusUpdate::ToolError)
}
