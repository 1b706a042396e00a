use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

pub type TurnId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transport-encoded file: base64 payload without any `data:` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub mime_type: String,
    pub data: String,
}

impl Attachment {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self { mime_type: mime_type.into(), data: data.into() }
    }
}

/// One message in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: TurnId,
    pub role: Role,
    pub text: String,
    pub is_streaming: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Turn {
    pub fn user(text: String, attachments: Vec<Attachment>) -> Self {
        Self {
            id: next_turn_id(),
            role: Role::User,
            text,
            is_streaming: false,
            timestamp: Utc::now(),
            attachments,
        }
    }

    /// An empty model turn awaiting its first fragment.
    pub fn placeholder() -> Self {
        Self {
            id: next_turn_id(),
            role: Role::Model,
            text: String::new(),
            is_streaming: true,
            timestamp: Utc::now(),
            attachments: Vec::new(),
        }
    }
}

/// UUIDv7 ids sort by creation time and never collide within a process.
fn next_turn_id() -> TurnId {
    uuid::Uuid::now_v7().to_string()
}

// ── Model catalog ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeminiModel {
    #[default]
    #[serde(rename = "gemini-2.5-flash")]
    Flash,
    #[serde(rename = "gemini-3-pro-preview")]
    Pro,
    #[serde(rename = "gemini-2.5-flash-thinking-preview-0121")]
    FlashThinking,
}

impl GeminiModel {
    pub const ALL: [GeminiModel; 3] = [GeminiModel::Flash, GeminiModel::Pro, GeminiModel::FlashThinking];

    pub fn as_str(&self) -> &'static str {
        match self {
            GeminiModel::Flash => "gemini-2.5-flash",
            GeminiModel::Pro => "gemini-3-pro-preview",
            GeminiModel::FlashThinking => "gemini-2.5-flash-thinking-preview-0121",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GeminiModel::Flash => "Gemini 2.5 Flash",
            GeminiModel::Pro => "Gemini 3 Pro",
            GeminiModel::FlashThinking => "Gemini Flash Thinking",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            GeminiModel::Flash => "Fast, efficient, low latency",
            GeminiModel::Pro => "Reasoning, coding, complex tasks",
            GeminiModel::FlashThinking => "Analytical, careful reasoning",
        }
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            id: *self,
            label: self.label().to_string(),
            description: self.description().to_string(),
        }
    }

    pub fn catalog() -> Vec<ModelInfo> {
        Self::ALL.iter().map(GeminiModel::info).collect()
    }
}

impl std::fmt::Display for GeminiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GeminiModel {
    type Err = AppError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| AppError::UnknownModel { model: s.to_string() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub id: GeminiModel,
    pub label: String,
    pub description: String,
}

// ── Generation config ─────────────────────────────────────────────────────────

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_K: u32 = 40;
pub const DEFAULT_TOP_P: f64 = 0.95;
pub const SYSTEM_INSTRUCTION: &str = "You are a helpful, intelligent, and precise AI assistant. \
                                      You use Markdown to format your responses effectively.";

/// Behavioral configuration fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub system_instruction: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_k: DEFAULT_TOP_K,
            top_p: DEFAULT_TOP_P,
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

// ── Outgoing turn shape ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Part {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Attachment,
    },
    Text {
        text: String,
    },
}

/// What actually goes over the wire for one user turn: plain text when there are
/// no attachments, otherwise an ordered part list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    Text(String),
    Parts(Vec<Part>),
}

// ── WebSocket protocol ────────────────────────────────────────────────────────

/// A file as read by the browser: a `data:` URL plus the picker's declared type.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentUpload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    pub data_url: String,
}

/// Commands sent by the browser over `/ws/chat`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Send {
        #[serde(default)]
        text: String,
        #[serde(default)]
        attachments: Vec<AttachmentUpload>,
    },
    SelectModel {
        model: String,
    },
    NewChat,
}

/// Events pushed to the browser. The frontend applies them verbatim to its transcript mirror.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Ready {
        session_id: String,
        model: GeminiModel,
        models: Vec<ModelInfo>,
    },
    ConfigurationError {
        message: String,
    },
    TranscriptReset {
        session_id: String,
        model: GeminiModel,
    },
    TurnAppended {
        turn: Turn,
    },
    TurnUpdated {
        id: TurnId,
        text: String,
    },
    TurnFinalized {
        id: TurnId,
    },
    TurnDiscarded {
        id: TurnId,
    },
    Busy {
        busy: bool,
    },
    Notice {
        message: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parts_serialize_in_remote_api_shape() {
        let parts = vec![
            Part::InlineData { inline_data: Attachment::new("image/png", "iVBORw0KGgo=") },
            Part::Text { text: "describe this".into() },
        ];
        assert_eq!(
            serde_json::to_value(&parts).unwrap(),
            json!([
                { "inlineData": { "mimeType": "image/png", "data": "iVBORw0KGgo=" } },
                { "text": "describe this" }
            ])
        );
        assert_eq!(
            serde_json::to_value(OutgoingMessage::Text("Hello".into())).unwrap(),
            json!("Hello")
        );
    }

    #[test]
    fn model_ids_round_trip_through_catalog() {
        assert_eq!("gemini-3-pro-preview".parse::<GeminiModel>().unwrap(), GeminiModel::Pro);
        assert!("gpt-4o".parse::<GeminiModel>().unwrap_err().is_validation());
        assert_eq!(GeminiModel::default(), GeminiModel::Flash);
        assert_eq!(
            serde_json::to_value(GeminiModel::FlashThinking).unwrap(),
            json!("gemini-2.5-flash-thinking-preview-0121")
        );
    }

    #[test]
    fn client_commands_parse_from_tagged_json() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type":"send","text":"","attachments":[{"name":"a.png","mime_type":"image/png","data_url":"data:image/png;base64,AAAA"}]}"#,
        )
        .unwrap();
        match cmd {
            ClientCommand::Send { text, attachments } => {
                assert!(text.is_empty());
                assert_eq!(attachments.len(), 1);
                assert_eq!(attachments[0].mime_type, "image/png");
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cmd: ClientCommand = serde_json::from_str(r#"{"type":"new_chat"}"#).unwrap();
        assert!(matches!(cmd, ClientCommand::NewChat));
    }

    #[test]
    fn placeholder_starts_empty_and_streaming() {
        let turn = Turn::placeholder();
        assert_eq!(turn.role, Role::Model);
        assert!(turn.text.is_empty());
        assert!(turn.is_streaming);
        assert!(turn.attachments.is_empty());

        let value = serde_json::to_value(ChatEvent::TurnAppended { turn }).unwrap();
        assert_eq!(value["type"], "turn_appended");
        assert_eq!(value["turn"]["isStreaming"], true);
        assert_eq!(value["turn"]["role"], "model");
    }

    #[test]
    fn turn_ids_do_not_collide() {
        let ids: std::collections::HashSet<_> =
            (0..500).map(|_| Turn::placeholder().id).collect();
        assert_eq!(ids.len(), 500);
    }
}
