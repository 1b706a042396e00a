use serde::{Deserialize, Serialize};

/// Matches the backend `Attachment` model (base64 payload, no data-URL prefix).
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub mime_type: String,
    pub data: String,
}

/// Matches the backend `Turn` model.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,
    pub role: String,
    pub text: String,
    pub is_streaming: bool,
    pub timestamp: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Turn {
    pub fn is_user(&self) -> bool {
        self.role == "user"
    }
}

/// Catalog entry for the model picker.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    pub label: String,
    pub description: String,
}

/// Response from `GET /api/status`.
#[derive(Clone, Debug, Deserialize)]
pub struct StatusResponse {
    pub ready: bool,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub accepted_types: Vec<String>,
}

/// A file already read by the browser, waiting to be sent.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct AttachmentUpload {
    pub name: String,
    pub mime_type: String,
    pub data_url: String,
}

/// Commands sent to the server over the chat WebSocket.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Send {
        text: String,
        attachments: Vec<AttachmentUpload>,
    },
    SelectModel {
        model: String,
    },
    NewChat,
}

/// WebSocket event received from the server.
/// Matches the backend `ChatEvent` enum (internally tagged).
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Ready {
        session_id: String,
        model: String,
        models: Vec<ModelInfo>,
    },
    ConfigurationError {
        message: String,
    },
    TranscriptReset {
        session_id: String,
        model: String,
    },
    TurnAppended {
        turn: Turn,
    },
    TurnUpdated {
        id: String,
        text: String,
    },
    TurnFinalized {
        id: String,
    },
    TurnDiscarded {
        id: String,
    },
    Busy {
        busy: bool,
    },
    Notice {
        message: Option<String>,
    },
}
