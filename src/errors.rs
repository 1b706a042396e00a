use thiserror::Error;

/// Top-level application error.
/// Every variant renders a human-readable message that can be shown to the user as-is.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Configuration errors ─────────────────────────────────────────────────
    #[error("API key is missing. Set {var} in the environment or in a .env file.")]
    MissingCredential { var: String },

    #[error("Invalid configuration for {key}: {message}")]
    InvalidConfig { key: String, message: String },

    #[error("Failed to build the Gemini client: {message}")]
    ClientBuild { message: String },

    // ── Attachment encoding errors ───────────────────────────────────────────
    #[error("Failed to read attachment '{name}': {source}")]
    AttachmentRead {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Attachment '{name}' could not be encoded: {message}")]
    MalformedAttachment { name: String, message: String },

    // ── Submission errors ────────────────────────────────────────────────────
    #[error("Cannot send an empty message without attachments")]
    EmptySubmission,

    #[error("A reply is still being generated; wait for it to finish")]
    Busy,

    #[error("Unknown model '{model}'")]
    UnknownModel { model: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    // ── Remote generation errors ─────────────────────────────────────────────
    #[error("{message}")]
    Transport { message: String },
}

impl AppError {
    pub fn transport(message: impl std::fmt::Display) -> Self {
        let message = message.to_string();
        if message.trim().is_empty() {
            AppError::Transport {
                message: "An error occurred while generating the response.".to_string(),
            }
        } else {
            AppError::Transport { message }
        }
    }

    pub fn malformed(name: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::MalformedAttachment { name: name.into(), message: message.into() }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::MissingCredential { .. }
                | AppError::InvalidConfig { .. }
                | AppError::ClientBuild { .. }
        )
    }

    pub fn is_encoding(&self) -> bool {
        matches!(self, AppError::AttachmentRead { .. } | AppError::MalformedAttachment { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::EmptySubmission
                | AppError::Busy
                | AppError::UnknownModel { .. }
                | AppError::InvalidRequest { .. }
        )
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, AppError::Transport { .. })
    }

    /// Short label attached to log records.
    pub fn category(&self) -> &'static str {
        if self.is_configuration() {
            "configuration"
        } else if self.is_encoding() {
            "encoding"
        } else if self.is_validation() {
            "validation"
        } else {
            "transport"
        }
    }

    /// Text shown inline in the transcript area when this error reaches the user.
    pub fn notice(&self) -> String {
        self.to_string()
    }
}
