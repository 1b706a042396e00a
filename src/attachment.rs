//! Turns user files into transport-safe [`Attachment`]s (base64 payload + media type).

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use futures_util::future::try_join_all;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::models::{Attachment, AttachmentUpload};

const FALLBACK_MIME: &str = "application/octet-stream";

/// Media types the file picker offers. Advisory only; nothing downstream enforces it.
pub const ACCEPTED_TYPES: [&str; 3] = ["image/*", "application/pdf", "text/plain"];

/// Where the bytes of an attachment come from. The WebSocket surface only ever
/// produces `DataUrl`; `Bytes` and `File` serve library callers outside the browser.
#[derive(Debug, Clone)]
pub enum AttachmentSource {
    /// A browser `FileReader` result such as `data:image/png;base64,iVBOR...`.
    DataUrl {
        name: String,
        mime_type: String,
        url: String,
    },
    /// Raw bytes already in memory.
    Bytes {
        name: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
    /// A file on the server's disk, read asynchronously.
    File {
        path: PathBuf,
        mime_type: Option<String>,
    },
}

impl AttachmentSource {
    pub fn name(&self) -> String {
        match self {
            AttachmentSource::DataUrl { name, .. } | AttachmentSource::Bytes { name, .. } => {
                name.clone()
            }
            AttachmentSource::File { path, .. } => path.display().to_string(),
        }
    }
}

impl From<AttachmentUpload> for AttachmentSource {
    fn from(upload: AttachmentUpload) -> Self {
        AttachmentSource::DataUrl {
            name: upload.name,
            mime_type: upload.mime_type,
            url: upload.data_url,
        }
    }
}

/// Encodes a single source. Fails with an encoding error on I/O faults or malformed payloads.
pub async fn encode(source: AttachmentSource) -> Result<Attachment, AppError> {
    let name = source.name();
    let attachment = match source {
        AttachmentSource::DataUrl { name, mime_type, url } => {
            let (url_mime, payload) = split_data_url(&url)
                .ok_or_else(|| AppError::malformed(&name, "not a base64 data URL"))?;
            // Validate without keeping the decoded bytes around.
            BASE64_STANDARD
                .decode(payload)
                .map_err(|e| AppError::malformed(&name, e.to_string()))?;
            let mime = resolve_mime(&mime_type, Some(url_mime), &name);
            Attachment::new(mime, payload)
        }
        AttachmentSource::Bytes { name, mime_type, bytes } => {
            let mime = resolve_mime(&mime_type, None, &name);
            Attachment::new(mime, BASE64_STANDARD.encode(bytes))
        }
        AttachmentSource::File { path, mime_type } => {
            let bytes = tokio::fs::read(&path).await.map_err(|source| {
                warn!("Failed to read attachment {}: {source}", path.display());
                AppError::AttachmentRead { name: name.clone(), source }
            })?;
            let mime = resolve_mime(mime_type.as_deref().unwrap_or_default(), None, &name);
            Attachment::new(mime, BASE64_STANDARD.encode(bytes))
        }
    };

    if !is_accepted_type(&attachment.mime_type) {
        debug!(attachment = %name, mime_type = %attachment.mime_type, "attachment type outside the picker's list");
    }
    debug!(
        attachment = %name,
        mime_type = %attachment.mime_type,
        encoded_len = attachment.data.len(),
        "attachment encoded"
    );
    Ok(attachment)
}

/// Encodes every source concurrently. Output order matches input order; the first failure wins.
pub async fn encode_all(sources: Vec<AttachmentSource>) -> Result<Vec<Attachment>, AppError> {
    try_join_all(sources.into_iter().map(encode)).await
}

/// Splits `data:<mime>;base64,<payload>` into its media type and payload.
pub fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.trim().strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    Some((mime, payload))
}

/// Whether the picker would advertise this media type.
pub fn is_accepted_type(mime_type: &str) -> bool {
    ACCEPTED_TYPES.iter().any(|accepted| match accepted.strip_suffix("/*") {
        Some(prefix) => mime_type
            .split_once('/')
            .is_some_and(|(top, _)| top.eq_ignore_ascii_case(prefix)),
        None => mime_type.eq_ignore_ascii_case(accepted),
    })
}

fn resolve_mime(declared: &str, from_url: Option<&str>, name: &str) -> String {
    if !declared.trim().is_empty() {
        return declared.trim().to_string();
    }
    if let Some(mime) = from_url.filter(|m| !m.trim().is_empty()) {
        return mime.trim().to_string();
    }
    mime_guess::from_path(name)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}
