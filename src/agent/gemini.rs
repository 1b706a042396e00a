use std::collections::VecDeque;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, Stream, StreamExt};
use rig::providers::gemini::completion::gemini_api_types::{
    Blob, Content, GenerateContentRequest, GenerationConfig as GeminiGenerationConfig,
    Part as GeminiPart, PartKind, Role as GeminiRole,
};
use serde::Deserialize;
use tracing::{debug, error, warn};

use super::{Fragment, FragmentStream, GenerationBackend, GenerationRequest, HistoryEntry};
use crate::errors::AppError;
use crate::models::{GenerationConfig, OutgoingMessage, Part};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

// ── Request conversion ────────────────────────────────────────────────────────

fn text_part(text: &str) -> GeminiPart {
    GeminiPart { part: PartKind::Text(text.to_string()), ..Default::default() }
}

/// Inline data keeps the attachment's media type verbatim; the API decides what it accepts.
fn to_gemini_part(part: &Part) -> GeminiPart {
    match part {
        Part::Text { text } => text_part(text),
        Part::InlineData { inline_data } => GeminiPart {
            part: PartKind::InlineData(Blob {
                mime_type: inline_data.mime_type.clone(),
                data: inline_data.data.clone(),
            }),
            ..Default::default()
        },
    }
}

fn user_content(message: &OutgoingMessage) -> Content {
    let parts = match message {
        OutgoingMessage::Text(text) => vec![text_part(text)],
        OutgoingMessage::Parts(parts) => parts.iter().map(to_gemini_part).collect(),
    };
    Content { parts, role: Some(GeminiRole::User) }
}

fn history_content(entry: &HistoryEntry) -> Content {
    match entry {
        HistoryEntry::User(message) => user_content(message),
        HistoryEntry::Model(text) => Content {
            parts: vec![text_part(text)],
            role: Some(GeminiRole::Model),
        },
    }
}

fn generation_config(config: &GenerationConfig) -> GeminiGenerationConfig {
    GeminiGenerationConfig {
        temperature: Some(config.temperature),
        top_k: i32::try_from(config.top_k).ok(),
        top_p: Some(config.top_p),
        // Leave the output budget to the model
        max_output_tokens: None,
        ..Default::default()
    }
}

/// Prior turns oldest first, then the new user turn.
fn build_request(request: &GenerationRequest) -> GenerateContentRequest {
    let mut contents: Vec<Content> = request.history.iter().map(history_content).collect();
    contents.push(user_content(&request.message));

    GenerateContentRequest {
        contents,
        tools: None,
        tool_config: None,
        generation_config: Some(generation_config(&request.config)),
        safety_settings: None,
        system_instruction: Some(Content {
            parts: vec![text_part(&request.config.system_instruction)],
            role: None,
        }),
        additional_params: None,
    }
}

// ── Response decoding ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StreamChunk {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ChunkContent>,
}

#[derive(Deserialize)]
struct ChunkContent {
    #[serde(default)]
    parts: Vec<ChunkPart>,
}

#[derive(Deserialize)]
struct ChunkPart {
    text: Option<String>,
    thought: Option<bool>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

/// Human-readable message from a Gemini error body, or the body itself.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let message = wrapper.error.message.unwrap_or_else(|| body.to_string());
            match wrapper.error.status.filter(|s| !s.is_empty()) {
                Some(status) => format!("{status}: {message}"),
                None => message,
            }
        })
        .unwrap_or_else(|_| body.to_string())
}

/// One SSE `data:` payload as a fragment. Thought parts are not reply text.
fn decode_data(data: &str) -> Option<Result<Fragment, AppError>> {
    if serde_json::from_str::<ErrorWrapper>(data).is_ok() {
        return Some(Err(AppError::transport(error_message(data))));
    }
    let chunk = match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!("Skipping unparsable stream chunk: {e}");
            return None;
        }
    };

    let deltas = chunk
        .candidates
        .into_iter()
        .flatten()
        .take(1)
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter(|part| part.thought != Some(true))
        .filter_map(|part| part.text)
        .collect();
    Some(Ok(Fragment::new(deltas)))
}

/// Splits a server-sent event body into lines; bytes are buffered until a newline so
/// multi-byte characters split across chunks survive.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<Result<Fragment, AppError>> {
        self.buffer.extend_from_slice(chunk);
        let mut decoded = Vec::new();
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            decoded.extend(Self::decode_line(&line));
        }
        decoded
    }

    fn finish(&mut self) -> Vec<Result<Fragment, AppError>> {
        let rest = std::mem::take(&mut self.buffer);
        Self::decode_line(&rest).into_iter().collect()
    }

    fn decode_line(line: &[u8]) -> Option<Result<Fragment, AppError>> {
        let line = String::from_utf8_lossy(line);
        let data = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?.trim();
        if data.is_empty() {
            return None;
        }
        decode_data(data)
    }
}

/// Turns a raw response body into fragments. The first error ends the stream.
fn decode_events<S, B, E>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let ready: VecDeque<Result<Fragment, AppError>> = VecDeque::new();
    let state = (body.boxed(), SseDecoder::default(), ready, false);
    stream::unfold(state, |(mut body, mut decoder, mut ready, mut finished)| async move {
        loop {
            if let Some(item) = ready.pop_front() {
                if item.is_err() {
                    ready.clear();
                    finished = true;
                }
                return Some((item, (body, decoder, ready, finished)));
            }
            if finished {
                return None;
            }
            match body.next().await {
                Some(Ok(chunk)) => ready.extend(decoder.push(chunk.as_ref())),
                Some(Err(e)) => {
                    error!("Gemini stream aborted: {e}");
                    ready.push_back(Err(AppError::transport(e)));
                }
                None => {
                    ready.extend(decoder.finish());
                    finished = true;
                }
            }
        }
    })
    .boxed()
}

// ── Backend ───────────────────────────────────────────────────────────────────

/// [`GenerationBackend`] that calls Gemini's `streamGenerateContent` endpoint directly.
#[derive(Clone)]
pub struct GeminiBackend {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(api_key: &str, base_url: Option<&str>) -> Result<Self, AppError> {
        let http = reqwest::Client::builder().build().map_err(|e| {
            error!("Failed to build Gemini client: {e}");
            AppError::ClientBuild { message: e.to_string() }
        })?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
        })
    }

    fn stream_url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:streamGenerateContent?alt=sse", self.base_url)
    }
}

impl GenerationBackend for GeminiBackend {
    fn open_stream(&self, request: GenerationRequest) -> BoxFuture<'static, Result<FragmentStream, AppError>> {
        let http = self.http.clone();
        let api_key = self.api_key.clone();
        let url = self.stream_url(request.model.as_str());
        Box::pin(async move {
            let body = build_request(&request);
            debug!(
                model = %request.model,
                history_len = request.history.len(),
                "opening Gemini stream"
            );

            let response = http
                .post(url)
                .header("x-goog-api-key", api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    error!("Gemini request failed for model {}: {e}", request.model);
                    AppError::transport(e)
                })?;

            let status = response.status();
            if !status.is_success() {
                let text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| format!("Gemini API returned {status}"));
                let message = error_message(&text);
                error!("Gemini stream failed to open for model {}: {status} {message}", request.model);
                return Err(AppError::transport(message));
            }

            Ok(decode_events(response.bytes_stream()))
        })
    }
}
