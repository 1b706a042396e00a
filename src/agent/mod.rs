mod gemini;
#[cfg(test)]
pub mod scripted;

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;

use crate::errors::AppError;
use crate::models::{GeminiModel, GenerationConfig, OutgoingMessage};

pub use gemini::GeminiBackend;

/// One incremental piece of a streamed reply: zero or more decoded text deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    deltas: Vec<String>,
}

impl Fragment {
    pub fn new(deltas: Vec<String>) -> Self {
        Self { deltas }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// All deltas joined, or an empty string for a fragment with no text.
    pub fn text(&self) -> String {
        self.deltas.concat()
    }
}

/// Forward-only, single-consumer reply stream. An `Err` item is terminal.
pub type FragmentStream = BoxStream<'static, Result<Fragment, AppError>>;

/// Prior context replayed to the remote API on every send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEntry {
    User(OutgoingMessage),
    Model(String),
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: GeminiModel,
    pub config: GenerationConfig,
    pub history: Vec<HistoryEntry>,
    pub message: OutgoingMessage,
}

/// The remote generation API as seen by a session: open a stream for one user turn.
pub trait GenerationBackend: Send + Sync {
    fn open_stream(&self, request: GenerationRequest) -> BoxFuture<'static, Result<FragmentStream, AppError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_text_concatenates_deltas() {
        assert_eq!(Fragment::new(vec!["Hi".into(), " there".into()]).text(), "Hi there");
        assert_eq!(Fragment::empty().text(), "");
    }
}
