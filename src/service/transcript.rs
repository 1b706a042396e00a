use tracing::{debug, warn};

use crate::agent::Fragment;
use crate::errors::AppError;
use crate::models::{Attachment, Turn, TurnId};

/// Ordered conversation turns; insertion order is display order.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id == id)
    }

    /// The reply currently in flight, if any. At most one exists.
    pub fn streaming_turn(&self) -> Option<&Turn> {
        self.turns.iter().find(|t| t.is_streaming)
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn push_user(&mut self, text: String, attachments: Vec<Attachment>) -> &Turn {
        self.push(Turn::user(text, attachments))
    }

    fn push(&mut self, turn: Turn) -> &Turn {
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Turn> {
        self.turns.iter_mut().find(|t| t.id == id)
    }

    fn remove(&mut self, id: &str) -> Option<Turn> {
        let index = self.turns.iter().position(|t| t.id == id)?;
        Some(self.turns.remove(index))
    }
}

/// Lifecycle of one model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyPhase {
    Pending,
    Streaming,
    Finalized,
    Discarded,
}

/// Sole writer of one placeholder turn: grows its text fragment by fragment, then
/// finalizes it or removes it.
#[derive(Debug)]
pub struct ReplyReconciler {
    turn_id: TurnId,
    accumulated: String,
    phase: ReplyPhase,
}

impl ReplyReconciler {
    /// Appends an empty streaming placeholder. Refuses if another reply is still streaming.
    pub fn open(transcript: &mut Transcript) -> Result<(Self, Turn), AppError> {
        if let Some(existing) = transcript.streaming_turn() {
            warn!(turn_id = %existing.id, "refusing a second in-flight reply");
            return Err(AppError::Busy);
        }
        let turn = transcript.push(Turn::placeholder()).clone();
        Ok((
            Self {
                turn_id: turn.id.clone(),
                accumulated: String::new(),
                phase: ReplyPhase::Pending,
            },
            turn,
        ))
    }

    pub fn turn_id(&self) -> &str {
        &self.turn_id
    }

    pub fn phase(&self) -> ReplyPhase {
        self.phase
    }

    pub fn text(&self) -> &str {
        &self.accumulated
    }

    /// Applies one fragment. Returns the turn's new full text when it changed; `None` for
    /// empty fragments, terminal replies, or a placeholder that no longer exists.
    pub fn apply(&mut self, transcript: &mut Transcript, fragment: &Fragment) -> Option<String> {
        if matches!(self.phase, ReplyPhase::Finalized | ReplyPhase::Discarded) {
            return None;
        }
        let delta = fragment.text();
        if delta.is_empty() {
            return None;
        }
        let Some(turn) = transcript.get_mut(&self.turn_id) else {
            debug!(turn_id = %self.turn_id, "placeholder gone; ignoring fragment");
            return None;
        };

        self.accumulated.push_str(&delta);
        self.phase = ReplyPhase::Streaming;
        turn.text = self.accumulated.clone();
        Some(turn.text.clone())
    }

    /// Stream ended cleanly: stop streaming, keep the accumulated text.
    pub fn finalize(&mut self, transcript: &mut Transcript) -> bool {
        if matches!(self.phase, ReplyPhase::Finalized | ReplyPhase::Discarded) {
            return false;
        }
        self.phase = ReplyPhase::Finalized;
        match transcript.get_mut(&self.turn_id) {
            Some(turn) => {
                turn.text = self.accumulated.clone();
                turn.is_streaming = false;
                true
            }
            None => false,
        }
    }

    /// Stream failed: remove the placeholder entirely, partial text included.
    pub fn discard(&mut self, transcript: &mut Transcript) -> bool {
        if matches!(self.phase, ReplyPhase::Finalized | ReplyPhase::Discarded) {
            return false;
        }
        self.phase = ReplyPhase::Discarded;
        transcript.remove(&self.turn_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn frag(s: &str) -> Fragment {
        Fragment::new(vec![s.to_string()])
    }

    fn streaming_count(t: &Transcript) -> usize {
        t.turns().iter().filter(|t| t.is_streaming).count()
    }

    #[test]
    fn text_is_running_concatenation() {
        let mut transcript = Transcript::new();
        transcript.push_user("Hello".into(), vec![]);
        let (mut reply, turn) = ReplyReconciler::open(&mut transcript).unwrap();
        assert_eq!(turn.role, Role::Model);
        assert_eq!(reply.phase(), ReplyPhase::Pending);

        assert_eq!(reply.apply(&mut transcript, &frag("Hi")), Some("Hi".into()));
        assert_eq!(reply.phase(), ReplyPhase::Streaming);
        assert_eq!(reply.apply(&mut transcript, &Fragment::empty()), None);
        assert_eq!(reply.apply(&mut transcript, &frag(" there")), Some("Hi there".into()));

        assert!(reply.finalize(&mut transcript));
        let turn = transcript.get(reply.turn_id()).unwrap();
        assert_eq!(turn.text, "Hi there");
        assert!(!turn.is_streaming);
        assert_eq!(reply.phase(), ReplyPhase::Finalized);
    }

    #[test]
    fn multi_delta_fragment_is_one_update() {
        let mut transcript = Transcript::new();
        let (mut reply, _) = ReplyReconciler::open(&mut transcript).unwrap();
        let update = reply.apply(&mut transcript, &Fragment::new(vec!["a".into(), "".into(), "b".into()]));
        assert_eq!(update, Some("ab".into()));
        assert_eq!(reply.text(), "ab");
    }

    #[test]
    fn discard_removes_partial_reply_but_keeps_user_turn() {
        let mut transcript = Transcript::new();
        transcript.push_user("describe this".into(), vec![]);
        let (mut reply, _) = ReplyReconciler::open(&mut transcript).unwrap();
        reply.apply(&mut transcript, &frag("Par"));

        assert!(reply.discard(&mut transcript));
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.turns()[0].text, "describe this");
        assert!(transcript.get(reply.turn_id()).is_none());
        assert_eq!(reply.phase(), ReplyPhase::Discarded);
        assert!(!reply.finalize(&mut transcript));
    }

    #[test]
    fn only_one_streaming_turn_at_a_time() {
        let mut transcript = Transcript::new();
        let (mut first, _) = ReplyReconciler::open(&mut transcript).unwrap();
        assert!(matches!(ReplyReconciler::open(&mut transcript), Err(AppError::Busy)));
        assert_eq!(streaming_count(&transcript), 1);

        first.finalize(&mut transcript);
        assert_eq!(streaming_count(&transcript), 0);
        assert!(ReplyReconciler::open(&mut transcript).is_ok());
        assert_eq!(streaming_count(&transcript), 1);
    }

    #[test]
    fn fragments_after_reset_are_ignored() {
        let mut transcript = Transcript::new();
        let (mut reply, _) = ReplyReconciler::open(&mut transcript).unwrap();
        reply.apply(&mut transcript, &frag("Hi"));
        transcript.clear();

        assert_eq!(reply.apply(&mut transcript, &frag(" there")), None);
        assert!(transcript.is_empty());
        assert!(!reply.finalize(&mut transcript));
    }
}
