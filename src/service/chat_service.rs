use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::dispatcher::{self, ReplyStream};
use super::session::{SessionFactory, SessionHandle};
use super::transcript::{ReplyReconciler, Transcript};
use crate::agent::Fragment;
use crate::attachment::{self, AttachmentSource};
use crate::errors::AppError;
use crate::models::{AttachmentUpload, ChatEvent, GeminiModel};

/// One user submission as it arrives from the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub text: String,
    pub attachments: Vec<AttachmentSource>,
}

impl Submission {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), attachments: Vec::new() }
    }

    pub fn from_uploads(text: String, uploads: Vec<AttachmentUpload>) -> Self {
        Self {
            text,
            attachments: uploads.into_iter().map(AttachmentSource::from).collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }
}

/// Progress of an in-flight reply, as observed by whoever drives it.
#[derive(Debug)]
pub enum Step {
    Fragment(Fragment),
    Completed,
    Failed(AppError),
}

enum Stage {
    Opening(BoxFuture<'static, Result<ReplyStream, AppError>>),
    Streaming(ReplyStream),
    Done,
}

/// A reply that has been dispatched but not yet reconciled to a terminal state.
/// Owns its dispatch, so dropping it abandons the request.
pub struct InFlight {
    session_id: String,
    reply: ReplyReconciler,
    stage: Stage,
}

impl InFlight {
    pub fn turn_id(&self) -> &str {
        self.reply.turn_id()
    }

    /// Waits for the next step. Cancel-safe: dropping the returned future loses nothing.
    pub async fn next_step(&mut self) -> Step {
        loop {
            match &mut self.stage {
                Stage::Opening(open) => match open.await {
                    Ok(stream) => self.stage = Stage::Streaming(stream),
                    Err(e) => {
                        self.stage = Stage::Done;
                        return Step::Failed(e);
                    }
                },
                Stage::Streaming(stream) => {
                    let step = match stream.next().await {
                        Some(Ok(fragment)) => return Step::Fragment(fragment),
                        Some(Err(e)) => Step::Failed(e),
                        None => Step::Completed,
                    };
                    self.stage = Stage::Done;
                    return step;
                }
                Stage::Done => return std::future::pending().await,
            }
        }
    }
}

/// The submission boundary for one browser session: owns the active session, the
/// transcript, and the busy flag, and turns every failure into a user-visible notice.
pub struct ChatService {
    factory: SessionFactory,
    session: SessionHandle,
    transcript: Transcript,
    busy: bool,
    notice: Option<String>,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl ChatService {
    pub fn new(
        factory: SessionFactory,
        model: GeminiModel,
        events: mpsc::UnboundedSender<ChatEvent>,
    ) -> Self {
        let session = factory.create(model);
        let svc = Self {
            factory,
            session,
            transcript: Transcript::new(),
            busy: false,
            notice: None,
            events,
        };
        svc.emit(ChatEvent::Ready {
            session_id: svc.session.id().to_string(),
            model,
            models: GeminiModel::catalog(),
        });
        svc
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Validates, encodes attachments, appends the user turn and the reply placeholder,
    /// and hands back the dispatched reply. Returns `None` when the submission was
    /// rejected; the reason is already in the notice.
    pub async fn submit(&mut self, submission: Submission) -> Option<InFlight> {
        if self.busy {
            warn!(session_id = %self.session.id(), "submission rejected while a reply is in flight");
            self.set_notice(Some(AppError::Busy.notice()));
            return None;
        }
        if submission.is_empty() {
            self.set_notice(Some(AppError::EmptySubmission.notice()));
            return None;
        }

        self.set_notice(None);
        self.set_busy(true);

        let attachments = match attachment::encode_all(submission.attachments).await {
            Ok(attachments) => attachments,
            Err(e) => {
                error!(kind = e.category(), "Attachment encoding failed: {e}");
                self.fail_submission(e);
                return None;
            }
        };

        let user_turn = self
            .transcript
            .push_user(submission.text.clone(), attachments.clone())
            .clone();
        self.emit(ChatEvent::TurnAppended { turn: user_turn });

        let (reply, placeholder) = match ReplyReconciler::open(&mut self.transcript) {
            Ok(opened) => opened,
            Err(e) => {
                self.fail_submission(e);
                return None;
            }
        };
        debug!(turn_id = %placeholder.id, role = %placeholder.role, "placeholder appended");
        self.emit(ChatEvent::TurnAppended { turn: placeholder });

        let dispatch = Box::pin(dispatcher::send(
            self.session.clone(),
            submission.text,
            attachments,
        ));
        Some(InFlight {
            session_id: self.session.id().to_string(),
            reply,
            stage: Stage::Opening(dispatch),
        })
    }

    /// Reconciles one step into the transcript. Returns `true` once the reply is terminal
    /// (or belongs to a session that has since been replaced) and should be dropped.
    pub fn advance(&mut self, flight: &mut InFlight, step: Step) -> bool {
        if flight.session_id != self.session.id() {
            debug!(turn_id = %flight.turn_id(), phase = ?flight.reply.phase(), "step for an abandoned session ignored");
            return true;
        }

        match step {
            Step::Fragment(fragment) => {
                if let Some(text) = flight.reply.apply(&mut self.transcript, &fragment) {
                    self.emit(ChatEvent::TurnUpdated { id: flight.turn_id().to_string(), text });
                }
                false
            }
            Step::Completed => {
                if flight.reply.finalize(&mut self.transcript) {
                    info!(
                        session_id = %self.session.id(),
                        turn_id = %flight.turn_id(),
                        reply_len = flight.reply.text().len(),
                        "reply finalized"
                    );
                    self.emit(ChatEvent::TurnFinalized { id: flight.turn_id().to_string() });
                }
                self.set_busy(false);
                true
            }
            Step::Failed(e) => {
                if e.is_transport() {
                    error!(session_id = %self.session.id(), turn_id = %flight.turn_id(), "Reply failed: {e}");
                } else {
                    warn!(session_id = %self.session.id(), kind = e.category(), "Reply failed: {e}");
                }
                if flight.reply.discard(&mut self.transcript) {
                    self.emit(ChatEvent::TurnDiscarded { id: flight.turn_id().to_string() });
                }
                self.set_notice(Some(e.notice()));
                self.set_busy(false);
                true
            }
        }
    }

    /// Drives a reply to its terminal state without interleaving other commands.
    pub async fn drive(&mut self, mut flight: InFlight) {
        loop {
            let step = flight.next_step().await;
            if self.advance(&mut flight, step) {
                break;
            }
        }
    }

    /// Drops the current session (and any reply still streaming on it) and starts fresh on `model`.
    pub fn select_model(&mut self, model: GeminiModel) {
        info!(from = %self.session.model(), to = %model, "switching model");
        self.reset(model);
    }

    pub fn new_chat(&mut self) {
        self.reset(self.session.model());
    }

    fn reset(&mut self, model: GeminiModel) {
        self.session = self.factory.create(model);
        self.transcript.clear();
        self.emit(ChatEvent::TranscriptReset {
            session_id: self.session.id().to_string(),
            model,
        });
        self.set_notice(None);
        self.set_busy(false);
    }

    /// Surfaces an error that happened outside a submission, e.g. an unparsable command.
    pub fn reject(&mut self, e: AppError) {
        warn!(session_id = %self.session.id(), kind = e.category(), "rejected: {e}");
        self.set_notice(Some(e.notice()));
    }

    fn fail_submission(&mut self, e: AppError) {
        self.set_notice(Some(e.notice()));
        self.set_busy(false);
    }

    fn set_busy(&mut self, busy: bool) {
        if self.busy != busy {
            self.busy = busy;
            self.emit(ChatEvent::Busy { busy });
        }
    }

    fn set_notice(&mut self, notice: Option<String>) {
        if self.notice != notice {
            self.notice = notice.clone();
            self.emit(ChatEvent::Notice { message: notice });
        }
    }

    fn emit(&self, event: ChatEvent) {
        // The receiver goes away with the connection; late events have nowhere to go.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agent::scripted::{Script, ScriptedBackend};
    use crate::models::{GenerationConfig, OutgoingMessage, Part, Role};

    fn service(scripts: Vec<Script>) -> (ChatService, ScriptedBackend, mpsc::UnboundedReceiver<ChatEvent>) {
        let backend = ScriptedBackend::new(scripts);
        let factory = SessionFactory::new(Arc::new(backend.clone()), GenerationConfig::default());
        let (tx, rx) = mpsc::unbounded_channel();
        (ChatService::new(factory, GeminiModel::Flash, tx), backend, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn image_upload() -> AttachmentUpload {
        AttachmentUpload {
            name: "cat.png".into(),
            mime_type: "image/png".into(),
            data_url: "data:image/png;base64,iVBORw0KGgo=".into(),
        }
    }

    #[tokio::test]
    async fn hello_scenario() {
        let (mut svc, _, mut rx) = service(vec![Script::reply(&["Hi", " there"])]);
        drain(&mut rx);

        let mut flight = svc.submit(Submission::text("Hello")).await.unwrap();
        assert!(svc.is_busy());
        assert_eq!(svc.transcript().len(), 2);
        let placeholder_id = flight.turn_id().to_string();
        {
            let turns = svc.transcript().turns();
            assert_eq!(turns[0].role, Role::User);
            assert_eq!(turns[0].text, "Hello");
            assert_eq!(turns[1].role, Role::Model);
            assert!(turns[1].is_streaming);
            assert!(turns[1].text.is_empty());
        }

        let step = flight.next_step().await;
        assert!(!svc.advance(&mut flight, step));
        assert_eq!(svc.transcript().get(&placeholder_id).unwrap().text, "Hi");

        let step = flight.next_step().await;
        assert!(!svc.advance(&mut flight, step));
        assert_eq!(svc.transcript().get(&placeholder_id).unwrap().text, "Hi there");

        let step = flight.next_step().await;
        assert!(matches!(step, Step::Completed));
        assert!(svc.advance(&mut flight, step));

        let reply = svc.transcript().get(&placeholder_id).unwrap();
        assert!(!reply.is_streaming);
        assert_eq!(reply.text, "Hi there");
        assert!(!svc.is_busy());
        assert_eq!(svc.session().history().len(), 2);

        let events = drain(&mut rx);
        let updates: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::TurnUpdated { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(updates, vec!["Hi", "Hi there"]);
        assert!(events.contains(&ChatEvent::TurnFinalized { id: placeholder_id }));
        assert_eq!(events.last(), Some(&ChatEvent::Busy { busy: false }));
    }

    #[tokio::test]
    async fn image_only_submission_sends_single_inline_part() {
        let (mut svc, backend, _rx) = service(vec![Script::reply(&["A cat."])]);
        let flight = svc
            .submit(Submission::from_uploads(String::new(), vec![image_upload()]))
            .await
            .unwrap();
        svc.drive(flight).await;

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        match &requests[0].message {
            OutgoingMessage::Parts(parts) => {
                assert_eq!(parts.len(), 1);
                match &parts[0] {
                    Part::InlineData { inline_data } => {
                        assert_eq!(inline_data.mime_type, "image/png");
                        assert_eq!(inline_data.data, "iVBORw0KGgo=");
                    }
                    other => panic!("expected inline data, got {other:?}"),
                }
            }
            other => panic!("expected parts, got {other:?}"),
        }
        assert_eq!(svc.transcript().turns()[0].attachments.len(), 1);
    }

    #[tokio::test]
    async fn failure_after_partial_reply_discards_placeholder() {
        let (mut svc, _, mut rx) = service(vec![Script::fail_after(&["Par"], "stream reset by peer")]);
        let flight = svc.submit(Submission::text("describe this")).await.unwrap();
        let placeholder_id = flight.turn_id().to_string();
        svc.drive(flight).await;

        assert_eq!(svc.transcript().len(), 1);
        assert_eq!(svc.transcript().turns()[0].text, "describe this");
        assert!(svc.transcript().get(&placeholder_id).is_none());
        assert_eq!(svc.notice(), Some("stream reset by peer"));
        assert!(!svc.is_busy());
        assert!(svc.session().history().is_empty());

        let events = drain(&mut rx);
        assert!(events.contains(&ChatEvent::TurnUpdated { id: placeholder_id.clone(), text: "Par".into() }));
        assert!(events.contains(&ChatEvent::TurnDiscarded { id: placeholder_id }));
    }

    #[tokio::test]
    async fn open_failure_discards_placeholder() {
        let (mut svc, _, _rx) = service(vec![Script::RejectOpen("API key not valid".into())]);
        let flight = svc.submit(Submission::text("Hello")).await.unwrap();
        svc.drive(flight).await;

        assert_eq!(svc.transcript().len(), 1);
        assert_eq!(svc.notice(), Some("API key not valid"));
    }

    #[tokio::test]
    async fn empty_submission_is_rejected_without_turns() {
        let (mut svc, backend, _rx) = service(vec![]);
        assert!(svc.submit(Submission::text("   ")).await.is_none());
        assert!(svc.transcript().is_empty());
        assert!(!svc.is_busy());
        assert!(svc.notice().is_some());
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn encoding_failure_appends_nothing() {
        let (mut svc, backend, _rx) = service(vec![]);
        let bad = AttachmentUpload {
            name: "broken.png".into(),
            mime_type: "image/png".into(),
            data_url: "not-a-data-url".into(),
        };
        assert!(svc.submit(Submission::from_uploads("look".into(), vec![bad])).await.is_none());
        assert!(svc.transcript().is_empty());
        assert!(!svc.is_busy());
        assert!(svc.notice().unwrap().contains("broken.png"));
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn second_submission_while_busy_is_rejected() {
        let (mut svc, backend, _rx) = service(vec![Script::Hang(vec![])]);
        let _flight = svc.submit(Submission::text("first")).await.unwrap();

        assert!(svc.submit(Submission::text("second")).await.is_none());
        assert_eq!(svc.transcript().len(), 2);
        assert_eq!(svc.transcript().turns().iter().filter(|t| t.is_streaming).count(), 1);
        assert!(svc.is_busy());
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn model_switch_resets_and_ignores_stale_fragments() {
        let (mut svc, _, mut rx) = service(vec![Script::Hang(vec![
            Fragment::new(vec!["Hi".into()]),
            Fragment::new(vec![" there".into()]),
        ])]);
        let old_session = svc.session().id().to_string();
        let mut flight = svc.submit(Submission::text("Hello")).await.unwrap();
        let step = flight.next_step().await;
        svc.advance(&mut flight, step);

        svc.select_model(GeminiModel::Pro);
        assert!(svc.transcript().is_empty());
        assert_ne!(svc.session().id(), old_session);
        assert_eq!(svc.session().model(), GeminiModel::Pro);
        assert!(!svc.is_busy());
        drain(&mut rx);

        let step = flight.next_step().await;
        assert!(svc.advance(&mut flight, step));
        assert!(svc.transcript().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn new_chat_keeps_model_and_clears_notice() {
        let (mut svc, _, mut rx) = service(vec![Script::RejectOpen("boom".into())]);
        svc.select_model(GeminiModel::FlashThinking);
        let flight = svc.submit(Submission::text("Hello")).await.unwrap();
        svc.drive(flight).await;
        assert!(svc.notice().is_some());

        svc.new_chat();
        assert_eq!(svc.session().model(), GeminiModel::FlashThinking);
        assert!(svc.notice().is_none());
        assert!(svc.transcript().is_empty());
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, ChatEvent::TranscriptReset { model: GeminiModel::FlashThinking, .. })));
    }

    #[tokio::test]
    async fn ready_event_announces_session() {
        let (svc, _, mut rx) = service(vec![]);
        match drain(&mut rx).first() {
            Some(ChatEvent::Ready { session_id, model, models }) => {
                assert_eq!(session_id, svc.session().id());
                assert_eq!(*model, GeminiModel::Flash);
                assert_eq!(models.len(), 3);
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }
}
