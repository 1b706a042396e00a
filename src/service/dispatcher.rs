use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use tracing::{debug, info};

use super::session::SessionHandle;
use crate::agent::{Fragment, FragmentStream, GenerationRequest};
use crate::errors::AppError;
use crate::models::{Attachment, OutgoingMessage, Part};

/// Builds the outgoing turn. With attachments: one inline-data part per attachment in
/// order, then a text part if `text` is non-empty. Without: plain text.
pub fn build_outgoing(text: &str, attachments: &[Attachment]) -> Result<OutgoingMessage, AppError> {
    if attachments.is_empty() {
        if text.trim().is_empty() {
            return Err(AppError::EmptySubmission);
        }
        return Ok(OutgoingMessage::Text(text.to_string()));
    }

    let mut parts: Vec<Part> = attachments
        .iter()
        .cloned()
        .map(|inline_data| Part::InlineData { inline_data })
        .collect();
    if !text.is_empty() {
        parts.push(Part::Text { text: text.to_string() });
    }
    Ok(OutgoingMessage::Parts(parts))
}

/// Sends one user turn on `session` and returns the reply as a lazy fragment stream.
pub async fn send(
    session: SessionHandle,
    text: String,
    attachments: Vec<Attachment>,
) -> Result<ReplyStream, AppError> {
    let message = build_outgoing(&text, &attachments)?;
    let request = GenerationRequest {
        model: session.model(),
        config: session.config().clone(),
        history: session.history(),
        message: message.clone(),
    };

    info!(
        session_id = %session.id(),
        model = %session.model(),
        attachments = attachments.len(),
        "dispatching user turn"
    );
    let inner = session.backend().open_stream(request).await?;
    Ok(ReplyStream::new(session, message, inner))
}

/// Reply fragments for one send. Ends with either `None` (complete) or a single `Err`,
/// never both; nothing is yielded after either. A clean end records the exchange in the
/// session's history.
pub struct ReplyStream {
    session: SessionHandle,
    message: Option<OutgoingMessage>,
    reply: String,
    fragments: usize,
    inner: FragmentStream,
    done: bool,
}

impl ReplyStream {
    fn new(session: SessionHandle, message: OutgoingMessage, inner: FragmentStream) -> Self {
        Self {
            session,
            message: Some(message),
            reply: String::new(),
            fragments: 0,
            inner,
            done: false,
        }
    }
}

impl Stream for ReplyStream {
    type Item = Result<Fragment, AppError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(fragment))) => {
                this.fragments += 1;
                this.reply.push_str(&fragment.text());
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                debug!(session_id = %this.session.id(), fragments = this.fragments, "reply stream failed");
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                if let Some(message) = this.message.take() {
                    this.session
                        .commit_exchange(message, std::mem::take(&mut this.reply));
                }
                debug!(session_id = %this.session.id(), fragments = this.fragments, "reply stream complete");
                Poll::Ready(None)
            }
        }
    }
}
