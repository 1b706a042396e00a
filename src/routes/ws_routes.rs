use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::{AppState, Readiness};
use crate::errors::AppError;
use crate::models::{ChatEvent, ClientCommand, GeminiModel};
use crate::service::chat_service::{ChatService, InFlight, Step, Submission};

/// GET `/ws/chat`: upgrades to a WebSocket carrying one chat session.
pub async fn ws_chat_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles a single WebSocket connection.
///
/// Protocol:
/// - Client sends `ClientCommand` JSON: `send`, `select_model`, or `new_chat`.
/// - Server pushes `ChatEvent` JSON: `ready` first, then transcript changes
///   (`turn_appended`, `turn_updated`, `turn_finalized`, `turn_discarded`,
///   `transcript_reset`) plus `busy` and `notice`.
/// - Without a credential the server sends `configuration_error` and closes.
///
/// Commands keep being read while a reply streams, so a model switch can abandon it
/// and a second `send` is rejected instead of queued.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (factory, default_model) = match state.readiness() {
        Readiness::Ready { factory, default_model } => (factory.clone(), *default_model),
        Readiness::Misconfigured { message } => {
            warn!("Refusing chat session: {message}");
            for frame in refusal(message) {
                if socket.send(frame).await.is_err() {
                    break;
                }
            }
            return;
        }
    };

    info!("WebSocket client connected");
    let (mut sink, mut source) = socket.split();

    // ── Forward service events to the client ─────────────────────────────────
    let (tx, mut rx) = mpsc::unbounded_channel::<ChatEvent>();
    let forward = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = send_event(&mut sink, &event).await {
                warn!("WebSocket send failed: {e}");
                break;
            }
        }
    });

    let mut svc = ChatService::new(factory, default_model, tx);
    let mut flight: Option<InFlight> = None;

    loop {
        tokio::select! {
            incoming = source.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(t))) => t.to_string(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {e}");
                        break;
                    }
                };
                handle_command(&mut svc, &mut flight, &text).await;
            }
            step = next_step(&mut flight), if flight.is_some() => {
                if let Some(current) = flight.as_mut() {
                    if svc.advance(current, step) {
                        flight = None;
                    }
                }
            }
        }
    }

    info!(
        session_id = %svc.session().id(),
        turns = svc.transcript().len(),
        busy = svc.is_busy(),
        notice = ?svc.notice(),
        "WebSocket client disconnected"
    );
    drop(flight);
    drop(svc);
    if let Err(e) = forward.await {
        error!("Event forwarder panicked: {e}");
    }
}

/// Frames telling the client why no session exists, ending with a close. There is no degraded mode.
fn refusal(message: &str) -> Vec<Message> {
    let event = ChatEvent::ConfigurationError { message: message.to_string() };
    let mut frames = Vec::with_capacity(2);
    match serde_json::to_string(&event) {
        Ok(json) => frames.push(Message::Text(json.into())),
        Err(e) => error!("Failed to serialize event: {e}"),
    }
    frames.push(Message::Close(None));
    frames
}

async fn handle_command(svc: &mut ChatService, flight: &mut Option<InFlight>, raw: &str) {
    let command: ClientCommand = match serde_json::from_str(raw) {
        Ok(c) => c,
        Err(e) => {
            svc.reject(AppError::InvalidRequest { message: e.to_string() });
            return;
        }
    };

    match command {
        ClientCommand::Send { text, attachments } => {
            if let Some(started) = svc.submit(Submission::from_uploads(text, attachments)).await {
                *flight = Some(started);
            }
        }
        ClientCommand::SelectModel { model } => match model.parse::<GeminiModel>() {
            Ok(model) => {
                *flight = None;
                svc.select_model(model);
            }
            Err(e) => svc.reject(e),
        },
        ClientCommand::NewChat => {
            *flight = None;
            svc.new_chat();
        }
    }
}

async fn next_step(flight: &mut Option<InFlight>) -> Step {
    match flight {
        Some(current) => current.next_step().await,
        None => std::future::pending().await,
    }
}

/// Helper: serialize a `ChatEvent` and send it over the socket.
async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &ChatEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(e) => {
            error!("Failed to serialize event: {e}");
            Ok(())
        }
    }
}
