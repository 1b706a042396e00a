use leptos::prelude::*;
use leptos::task::spawn_local;

use crate::api;
use crate::models::{AttachmentUpload, ChatEvent, ClientCommand, ModelInfo, Turn};
use crate::ws;

/// Shared application state, provided via Leptos context.
/// The transcript is a mirror: it only changes when the server says so.
#[derive(Clone)]
pub struct AppState {
    // --- Read signals (for components to subscribe to) ---
    pub turns: ReadSignal<Vec<Turn>>,
    pub models: ReadSignal<Vec<ModelInfo>>,
    pub current_model: ReadSignal<Option<String>>,
    pub accepted_types: ReadSignal<Vec<String>>,
    pub is_busy: ReadSignal<bool>,
    pub notice: ReadSignal<Option<String>>,
    pub config_error: ReadSignal<Option<String>>,

    // --- Write signals (for mutating state) ---
    pub set_turns: WriteSignal<Vec<Turn>>,
    pub set_models: WriteSignal<Vec<ModelInfo>>,
    pub set_current_model: WriteSignal<Option<String>>,
    pub set_accepted_types: WriteSignal<Vec<String>>,
    pub set_is_busy: WriteSignal<bool>,
    pub set_notice: WriteSignal<Option<String>>,
    pub set_config_error: WriteSignal<Option<String>>,
}

impl AppState {
    /// Create a new `AppState` and provide it in the current Leptos context.
    pub fn provide() -> Self {
        let (turns, set_turns) = signal(Vec::<Turn>::new());
        let (models, set_models) = signal(Vec::<ModelInfo>::new());
        let (current_model, set_current_model) = signal(None::<String>);
        let (accepted_types, set_accepted_types) = signal(Vec::<String>::new());
        let (is_busy, set_is_busy) = signal(false);
        let (notice, set_notice) = signal(None::<String>);
        let (config_error, set_config_error) = signal(None::<String>);

        let state = Self {
            turns,
            models,
            current_model,
            accepted_types,
            is_busy,
            notice,
            config_error,
            set_turns,
            set_models,
            set_current_model,
            set_accepted_types,
            set_is_busy,
            set_notice,
            set_config_error,
        };

        provide_context(state.clone());
        state
    }

    /// Checks configuration, then opens the chat connection.
    pub fn start(&self) {
        let state = self.clone();
        spawn_local(async move {
            match api::fetch_status().await {
                Ok(status) if !status.ready => {
                    let message = status
                        .error
                        .unwrap_or_else(|| "The chat server is not configured.".to_string());
                    state.set_config_error.set(Some(message));
                    return;
                }
                Ok(status) => {
                    state.set_accepted_types.set(status.accepted_types);
                    state.set_current_model.set(status.default_model);
                }
                Err(e) => {
                    log::error!("Failed to fetch status: {e}");
                    state.set_notice.set(Some(e));
                }
            }

            let on_event = {
                let state = state.clone();
                move |event: ChatEvent| state.apply(event)
            };
            let set_notice = state.set_notice;
            let set_is_busy = state.set_is_busy;
            let on_closed = move |message: String| {
                set_is_busy.set(true);
                set_notice.set(Some(message));
            };
            if let Err(e) = ws::connect(on_event, on_closed) {
                log::error!("{e}");
                state.set_notice.set(Some(e));
            }
        });
    }

    /// Applies one server event to the mirrored state.
    pub fn apply(&self, event: ChatEvent) {
        match event {
            ChatEvent::Ready { session_id, model, models } => {
                log::debug!("Session {session_id} ready on {model}");
                self.set_models.set(models);
                self.set_current_model.set(Some(model));
                self.set_turns.set(Vec::new());
            }
            ChatEvent::ConfigurationError { message } => {
                self.set_config_error.set(Some(message));
            }
            ChatEvent::TranscriptReset { session_id, model } => {
                log::debug!("Session {session_id} started on {model}");
                self.set_current_model.set(Some(model));
                self.set_turns.set(Vec::new());
            }
            ChatEvent::TurnAppended { turn } => {
                self.set_turns.update(|turns| turns.push(turn));
            }
            ChatEvent::TurnUpdated { id, text } => {
                self.set_turns.update(|turns| {
                    if let Some(turn) = turns.iter_mut().find(|t| t.id == id) {
                        turn.text = text;
                    }
                });
            }
            ChatEvent::TurnFinalized { id } => {
                self.set_turns.update(|turns| {
                    if let Some(turn) = turns.iter_mut().find(|t| t.id == id) {
                        turn.is_streaming = false;
                    }
                });
            }
            ChatEvent::TurnDiscarded { id } => {
                self.set_turns.update(|turns| turns.retain(|t| t.id != id));
            }
            ChatEvent::Busy { busy } => self.set_is_busy.set(busy),
            ChatEvent::Notice { message } => self.set_notice.set(message),
        }
    }

    /// Sends a message with attachments. Empty submissions never leave the browser.
    pub fn send_message(&self, text: String, attachments: Vec<AttachmentUpload>) {
        if (text.trim().is_empty() && attachments.is_empty()) || self.is_busy.get_untracked() {
            return;
        }
        self.run(ClientCommand::Send { text, attachments });
    }

    pub fn select_model(&self, model: String) {
        self.run(ClientCommand::SelectModel { model });
    }

    pub fn new_chat(&self) {
        self.run(ClientCommand::NewChat);
    }

    fn run(&self, command: ClientCommand) {
        if let Err(e) = ws::send_command(&command) {
            log::error!("Failed to send command: {e}");
            self.set_notice.set(Some(e));
        }
    }
}
