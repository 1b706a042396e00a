use leptos::ev;
use leptos::prelude::*;
use leptos::task::spawn_local;
use wasm_bindgen::JsValue;
use web_sys::File;

use crate::files::read_upload;
use crate::models::{Attachment, AttachmentUpload, Turn};
use crate::state::AppState;

/// Main chat area with the transcript, inline notice, and input.
#[component]
pub fn ChatArea() -> impl IntoView {
    let state = expect_context::<AppState>();
    let turns = state.turns;
    let notice = state.notice;

    view! {
        <main class="chat-area">
            <div class="messages-container">
                {move || {
                    if turns.get().is_empty() {
                        view! {
                            <div class="empty-state">
                                <h2>"How can I help you today?"</h2>
                                <p>"Ask about complex topics, upload images for analysis, or get help with coding tasks."</p>
                            </div>
                        }.into_any()
                    } else {
                        view! {
                            <For
                                each=move || turns.get()
                                key=|t| (t.id.clone(), t.text.len(), t.is_streaming)
                                let:turn
                            >
                                <TurnBubble turn=turn />
                            </For>
                        }.into_any()
                    }
                }}

                // Error notice, shown inline below the transcript
                {move || {
                    notice.get().map(|message| {
                        view! { <div class="error-banner">{message}</div> }
                    })
                }}
            </div>

            <ChatInput />
        </main>
    }
}

/// `HH:MM` in local time, or the raw value when it is not a date.
fn display_time(timestamp: &str) -> String {
    let date = js_sys::Date::new(&JsValue::from_str(timestamp));
    if date.get_time().is_nan() {
        return timestamp.to_string();
    }
    format!("{:02}:{:02}", date.get_hours(), date.get_minutes())
}

/// Images render inline; anything else is named by its media type.
#[component]
fn AttachmentView(attachment: Attachment) -> impl IntoView {
    if attachment.mime_type.starts_with("image/") {
        let src = format!("data:{};base64,{}", attachment.mime_type, attachment.data);
        view! { <img class="attachment-image" src=src alt="attachment" /> }.into_any()
    } else {
        view! {
            <div class="attachment-file">{format!("Attachment ({})", attachment.mime_type)}</div>
        }
        .into_any()
    }
}

/// A single transcript turn.
#[component]
fn TurnBubble(turn: Turn) -> impl IntoView {
    let css_class = match (turn.is_user(), turn.is_streaming) {
        (true, _) => "message user",
        (false, true) => "message assistant streaming-cursor",
        (false, false) => "message assistant",
    };
    let label = if turn.is_user() { "You" } else { "Gemini" };
    let time = display_time(&turn.timestamp);
    let attachments = turn.attachments;

    view! {
        <div class=css_class>
            <div class="role-label">{label}</div>
            {(!attachments.is_empty()).then(|| view! {
                <div class="attachments">
                    {attachments
                        .into_iter()
                        .map(|attachment| view! { <AttachmentView attachment=attachment /> })
                        .collect_view()}
                </div>
            })}
            <div class="message-text">{turn.text}</div>
            <div class="message-time">{time}</div>
        </div>
    }
}

/// Reads every picked file, in order. Any failure aborts the whole batch.
async fn read_all(files: Vec<File>) -> Result<Vec<AttachmentUpload>, String> {
    let mut uploads = Vec::with_capacity(files.len());
    for file in files {
        uploads.push(read_upload(file).await?);
    }
    Ok(uploads)
}

/// Chat input form with textarea, file picker, and send button.
#[component]
fn ChatInput() -> impl IntoView {
    let state = expect_context::<AppState>();
    let (input, set_input) = signal(String::new());
    let (picked, set_picked) = signal_local(Vec::<File>::new());
    let (reading, set_reading) = signal(false);

    let is_busy = state.is_busy;
    let accepted_types = state.accepted_types;
    let set_notice = state.set_notice;

    let is_sending = move || is_busy.get() || reading.get();
    let can_send = move || {
        !is_sending() && (!input.get().trim().is_empty() || !picked.get().is_empty())
    };

    // Files are read here, not when picked, so a message never leaves without them.
    let send = move || {
        if !can_send() {
            return;
        }
        let text = input.get_untracked();
        let files = picked.get_untracked();
        let state = state.clone();
        set_reading.set(true);
        spawn_local(async move {
            match read_all(files).await {
                Ok(uploads) => {
                    set_input.set(String::new());
                    set_picked.set(Vec::new());
                    state.send_message(text, uploads);
                }
                Err(e) => {
                    log::error!("{e}");
                    set_notice.set(Some(e));
                }
            }
            set_reading.set(false);
        });
    };

    let send_clone = send.clone();
    let on_keydown = move |ev: ev::KeyboardEvent| {
        if ev.key() == "Enter" && !ev.shift_key() {
            ev.prevent_default();
            send_clone();
        }
    };

    let on_files = move |ev: ev::Event| {
        let picker: web_sys::HtmlInputElement = event_target(&ev);
        if let Some(list) = picker.files() {
            let files: Vec<File> = (0..list.length()).filter_map(|i| list.get(i)).collect();
            set_picked.update(|picked| picked.extend(files));
        }
        // Reset so the same file can be picked again
        picker.set_value("");
    };

    let accept = move || accepted_types.get().join(",");

    view! {
        <div class="input-area">
            <div class="attachment-list">
                <For
                    each={move || picked.get().into_iter().enumerate().collect::<Vec<_>>()}
                    key=|(index, file)| (*index, file.name())
                    let:entry
                >
                    {
                        let (index, file) = entry;
                        view! {
                            <span class="attachment-chip">
                                {file.name()}
                                <button
                                    class="remove-btn"
                                    on:click=move |_| set_picked.update(|picked| {
                                        if index < picked.len() {
                                            picked.remove(index);
                                        }
                                    })
                                >
                                    "×"
                                </button>
                            </span>
                        }
                    }
                </For>
            </div>
            <div class="input-row">
                <label class="attach-btn">
                    "📎"
                    <input
                        type="file"
                        multiple=true
                        style="display:none"
                        accept=accept
                        on:change=on_files
                        disabled=is_sending
                    />
                </label>
                <textarea
                    rows="1"
                    placeholder="Message Gemini… (Enter to send, Shift+Enter for newline)"
                    prop:value=input
                    on:input=move |ev| {
                        set_input.set(event_target_value(&ev));
                    }
                    on:keydown=on_keydown
                    disabled=is_sending
                />
                <button
                    class="send-btn"
                    on:click=move |_| send()
                    disabled=move || !can_send()
                >
                    {move || if is_sending() { "Generating…" } else { "Send" }}
                </button>
            </div>
        </div>
    }
}
