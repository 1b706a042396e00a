use std::cell::RefCell;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CloseEvent, MessageEvent, WebSocket};

use crate::api::ws_url;
use crate::models::{ChatEvent, ClientCommand};

thread_local! {
    /// The one chat connection for this tab. The server-side session lives as long as it does.
    static SOCKET: RefCell<Option<WebSocket>> = const { RefCell::new(None) };
}

/// Opens the chat WebSocket and dispatches every server event to `on_event`.
/// `on_closed` fires once when the connection goes away.
pub fn connect(
    on_event: impl Fn(ChatEvent) + 'static,
    on_closed: impl Fn(String) + 'static,
) -> Result<(), String> {
    let ws = WebSocket::new(&ws_url()).map_err(|e| format!("Failed to connect: {e:?}"))?;

    // --- onmessage: dispatch ChatEvent ---
    let onmessage = Closure::<dyn Fn(MessageEvent)>::new(move |ev: MessageEvent| {
        if let Some(text) = ev.data().as_string() {
            match serde_json::from_str::<ChatEvent>(&text) {
                Ok(event) => on_event(event),
                Err(e) => log::error!("Unparsable chat event: {e}"),
            }
        }
    });
    ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget();

    // --- onclose ---
    let onclose = Closure::<dyn Fn(CloseEvent)>::new(move |ev: CloseEvent| {
        log::warn!("Chat connection closed (code {})", ev.code());
        SOCKET.with(|s| s.borrow_mut().take());
        on_closed("Connection to the chat server was lost. Reload to start a new chat.".to_string());
    });
    ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));
    onclose.forget();

    // --- onerror ---
    let onerror = Closure::<dyn Fn()>::new(move || {
        log::error!("WebSocket connection error");
    });
    ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));
    onerror.forget();

    SOCKET.with(|s| *s.borrow_mut() = Some(ws));
    Ok(())
}

/// Serializes and sends a command on the open connection.
pub fn send_command(command: &ClientCommand) -> Result<(), String> {
    let json = serde_json::to_string(command).map_err(|e| format!("Serialize error: {e}"))?;
    SOCKET.with(|s| match s.borrow().as_ref() {
        Some(ws) if ws.ready_state() == WebSocket::OPEN => ws
            .send_with_str(&json)
            .map_err(|e| format!("Send failed: {e:?}")),
        Some(_) => Err("Still connecting to the chat server".to_string()),
        None => Err("Not connected to the chat server".to_string()),
    })
}
