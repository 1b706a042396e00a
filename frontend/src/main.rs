mod api;
mod components;
mod files;
mod models;
mod state;
mod ws;

use leptos::mount::mount_to_body;
use leptos::prelude::*;

use components::chat::ChatArea;
use components::sidebar::Sidebar;
use state::AppState;

/// Root application component.
#[component]
fn App() -> impl IntoView {
    let state = AppState::provide();
    let config_error = state.config_error;

    // Check configuration, then connect
    state.start();

    view! {
        {move || match config_error.get() {
            Some(message) => view! {
                <div class="config-error">
                    <h1>"Configuration Missing"</h1>
                    <p>{message}</p>
                    <p>"Set GEMINI_API_KEY in the server environment and restart it."</p>
                </div>
            }.into_any(),
            None => view! {
                <div class="app-container">
                    <Sidebar />
                    <ChatArea />
                </div>
            }.into_any(),
        }}
    }
}

fn main() {
    console_log::init_with_level(log::Level::Debug).expect("Failed to init logger");
    mount_to_body(App);
}
