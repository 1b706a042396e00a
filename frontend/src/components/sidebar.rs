use leptos::prelude::*;

use crate::state::AppState;

/// Sidebar with the "New Chat" button and the model selector.
#[component]
pub fn Sidebar() -> impl IntoView {
    let state = expect_context::<AppState>();
    let models = state.models;
    let current_model = state.current_model;
    let is_busy = state.is_busy;

    let on_new = {
        let state = state.clone();
        move |_| state.new_chat()
    };

    let on_select = move |ev: leptos::ev::Event| {
        let model = event_target_value(&ev);
        if current_model.get_untracked().as_deref() != Some(model.as_str()) {
            state.select_model(model);
        }
    };

    view! {
        <aside class="sidebar">
            <div class="sidebar-header">
                <h2>"Gemini Chat"</h2>
                <button class="new-chat-btn" on:click=on_new>
                    "+ New Chat"
                </button>
            </div>
            <div class="model-selector">
                <label for="model-select">"Model"</label>
                <select
                    id="model-select"
                    on:change=on_select
                    disabled=move || is_busy.get()
                    prop:value=move || current_model.get().unwrap_or_default()
                >
                    <For
                        each=move || models.get()
                        key=|m| m.id.clone()
                        let:model
                    >
                        {
                            let id = model.id.clone();
                            view! {
                                <option
                                    value=model.id
                                    title=model.description
                                    selected=move || current_model.get().as_deref() == Some(id.as_str())
                                >
                                    {model.label}
                                </option>
                            }
                        }
                    </For>
                </select>
            </div>
        </aside>
    }
}
