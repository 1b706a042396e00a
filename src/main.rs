use std::sync::Arc;

use tracing::{error, info};

use gemini_chat::agent::GeminiBackend;
use gemini_chat::config::{ChatConfig, ServerConfig};
use gemini_chat::errors::AppError;
use gemini_chat::routes::{build_router, AppState};
use gemini_chat::service::session::SessionFactory;

/// Chat is only available with a valid credential; otherwise every session is refused.
fn chat_state() -> AppState {
    let ready = ChatConfig::from_env().and_then(|config| {
        let backend = GeminiBackend::new(&config.api_key, config.base_url.as_deref())?;
        let factory = SessionFactory::new(Arc::new(backend), config.generation.clone());
        Ok::<_, AppError>(AppState::ready(factory, config.default_model))
    });

    match ready {
        Ok(state) => state,
        Err(e) => {
            error!("Chat is unavailable: {e}");
            AppState::misconfigured(e.notice())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gemini_chat=debug,tower_http=debug".into()),
        )
        .init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let server = ServerConfig::from_env();
    let state = chat_state();

    // ── Router ────────────────────────────────────────────────────────────────
    let app = build_router(state, server.static_dir.as_deref());
    if let Some(dir) = &server.static_dir {
        info!("Serving frontend from {}", dir.display());
    }

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
