pub mod api_routes;
pub mod ws_routes;

use std::path::Path;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::models::GeminiModel;
use crate::service::session::SessionFactory;
use api_routes::{list_models_handler, status_handler};
use ws_routes::ws_chat_handler;

/// Whether sessions can be created at all. Fixed at startup.
pub enum Readiness {
    Ready {
        factory: SessionFactory,
        default_model: GeminiModel,
    },
    Misconfigured {
        message: String,
    },
}

#[derive(Clone)]
pub struct AppState {
    readiness: Arc<Readiness>,
}

impl AppState {
    pub fn ready(factory: SessionFactory, default_model: GeminiModel) -> Self {
        Self { readiness: Arc::new(Readiness::Ready { factory, default_model }) }
    }

    pub fn misconfigured(message: impl Into<String>) -> Self {
        Self { readiness: Arc::new(Readiness::Misconfigured { message: message.into() }) }
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }
}

pub fn build_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/models", get(list_models_handler))
        .route("/ws/chat", get(ws_chat_handler));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
