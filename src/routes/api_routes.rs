use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use super::{AppState, Readiness};
use crate::attachment::ACCEPTED_TYPES;
use crate::models::{GeminiModel, ModelInfo};

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<GeminiModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub accepted_types: Vec<&'static str>,
}

/// GET `/api/status`: whether chat is available; 503 carries the configuration error.
pub async fn status_handler(State(state): State<AppState>) -> Response {
    match state.readiness() {
        Readiness::Ready { default_model, .. } => Json(StatusResponse {
            ready: true,
            default_model: Some(*default_model),
            error: None,
            accepted_types: ACCEPTED_TYPES.to_vec(),
        })
        .into_response(),
        Readiness::Misconfigured { message } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(StatusResponse {
                ready: false,
                default_model: None,
                error: Some(message.clone()),
                accepted_types: ACCEPTED_TYPES.to_vec(),
            }),
        )
            .into_response(),
    }
}

/// GET `/api/models`: the model picker's catalog
pub async fn list_models_handler() -> Json<Vec<ModelInfo>> {
    Json(GeminiModel::catalog())
}
