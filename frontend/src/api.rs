use gloo_net::http::Request;

use crate::models::StatusResponse;

/// Base URL of the backend API server.
const API_BASE: &str = "http://localhost:3000";

/// Fetches chat availability. A 503 still carries a readable body with the
/// configuration error, so the status code alone is not treated as failure.
pub async fn fetch_status() -> Result<StatusResponse, String> {
    let resp = Request::get(&format!("{API_BASE}/api/status"))
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    resp.json::<StatusResponse>()
        .await
        .map_err(|e| format!("Parse error: {e}"))
}

/// Returns the WebSocket URL for the chat streaming endpoint.
pub fn ws_url() -> String {
    "ws://localhost:3000/ws/chat".to_string()
}
