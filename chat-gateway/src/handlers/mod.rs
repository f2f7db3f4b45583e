use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use service_core::error::AppError;

use crate::services::BotClient;

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    #[serde(default)]
    pub query: Option<String>,
}

/// `POST /query`: forward to the bot and relay its JSON verbatim.
pub async fn query(
    State(client): State<BotClient>,
    Json(body): Json<QueryBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let query = body.query.unwrap_or_default();
    tracing::info!(query_len = query.len(), "Forwarding query to chatbot");

    let reply = client.ask(query).await?;
    Ok(Json(reply))
}

/// Health check endpoint for Docker/K8s liveness probes.
pub async fn health_check(State(client): State<BotClient>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "chat-gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "upstream": client.address(),
        })),
    )
}
