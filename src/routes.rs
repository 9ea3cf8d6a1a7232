//! HTTP surface: the n8n result callback and a health check.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::error::Error;
use crate::posting::{CallbackPayload, PostFlow};

/// Shared state for the HTTP routes.
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<PostFlow>,
}

fn reply(code: StatusCode, status: &str, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (
        code,
        Json(json!({ "status": status, "message": message.into() })),
    )
}

/// POST /webhook/n8n
///
/// 400 for a malformed body, 500 when no matching `generating` session
/// exists or the store fails, 200 once the post is queued for review.
async fn n8n_callback(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected malformed callback body");
            return reply(StatusCode::BAD_REQUEST, "error", rejection.body_text());
        }
    };

    let post = match serde_json::from_value::<CallbackPayload>(body)
        .map_err(|e| e.to_string())
        .and_then(|payload| payload.validate().map_err(|e| e.to_string()))
    {
        Ok(post) => post,
        Err(message) => {
            warn!(error = %message, "Rejected invalid callback payload");
            return reply(StatusCode::BAD_REQUEST, "error", message);
        }
    };

    let chat_id = post.chat_id;
    match state.flow.ingest_callback(post).await {
        Ok(session_id) => reply(
            StatusCode::OK,
            "success",
            format!("Post delivered for review (session {session_id})"),
        ),
        Err(Error::Session(e)) => {
            warn!(chat_id, error = %e, "Callback did not match a generating session");
            reply(StatusCode::INTERNAL_SERVER_ERROR, "error", e.to_string())
        }
        Err(e) => {
            error!(chat_id, error = %e, "Callback processing failed");
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "error",
                "Internal error while processing the generated post",
            )
        }
    }
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "post-assist" }))
}

/// Build the HTTP routes.
pub fn app_routes(state: AppState) -> Router {
    Router::new()
        .route("/webhook/n8n", post(n8n_callback))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
