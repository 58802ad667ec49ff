//! HTTP API around the pipeline.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tracing::Instrument;

use docent_core::{cancel_pair, AppError};
use docent_rag::{ChatRequest, ChatResponse, Message, Pipeline};

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    /// `None` runs requests without a deadline
    request_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, request_timeout: Option<Duration>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            request_timeout,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/sessions/:id/messages", get(session_messages))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// An `AppError` rendered as an HTTP response.
///
/// Only the error's public message reaches the client.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NoCandidates => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Cancelled(_) => StatusCode::GATEWAY_TIMEOUT,
            err if err.is_upstream() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            tracing::info!(status = status.as_u16(), error = %self.0, "Request rejected");
        }

        (status, Json(json!({ "error": self.0.public_message() }))).into_response()
    }
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        AppError::Validation(format!("Malformed request body: {}", rejection.body_text()))
    })?;

    // Dropped with this future when the client disconnects
    let (_handle, signal) = cancel_pair(state.request_timeout);

    let span = tracing::info_span!(
        "http",
        method = "POST",
        path = "/api/chat",
        session_id = request.session_id.as_deref().unwrap_or("new")
    );
    let response = state.pipeline.answer(request, &signal).instrument(span).await?;

    Ok(Json(response))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionMessages {
    session_id: String,
    messages: Vec<Message>,
}

async fn session_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionMessages>, ApiError> {
    let messages = state
        .pipeline
        .history(&session_id)
        .instrument(tracing::info_span!("http", method = "GET", path = "/api/sessions"))
        .await?;

    Ok(Json(SessionMessages {
        session_id,
        messages,
    }))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Serve `router` on `bind` until Ctrl-C.
pub async fn serve(router: Router, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
