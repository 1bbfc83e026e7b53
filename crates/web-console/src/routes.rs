use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use callcast_session_core::{CallManager, ChatId, ManagerStatus, SessionSummary};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

const HEALTH_TEXT: &str = "callcast is running";

/// All console routes over a shared manager
pub fn router(manager: CallManager) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/sessions/:chat_id", get(session))
        .layer(TraceLayer::new_for_http())
        .with_state(manager)
}

async fn health() -> &'static str {
    HEALTH_TEXT
}

async fn status(State(manager): State<CallManager>) -> Json<ManagerStatus> {
    Json(manager.status().await)
}

async fn session(
    State(manager): State<CallManager>,
    Path(raw): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    let chat_id: ChatId = raw.parse()?;
    Ok(Json(manager.session(chat_id).await?))
}
