//! Chat over a completed analysis.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use claimslion::ChatMessage;

use super::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub response: String,
}

/// POST /api/chat/{id}
pub(crate) async fn handle_ask(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    let answer = state.chat.ask(&id, &request.message).await?;
    Ok(Json(ChatReply {
        response: answer.content,
    }))
}

/// GET /api/chat/{id}
pub(crate) async fn handle_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    Ok(Json(state.chat.history(&id)?))
}
