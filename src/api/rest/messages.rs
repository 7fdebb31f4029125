use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::{Message, MessageSender};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/jobs/:id/messages", post(send_message).get(list_messages))
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub sender: MessageSender,
    pub text: String,
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<Message>, AppError> {
    if payload.text.trim().is_empty() {
        return Err(AppError::BadRequest("text cannot be empty".to_string()));
    }

    let message = state
        .store
        .append_message(id, payload.sender, payload.text)?;
    Ok(Json(message))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, AppError> {
    Ok(Json(state.store.job_messages(id)?))
}
