use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info};
use uuid::Uuid;

use chirp_gateway::store::MessageStore;

use crate::auth::AppState;
use crate::middleware::AuthUser;

/// Conversation between the caller and `user_id`, oldest first.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    // Run blocking DB query off the async runtime
    let db = state.db.clone();
    let me = auth.user_id;
    let messages = tokio::task::spawn_blocking(move || db.get_messages(me, user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Failed to load conversation {} <-> {}: {}", me, user_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(messages))
}

/// Only the sender may delete a message.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
) -> Result<StatusCode, StatusCode> {
    let db = state.db.clone();
    let me = auth.user_id;
    let deleted = tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
        if !db.is_sender(me, message_id)? {
            return Ok(false);
        }
        MessageStore::delete_message(db.as_ref(), message_id)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|e| {
        error!("Failed to delete message {}: {}", message_id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if !deleted {
        return Err(StatusCode::UNAUTHORIZED);
    }

    info!("{} deleted message {}", me, message_id);
    Ok(StatusCode::NO_CONTENT)
}
