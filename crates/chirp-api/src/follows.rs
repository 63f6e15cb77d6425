use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info};
use uuid::Uuid;

use chirp_types::models::Follow;

use crate::auth::AppState;
use crate::middleware::AuthUser;

/// Follow `user_id`. Following twice is a no-op.
pub async fn follow(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    if user_id == auth.user_id {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.db.clone();
    let follower = auth.user_id.to_string();
    let followed = user_id.to_string();
    let created = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<bool>> {
        if db.get_user_by_id(&followed)?.is_none() {
            return Ok(None);
        }
        db.follow(&follower, &followed).map(Some)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|e| {
        error!("Failed to follow {} -> {}: {}", auth.user_id, user_id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .ok_or(StatusCode::NOT_FOUND)?;

    if created {
        info!("{} now follows {}", auth.user_id, user_id);
    }

    Ok((
        StatusCode::CREATED,
        Json(Follow {
            follower_id: auth.user_id,
            followed_id: user_id,
        }),
    ))
}

pub async fn unfollow(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
) -> Result<StatusCode, StatusCode> {
    let db = state.db.clone();
    let follower = auth.user_id.to_string();
    let followed = user_id.to_string();
    tokio::task::spawn_blocking(move || db.unfollow(&follower, &followed))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Failed to unfollow {} -> {}: {}", auth.user_id, user_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(StatusCode::NO_CONTENT)
}
