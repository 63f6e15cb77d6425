use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use chirp_gateway::auth::{AuthError, bearer_token};

use crate::auth::AppState;

/// Identity of the caller, inserted into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// Extract and validate the JWT from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let user_id = {
        let auth_header = req
            .headers()
            .get(header::AUTHORIZATION)
            .ok_or_else(|| unauthorized(AuthError::MissingToken))?;
        let token = bearer_token(auth_header).map_err(unauthorized)?;
        state.keys.verify(token).map_err(unauthorized)?
    };

    req.extensions_mut().insert(AuthUser { user_id });
    Ok(next.run(req).await)
}

fn unauthorized(err: AuthError) -> Response {
    debug!("Request rejected: {}", err);
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": err.code() })),
    )
        .into_response()
}
