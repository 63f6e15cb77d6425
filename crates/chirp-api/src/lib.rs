//! REST surface around the chat core: signup/login, follow edges and
//! conversation history.

pub mod auth;
pub mod chat;
pub mod follows;
pub mod middleware;

use axum::{
    Router,
    routing::{delete, get, post},
};

pub use auth::{AppState, AppStateInner};
pub use middleware::AuthUser;

/// All REST routes, unprefixed. The server mounts them under `/api`.
pub fn routes(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route(
            "/chat/{id}",
            get(chat::get_conversation).delete(chat::delete_message),
        )
        .route("/follower/follow/{user_id}", post(follows::follow))
        .route("/follower/unfollow/{user_id}", delete(follows::unfollow))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
