use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use chirp_api::AppStateInner;
use chirp_db::Database;
use chirp_gateway::{ChatEngine, Dispatcher, Handshake, TokenKeys, connection};

use crate::config::ServerConfig;

#[derive(Clone)]
struct ServerState {
    engine: ChatEngine,
    keys: TokenKeys,
}

#[derive(Serialize)]
struct HandshakeRejection {
    error: &'static str,
}

/// Full router: REST under `/api`, the chat socket at `/gateway`.
pub fn build_app(db: Arc<Database>, config: &ServerConfig) -> Router {
    let keys = TokenKeys::from_secret(&config.jwt_secret);

    let app_state = Arc::new(AppStateInner {
        db: db.clone(),
        keys: keys.clone(),
        token_ttl: config.token_ttl(),
    });

    // The database is both the follow oracle and the message store
    let engine = ChatEngine::new(Dispatcher::new(), db.clone(), db);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(ServerState { engine, keys });

    Router::new()
        .nest("/api", chirp_api::routes(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Authenticate before upgrading: a rejected handshake never reaches the
/// command handlers.
async fn ws_upgrade(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = match Handshake::from_request(&headers, query).authenticate(&state.keys) {
        Ok(user_id) => user_id,
        Err(e) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(HandshakeRejection { error: e.code() }),
            )
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.engine, user_id))
}
