//! WebSocket handshake and delivery over a real socket.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use chirp_db::Database;
use chirp_gateway::TokenKeys;
use chirp_server::{ServerConfig, build_app};
use chirp_types::api::Claims;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "e2e-secret";

struct Server {
    addr: SocketAddr,
    db: Arc<Database>,
    keys: TokenKeys,
}

impl Server {
    async fn start() -> Self {
        let config = ServerConfig {
            jwt_secret: SECRET.into(),
            db_path: PathBuf::from(":memory:"),
            host: "127.0.0.1".into(),
            port: 0,
            token_ttl_hours: 1,
        };
        let db = Arc::new(Database::open_in_memory().unwrap());
        let app = build_app(db.clone(), &config);

        let listener = tokio::net::TcpListener::bind(config.bind_addr().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            db,
            keys: TokenKeys::from_secret(SECRET),
        }
    }

    fn user(&self, name: &str) -> (Uuid, String) {
        let id = Uuid::new_v4();
        self.db.create_user(&id.to_string(), name, "hash").unwrap();
        let token = self.keys.issue(id, chrono::Duration::hours(1)).unwrap();
        (id, token)
    }

    fn url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }

    async fn connect_with_query(&self, token: &str) -> Client {
        let (ws, _) = connect_async(format!("{}?token={}", self.url(), token))
            .await
            .unwrap();
        ws
    }

    async fn connect_with_header(&self, token: &str) -> Client {
        let mut req = self.url().into_client_request().unwrap();
        req.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        let (ws, _) = connect_async(req).await.unwrap();
        ws
    }

    /// Status and JSON body of a refused handshake.
    async fn rejected(&self, url: String) -> (u16, Value) {
        match connect_async(url).await {
            Err(WsError::Http(resp)) => {
                let body = resp
                    .body()
                    .as_deref()
                    .map(|raw| serde_json::from_slice(raw).unwrap())
                    .unwrap_or(Value::Null);
                (resp.status().as_u16(), body)
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("handshake should have been rejected"),
        }
    }
}

async fn next_frame(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send(ws: &mut Client, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

#[tokio::test]
async fn handshake_without_valid_token_is_refused() {
    let server = Server::start().await;

    let (status, body) = server.rejected(server.url()).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "MISSING_TOKEN");

    let (status, body) = server
        .rejected(format!("{}?token=not-a-jwt", server.url()))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "INVALID_TOKEN");

    let forged = TokenKeys::from_secret("other-secret")
        .issue(Uuid::new_v4(), chrono::Duration::hours(1))
        .unwrap();
    let (status, body) = server
        .rejected(format!("{}?token={}", server.url(), forged))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "INVALID_TOKEN");
}

#[tokio::test]
async fn token_without_user_claim_is_invalid_payload() {
    let server = Server::start().await;
    let claims = Claims {
        user_id: None,
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    let (status, body) = server
        .rejected(format!("{}?token={}", server.url(), token))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "INVALID_PAYLOAD");
}

#[tokio::test]
async fn admitted_connection_receives_ready_frame() {
    let server = Server::start().await;
    let (alice, token) = server.user("alice");

    let mut ws = server.connect_with_header(&token).await;
    let ready = next_frame(&mut ws).await;
    assert_eq!(ready["type"], "ready");
    assert_eq!(ready["data"]["userId"], alice.to_string());
}

#[tokio::test]
async fn mutual_followers_chat_through_the_gateway() {
    let server = Server::start().await;
    let (alice, alice_token) = server.user("alice");
    let (bob, bob_token) = server.user("bob");
    server.db.follow(&alice.to_string(), &bob.to_string()).unwrap();
    server.db.follow(&bob.to_string(), &alice.to_string()).unwrap();

    let mut a = server.connect_with_query(&alice_token).await;
    let mut b = server.connect_with_header(&bob_token).await;
    assert_eq!(next_frame(&mut a).await["type"], "ready");
    assert_eq!(next_frame(&mut b).await["type"], "ready");

    // Bob's own echo proves his join has been processed
    send(&mut b, json!({ "type": "join room", "data": { "receiverId": alice } })).await;
    send(
        &mut b,
        json!({ "type": "chat message", "data": { "msg": "anyone?", "receiverId": alice } }),
    )
    .await;
    assert_eq!(next_frame(&mut b).await["data"]["content"], "anyone?");

    send(&mut a, json!({ "type": "join room", "data": { "receiverId": bob } })).await;
    send(
        &mut a,
        json!({ "type": "chat message", "data": { "msg": "hi bob", "receiverId": bob } }),
    )
    .await;

    for ws in [&mut a, &mut b] {
        let frame = next_frame(ws).await;
        assert_eq!(frame["type"], "chat message");
        assert_eq!(frame["data"]["content"], "hi bob");
    }

    let stored = server
        .db
        .get_messages_between(&alice.to_string(), &bob.to_string())
        .unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn failed_write_reports_error_to_sender_only() {
    let server = Server::start().await;
    let (alice, alice_token) = server.user("alice");
    let (bob, bob_token) = server.user("bob");
    server.db.follow(&alice.to_string(), &bob.to_string()).unwrap();
    server.db.follow(&bob.to_string(), &alice.to_string()).unwrap();

    let mut a = server.connect_with_query(&alice_token).await;
    let mut b = server.connect_with_query(&bob_token).await;
    assert_eq!(next_frame(&mut a).await["type"], "ready");
    assert_eq!(next_frame(&mut b).await["type"], "ready");

    send(&mut b, json!({ "type": "join room", "data": { "receiverId": alice } })).await;
    send(
        &mut b,
        json!({ "type": "chat message", "data": { "msg": "anyone?", "receiverId": alice } }),
    )
    .await;
    assert_eq!(next_frame(&mut b).await["data"]["content"], "anyone?");

    // Every message insert now fails
    server
        .db
        .with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_messages BEFORE INSERT ON messages
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )?;
            Ok(())
        })
        .unwrap();

    send(&mut a, json!({ "type": "join room", "data": { "receiverId": bob } })).await;
    send(
        &mut a,
        json!({ "type": "chat message", "data": { "msg": "lost", "receiverId": bob } }),
    )
    .await;
    let frame = next_frame(&mut a).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["data"]["code"], "DELIVERY_CONFLICT");

    // The connection stays usable once writes recover, and bob's next
    // frame is the later message, not the failed one
    server
        .db
        .with_conn(|conn| {
            conn.execute_batch("DROP TRIGGER reject_messages;")?;
            Ok(())
        })
        .unwrap();
    send(
        &mut a,
        json!({ "type": "chat message", "data": { "msg": "retry", "receiverId": bob } }),
    )
    .await;
    assert_eq!(next_frame(&mut a).await["data"]["content"], "retry");
    assert_eq!(next_frame(&mut b).await["data"]["content"], "retry");

    let stored = server
        .db
        .get_messages_between(&alice.to_string(), &bob.to_string())
        .unwrap();
    let contents: Vec<&str> = stored.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["anyone?", "retry"]);
}
