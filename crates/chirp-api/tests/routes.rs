use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use chirp_api::{AppStateInner, routes};
use chirp_db::Database;
use chirp_gateway::auth::TokenKeys;
use chirp_gateway::store::MessageStore;

struct TestApp {
    db: Arc<Database>,
    keys: TokenKeys,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let keys = TokenKeys::from_secret("test-secret");
        let router = routes(Arc::new(AppStateInner {
            db: db.clone(),
            keys: keys.clone(),
            token_ttl: chrono::Duration::hours(1),
        }));
        Self { db, keys, router }
    }

    async fn call(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn signup(&self, username: &str) -> (Uuid, String) {
        let (status, body) = self
            .call(json_request(
                "POST",
                "/auth/signup",
                json!({ "username": username, "password": "hunter2hunter2" }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let token = body["token"].as_str().unwrap().to_string();
        let user_id = self.keys.verify(&token).unwrap();
        (user_id, token)
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn signup_then_login_issues_tokens_for_same_user() {
    let app = TestApp::new();
    let (user_id, _) = app.signup("alice").await;

    let (status, body) = app
        .call(json_request(
            "POST",
            "/auth/login",
            json!({ "username": "alice", "password": "hunter2hunter2" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap();
    assert_eq!(app.keys.verify(token).unwrap(), user_id);
}

#[tokio::test]
async fn signup_validates_and_rejects_duplicates() {
    let app = TestApp::new();
    app.signup("bob").await;

    let (status, _) = app
        .call(json_request(
            "POST",
            "/auth/signup",
            json!({ "username": "bob", "password": "another-password" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call(json_request(
            "POST",
            "/auth/signup",
            json!({ "username": "ab", "password": "long-enough" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(json_request(
            "POST",
            "/auth/signup",
            json!({ "username": "carol", "password": "short" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let app = TestApp::new();
    app.signup("dave").await;

    let (status, _) = app
        .call(json_request(
            "POST",
            "/auth/login",
            json!({ "username": "dave", "password": "not-the-password" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(json_request(
            "POST",
            "/auth/login",
            json!({ "username": "nobody", "password": "whatever1" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_report_auth_error_codes() {
    let app = TestApp::new();
    let uri = format!("/chat/{}", Uuid::new_v4());

    let req = Request::builder().uri(&uri).body(Body::empty()).unwrap();
    let (status, body) = app.call(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "MISSING_TOKEN");

    let (status, body) = app.call(authed("GET", &uri, "garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_TOKEN");
}

#[tokio::test]
async fn follow_is_idempotent_and_checks_target() {
    let app = TestApp::new();
    let (alice, token) = app.signup("alice").await;
    let (bob, _) = app.signup("bob").await;

    let uri = format!("/follower/follow/{}", bob);
    for _ in 0..2 {
        let (status, body) = app.call(authed("POST", &uri, &token)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["followerId"], alice.to_string());
        assert_eq!(body["followedId"], bob.to_string());
    }
    assert!(
        app.db
            .is_following(&alice.to_string(), &bob.to_string())
            .unwrap()
    );

    let (status, _) = app
        .call(authed("POST", &format!("/follower/follow/{}", alice), &token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(authed(
            "POST",
            &format!("/follower/follow/{}", Uuid::new_v4()),
            &token,
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(authed(
            "DELETE",
            &format!("/follower/unfollow/{}", bob),
            &token,
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(
        !app.db
            .is_following(&alice.to_string(), &bob.to_string())
            .unwrap()
    );
}

#[tokio::test]
async fn conversation_is_returned_oldest_first() {
    let app = TestApp::new();
    let (alice, token) = app.signup("alice").await;
    let (bob, _) = app.signup("bob").await;

    app.db.save_message(alice, bob, "first").unwrap();
    app.db.save_message(bob, alice, "second").unwrap();

    let (status, body) = app
        .call(authed("GET", &format!("/chat/{}", bob), &token))
        .await;
    assert_eq!(status, StatusCode::OK);

    let contents: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, ["first", "second"]);
    assert_eq!(body[1]["senderId"], bob.to_string());
}

#[tokio::test]
async fn only_sender_may_delete_message() {
    let app = TestApp::new();
    let (alice, alice_token) = app.signup("alice").await;
    let (bob, bob_token) = app.signup("bob").await;
    let message = app.db.save_message(alice, bob, "oops").unwrap();
    let uri = format!("/chat/{}", message.id);

    let (status, _) = app.call(authed("DELETE", &uri, &bob_token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call(authed("DELETE", &uri, &alice_token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(app.db.get_messages(alice, bob).unwrap().is_empty());
}
