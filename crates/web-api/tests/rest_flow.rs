mod support;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use support::TestApp;

async fn call(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .expect("request");

    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new();
    let (status, _) = call(&app.router, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn api_requires_bearer_token() {
    let app = TestApp::new();
    let (status, body) = call(&app.router, Method::GET, "/api/v1/rooms", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn room_lifecycle_over_rest() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice").await;
    let (_, bob) = app.user("bob").await;
    let (_, carol) = app.user("carol").await;
    let router = &app.router;

    let (status, body) = call(
        router,
        Method::POST,
        "/api/v1/rooms",
        Some(&alice),
        Some(json!({ "name": "", "max_participants": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, room) = call(
        router,
        Method::POST,
        "/api/v1/rooms",
        Some(&alice),
        Some(json!({ "name": "pair", "description": "two seats", "max_participants": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(room["participants"][0]["display_name"], "alice");
    assert_eq!(room["admins"][0]["display_name"], "alice");
    let room_id = room["id"].as_str().expect("room id").to_string();

    let (status, _) = call(
        router,
        Method::POST,
        &format!("/api/v1/rooms/{room_id}/messages"),
        Some(&bob),
        Some(json!({ "content": "let me talk" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, joined) = call(
        router,
        Method::POST,
        &format!("/api/v1/rooms/{room_id}/join"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(joined["participants"].as_array().map(Vec::len), Some(2));

    let (status, body) = call(
        router,
        Method::POST,
        &format!("/api/v1/rooms/{room_id}/join"),
        Some(&carol),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CAPACITY_EXCEEDED");

    let (status, message) = call(
        router,
        Method::POST,
        &format!("/api/v1/rooms/{room_id}/messages"),
        Some(&bob),
        Some(json!({ "content": "hello", "type": "file" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["type"], "file");
    let message_id = message["id"].as_str().expect("message id").to_string();

    let (status, history) = call(
        router,
        Method::GET,
        &format!("/api/v1/rooms/{room_id}/messages?limit=10"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history[0]["content"], "hello");
    assert_eq!(history[0]["is_mine"], true);

    let (status, body) = call(
        router,
        Method::GET,
        &format!("/api/v1/rooms/{room_id}/messages?limit=101"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = call(
        router,
        Method::DELETE,
        &format!("/api/v1/messages/{message_id}"),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(
        router,
        Method::PUT,
        &format!("/api/v1/messages/{message_id}"),
        Some(&bob),
        Some(json!({ "content": "gone" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = call(
        router,
        Method::POST,
        &format!("/api/v1/rooms/{room_id}/leave"),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, room) = call(
        router,
        Method::GET,
        &format!("/api/v1/rooms/{room_id}"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(room["admins"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn private_rooms_are_not_listed_for_outsiders() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice").await;
    let (_, bob) = app.user("bob").await;

    let (_, room) = call(
        &app.router,
        Method::POST,
        "/api/v1/rooms",
        Some(&alice),
        Some(json!({ "name": "secret", "is_private": true })),
    )
    .await;
    let room_id = room["id"].as_str().expect("room id").to_string();

    let (_, rooms) = call(&app.router, Method::GET, "/api/v1/rooms", Some(&bob), None).await;
    assert_eq!(rooms.as_array().map(Vec::len), Some(0));

    let (status, _) = call(
        &app.router,
        Method::GET,
        &format!("/api/v1/rooms/{room_id}"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
