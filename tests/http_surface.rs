//! End-to-end tests for the HTTP routes, driven through the router
//! without binding a socket.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sheetcast::http::router;
use sheetcast::{ChannelRegistry, LongPoll};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    router(LongPoll::new(Arc::new(ChannelRegistry::new())))
}

fn post_json(uri: &str, cookies: &str, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if !cookies.is_empty() {
        builder = builder.header(header::COOKIE, cookies);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn post_empty(uri: &str, cookies: &str) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if !cookies.is_empty() {
        builder = builder.header(header::COOKIE, cookies);
    }
    builder.body(Body::empty()).unwrap()
}

/// Collapse `Set-Cookie` headers into a `Cookie` request header value.
fn cookies_of(response: &axum::response::Response) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Open a session and return its id with the creator's cookies.
async fn open(app: &Router) -> (String, String) {
    let response = app
        .clone()
        .oneshot(post_json(
            "/session",
            "",
            json!({"ticker": "MSFT", "sheetName": "valuation"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = cookies_of(&response);
    let body = json_body(response).await;
    (body["sessionId"].as_str().unwrap().to_string(), cookies)
}

#[tokio::test]
async fn test_open_session_sets_identity_cookies() {
    let app = app();
    let response = app
        .oneshot(post_json("/session", "", json!({"ticker": "MSFT"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = cookies_of(&response);
    assert!(cookies.contains("idinsession=1"));

    let body = json_body(response).await;
    let session = body["sessionId"].as_str().unwrap();
    assert_eq!(session.len(), 6);
    assert!(cookies.contains(&format!("session={}", session)));
    assert_eq!(body["clientId"], 1);
    assert_eq!(body["cursor"], 0);
    assert_eq!(body["ticker"], "MSFT");
}

#[tokio::test]
async fn test_shared_session_hands_out_next_client_id() {
    let app = app();
    let (session, _) = open(&app).await;

    let response = app
        .clone()
        .oneshot(post_json("/sharedsession", "", json!({"sessionId": session})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(cookies_of(&response).contains("idinsession=2"));

    let body = json_body(response).await;
    assert_eq!(body["clientId"], 2);
    assert_eq!(body["sheetName"], "valuation");
}

#[tokio::test]
async fn test_broadcast_then_updates() {
    let app = app();
    let (_, cookies) = open(&app).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/broadcast",
            &cookies,
            json!({"kind": "edit", "payload": "A1=5"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let echo = json_body(response).await;
    assert_eq!(echo["sequence"], 1);
    assert_eq!(echo["originClientId"], 1);

    let response = app
        .clone()
        .oneshot(post_empty("/updates?cursor=0", &cookies))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["events"], json!([echo]));
}

#[tokio::test]
async fn test_waiting_update_is_resumed_by_broadcast() {
    let app = app();
    let (_, cookies) = open(&app).await;

    let poll = {
        let app = app.clone();
        let cookies = cookies.clone();
        tokio::spawn(async move { app.oneshot(post_empty("/updates?cursor=0", &cookies)).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    app.clone()
        .oneshot(post_json(
            "/broadcast",
            &cookies,
            json!({"kind": "edit", "payload": {"cell": "B2", "value": 7}}),
        ))
        .await
        .unwrap();

    let response = poll.await.unwrap().unwrap();
    let body = json_body(response).await;
    assert_eq!(body["events"][0]["payload"], json!({"cell": "B2", "value": 7}));
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = app();

    let response = app
        .clone()
        .oneshot(post_json("/sharedsession", "", json!({"sessionId": "NOPE00"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(post_empty("/updates?cursor=0", "session=NOPE00; idinsession=2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_broadcast_without_identity_is_bad_request() {
    let app = app();
    let (session, _) = open(&app).await;

    let response = app
        .oneshot(post_json(
            "/broadcast",
            &format!("session={}", session),
            json!({"kind": "edit", "payload": "A1=5"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_broadcast_is_bad_request() {
    let app = app();
    let (_, cookies) = open(&app).await;

    let response = app
        .clone()
        .oneshot(post_json("/broadcast", &cookies, json!({"kind": "edit", "payload": null})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing was appended
    let response = app
        .oneshot(post_json("/broadcast", &cookies, json!({"kind": "edit", "payload": "ok"})))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["sequence"], 1);
}

#[tokio::test]
async fn test_truncated_cursor_asks_for_resync() {
    let app = app();
    let (_, cookies) = open(&app).await;

    app.clone()
        .oneshot(post_json("/broadcast", &cookies, json!({"kind": "edit", "payload": "A1=5"})))
        .await
        .unwrap();

    let response = app
        .oneshot(post_empty("/updates?cursor=42", &cookies))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"resyncRequired": true, "cursor": 1})
    );
}
