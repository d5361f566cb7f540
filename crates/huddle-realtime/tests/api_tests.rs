//! Router-level tests for the HTTP surface.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use huddle_realtime::api::{AppState, create_router};
use huddle_realtime::ws::{Hub, HubConfig};

fn test_app() -> (Router, Arc<Hub>) {
    let hub = Arc::new(Hub::new(HubConfig::default()));
    let app = create_router(AppState::new(hub.clone()));
    (app, hub)
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn publish_request(uri: &str, event: &Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(event).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _hub) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["connections"], 0);
    assert_eq!(json["rooms"], 0);
}

#[tokio::test]
async fn test_publish_to_empty_room_delivers_nothing() {
    let (app, _hub) = test_app();

    let response = app
        .oneshot(publish_request(
            "/api/rooms/topic_42/events",
            &json!({"type": "new_message", "payload": {"id": "m1"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["delivered"], 0);
}

#[tokio::test]
async fn test_publish_reaches_room_members() {
    let (app, hub) = test_app();
    let mut alice = hub.register("alice").unwrap();
    hub.join(alice.conn_id, "topic_42").unwrap();

    let response = app
        .oneshot(publish_request(
            "/api/rooms/topic_42/events",
            &json!({"type": "new_message", "payload": {"id": "m1"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["delivered"], 1);

    let frame = alice.events.try_recv().unwrap();
    let event: Value = serde_json::from_str(frame.as_str()).unwrap();
    assert_eq!(event["type"], "new_message");
    assert_eq!(event["payload"]["id"], "m1");
}

#[tokio::test]
async fn test_broadcast_ignores_room_membership() {
    let (app, hub) = test_app();
    let mut alice = hub.register("alice").unwrap();
    let mut bob = hub.register("bob").unwrap();
    hub.join(alice.conn_id, "topic_42").unwrap();

    let response = app
        .oneshot(publish_request(
            "/api/events",
            &json!({"type": "announcement", "payload": {"text": "hi"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["delivered"], 2);
    assert!(alice.events.try_recv().is_ok());
    assert!(bob.events.try_recv().is_ok());
}

#[tokio::test]
async fn test_publish_rejects_envelope_without_type() {
    let (app, _hub) = test_app();

    let response = app
        .oneshot(publish_request(
            "/api/rooms/topic_42/events",
            &json!({"payload": {"id": "m1"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_ws_route_requires_user_param() {
    let (app, _hub) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/ws")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
