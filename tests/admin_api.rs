//! Admin HTTP API tests, driven through the router without a socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use m3da::codec::{Message, Value};
use m3da::server::{create_router, AppState, ServerConfig};
use m3da::store::{DataValue, ReceivedEnvelope, ReceivedMessage};
use m3da::{Authentication, Encryption, InMemoryStore, SecurityStore, Store};
use serde_json::{json, Value as Json};
use tower::ServiceExt;

fn setup() -> (Arc<InMemoryStore>, Router) {
    let store = Arc::new(InMemoryStore::new(10));
    let app = Arc::new(AppState::new(ServerConfig::default(), store.clone()));
    (store, create_router(app))
}

async fn call(router: Router, request: Request<Body>) -> (StatusCode, Json) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Json::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Json) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn received(path: &str, key: &str, samples: Vec<DataValue>) -> ReceivedEnvelope {
    let mut message = ReceivedMessage {
        path: path.to_string(),
        ..Default::default()
    };
    message.data.insert(key.to_string(), samples);
    ReceivedEnvelope {
        reception_ms: 0,
        messages: vec![message],
    }
}

#[tokio::test]
async fn test_health() {
    let (_store, router) = setup();
    let (status, body) = call(router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], m3da::VERSION);
}

#[tokio::test]
async fn test_status_reports_connections() {
    let (_store, router) = setup();
    let (status, body) = call(router, get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_connections"], 0);
}

#[tokio::test]
async fn test_list_clients() {
    let (store, router) = setup();
    store.enqueue_received_data("dev-in", 1, received("@sys", "t", vec![DataValue::new(1, 1i64)]));
    store.enqueue_data_to_send("dev-out", vec![Message::new("@sys").with("x", 1i64)]);

    let (status, body) = call(router, get("/clients")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"in": ["dev-in"], "out": ["dev-out"]}));
}

#[tokio::test]
async fn test_get_data_newest_first() {
    let (store, router) = setup();
    store.enqueue_received_data(
        "dev",
        10,
        received("@sys.env", "temp", vec![DataValue::new(1_000, 20i64)]),
    );
    store.enqueue_received_data(
        "dev",
        20,
        received("@sys.env", "temp", vec![DataValue::new(5_000, 22i64)]),
    );

    let (status, body) = call(router, get("/clients/dev/data")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"@sys.env.temp": [
            {"timestamp": 5000, "value": 22},
            {"timestamp": 1000, "value": 20},
        ]})
    );
}

#[tokio::test]
async fn test_unknown_client_has_no_data() {
    let (_store, router) = setup();
    let (status, body) = call(router, get("/clients/nobody/data")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn test_post_settings_queues_messages() {
    let (store, router) = setup();
    let request = post(
        "/clients/dev/data",
        json!({"settings": [
            {"key": "@sys.cfg.rate", "value": 60},
            {"key": "@sys.cfg.label", "value": "north"},
            {"key": "@app.on", "value": true},
        ]}),
    );

    let (status, body) = call(router, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["queued"], 2);

    let queued = store.pop_data_to_send("dev").unwrap();
    assert_eq!(queued.len(), 2);
    let cfg = queued.iter().find(|m| m.path == "@sys.cfg").unwrap();
    assert_eq!(cfg.body["rate"], Value::Int(60));
    assert_eq!(cfg.body["label"], Value::Bytes(b"north".to_vec()));
    let app = queued.iter().find(|m| m.path == "@app").unwrap();
    assert_eq!(app.body["on"], Value::Bool(true));
}

#[tokio::test]
async fn test_post_settings_without_path_rejected() {
    let (store, router) = setup();
    let request = post(
        "/clients/dev/data",
        json!({"settings": [{"key": "rate", "value": 1}]}),
    );
    let (status, body) = call(router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert!(store.outgoing_client_ids().is_empty());
}

#[tokio::test]
async fn test_register_security_profile() {
    let (store, router) = setup();
    let request = post(
        "/clients/dev/security",
        json!({"authentication": "hmac-sha1", "encryption": "aes-cbc-128", "password": "reg"}),
    );
    let (status, _) = call(router.clone(), request).await;
    assert_eq!(status, StatusCode::CREATED);

    let info = store.security_info("dev").unwrap();
    assert_eq!(info.authentication, Authentication::HmacSha1);
    assert_eq!(info.encryption, Encryption::AesCbc128);
    assert_eq!(info.shared_key.as_deref(), Some("reg"));
    assert!(info.needs_negotiation());

    let (status, body) = call(router, get("/clients/dev/security")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authentication"], "hmac-sha1");
    assert_eq!(body["negotiated"], false);
    assert!(body.get("password").is_none());
}

#[tokio::test]
async fn test_register_security_rejects_bad_profiles() {
    let (store, router) = setup();

    let unknown = post(
        "/clients/dev/security",
        json!({"authentication": "rot13", "password": "x"}),
    );
    assert_eq!(call(router.clone(), unknown).await.0, StatusCode::BAD_REQUEST);

    let no_password = post("/clients/dev/security", json!({"authentication": "hmac-md5"}));
    assert_eq!(call(router.clone(), no_password).await.0, StatusCode::BAD_REQUEST);

    let cipher_only = post(
        "/clients/dev/security",
        json!({"authentication": "none", "encryption": "aes-ctr-128"}),
    );
    assert_eq!(call(router, cipher_only).await.0, StatusCode::BAD_REQUEST);

    assert!(store.security_info("dev").is_none());
}

#[tokio::test]
async fn test_missing_security_profile() {
    let (_store, router) = setup();
    let (status, _) = call(router, get("/clients/ghost/security")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
