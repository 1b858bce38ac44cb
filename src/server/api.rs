//! Admin HTTP API.
//!
//! | Route                       | Method | Purpose                              |
//! |-----------------------------|--------|--------------------------------------|
//! | `/health`                   | GET    | liveness                             |
//! | `/status`                   | GET    | uptime and open device connections   |
//! | `/clients`                  | GET    | clients with received / queued data  |
//! | `/clients/:id/data`         | GET    | received data by `path.key`          |
//! | `/clients/:id/data`         | POST   | queue settings for the device        |
//! | `/clients/:id/security`     | GET    | security profile, without secrets    |
//! | `/clients/:id/security`     | POST   | register a security profile          |

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::state::AppState;
use crate::codec::bysant::Value;
use crate::codec::pdu::Message;
use crate::protocol::{Authentication, Encryption, SecurityInfo};
use crate::store::ReceivedEnvelope;

/// Create the admin router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors_enabled = state.config.cors_enabled;
    let router = Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/clients", get(list_clients))
        .route("/clients/:id/data", get(get_data).post(post_data))
        .route("/clients/:id/security", get(get_security).post(post_security))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub active_connections: usize,
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime().as_secs(),
        active_connections: state.active_connections(),
    })
}

/// Clients known to the store
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientsResponse {
    #[serde(rename = "in")]
    pub incoming: BTreeSet<String>,
    #[serde(rename = "out")]
    pub outgoing: BTreeSet<String>,
}

async fn list_clients(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ClientsResponse {
        incoming: state.store.incoming_client_ids(),
        outgoing: state.store.outgoing_client_ids(),
    })
}

/// One received sample
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadData {
    /// Milliseconds since the epoch
    pub timestamp: i64,
    pub value: serde_json::Value,
}

/// Group received data by `path.key`, newest sample first.
pub fn map_received_data<'a>(
    envelopes: impl IntoIterator<Item = &'a ReceivedEnvelope>,
) -> BTreeMap<String, Vec<ReadData>> {
    let mut by_id: BTreeMap<String, Vec<ReadData>> = BTreeMap::new();
    for envelope in envelopes {
        for message in &envelope.messages {
            for (key, samples) in &message.data {
                by_id
                    .entry(format!("{}.{}", message.path, key))
                    .or_default()
                    .extend(samples.iter().map(|sample| ReadData {
                        timestamp: sample.timestamp_ms,
                        value: sample.value.to_json(),
                    }));
            }
        }
    }
    for samples in by_id.values_mut() {
        samples.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }
    by_id
}

async fn get_data(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let received = state.store.last_received_data(&id);
    Json(map_received_data(received.values()))
}

/// One setting to send to a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteData {
    /// `path.key`; the path is everything before the last dot
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteSettings {
    pub settings: Vec<WriteData>,
}

/// Build one message per path from settings.
///
/// Keys without a dot have no path and are skipped.
pub fn map_data_to_send(settings: &[WriteData]) -> Vec<Message> {
    let mut by_path: BTreeMap<&str, Message> = BTreeMap::new();
    for setting in settings {
        let Some((path, key)) = setting.key.rsplit_once('.') else {
            tracing::warn!(key = %setting.key, "setting without path skipped");
            continue;
        };
        by_path
            .entry(path)
            .or_insert_with(|| Message::new(path))
            .body
            .insert(key.to_string(), Value::from_json(&setting.value));
    }
    by_path.into_values().collect()
}

async fn post_data(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<WriteSettings>,
) -> impl IntoResponse {
    let messages = map_data_to_send(&req.settings);
    let queued = messages.len();
    if queued == 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "no setting with a path.key name"})),
        );
    }
    state.store.enqueue_data_to_send(&id, messages);
    (StatusCode::ACCEPTED, Json(serde_json::json!({"queued": queued})))
}

/// Security profile registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityRequest {
    #[serde(default)]
    pub authentication: Option<String>,
    #[serde(default)]
    pub encryption: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

async fn post_security(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SecurityRequest>,
) -> impl IntoResponse {
    let parsed = req
        .authentication
        .as_deref()
        .unwrap_or("none")
        .parse::<Authentication>()
        .and_then(|auth| {
            let enc = req.encryption.as_deref().unwrap_or("none").parse::<Encryption>()?;
            Ok((auth, enc))
        });
    let (authentication, encryption) = match parsed {
        Ok(pair) => pair,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    };

    let password = req.password.unwrap_or_default();
    if authentication != Authentication::None && password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "a password is required with authentication"})),
        );
    }
    if authentication == Authentication::None && encryption != Encryption::None {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "encryption requires authentication"})),
        );
    }

    let info = if authentication == Authentication::None {
        SecurityInfo::unsecured(id.as_str())
    } else {
        SecurityInfo::registered(id.as_str(), authentication, encryption, password)
    };
    state.security_store.add_security_info(info);
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": id,
            "authentication": authentication,
            "encryption": encryption,
        })),
    )
}

async fn get_security(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.security_store.security_info(&id) {
        Some(info) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": info.comm_id,
                "authentication": info.authentication,
                "encryption": info.encryption,
                "negotiated": info.credential().is_some(),
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "no security profile"})),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DataValue, ReceivedMessage};

    fn envelope(path: &str, key: &str, samples: Vec<DataValue>) -> ReceivedEnvelope {
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

    #[test]
    fn test_received_data_sorted_newest_first() {
        let first = envelope("@sys", "temp", vec![DataValue::new(1_000, 1i64)]);
        let second = envelope(
            "@sys",
            "temp",
            vec![DataValue::new(9_000, 3i64), DataValue::new(2_000, 2i64)],
        );

        let mapped = map_received_data([&first, &second]);
        let timestamps: Vec<i64> = mapped["@sys.temp"].iter().map(|d| d.timestamp).collect();
        assert_eq!(timestamps, vec![9_000, 2_000, 1_000]);
        assert_eq!(mapped["@sys.temp"][0].value, serde_json::json!(3));
    }

    #[test]
    fn test_data_to_send_grouped_by_path() {
        let settings = vec![
            WriteData {
                key: "@sys.cfg.rate".to_string(),
                value: serde_json::json!(5),
            },
            WriteData {
                key: "@sys.cfg.name".to_string(),
                value: serde_json::json!("pump"),
            },
            WriteData {
                key: "nopath".to_string(),
                value: serde_json::json!(1),
            },
        ];
        let messages = map_data_to_send(&settings);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].path, "@sys.cfg");
        assert_eq!(messages[0].body["rate"], Value::Int(5));
        assert_eq!(messages[0].body["name"], Value::Bytes(b"pump".to_vec()));
    }
}
