use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{models::EntityId, AppState};

mod signature;

pub use signature::SignatureVerifier;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "fichaje::interactions";

use crate::{log_debug, log_info, log_warn};

const SIGNATURE_HEADER: &str = "x-signature-ed25519";
const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

const INTERACTION_PING: u8 = 1;
const INTERACTION_COMPONENT: u8 = 3;
const RESPONSE_PONG: u8 = 1;
const RESPONSE_CHANNEL_MESSAGE: u8 = 4;
const FLAG_EPHEMERAL: u64 = 1 << 6;

#[derive(Debug, Deserialize)]
struct Interaction {
    #[serde(rename = "type")]
    kind: u8,
    channel_id: Option<EntityId>,
    data: Option<ComponentData>,
}

#[derive(Debug, Deserialize)]
struct ComponentData {
    custom_id: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/interactions", post(interactions))
        .route("/health", get(health))
        .with_state(state)
}

/// Serves until `shutdown` is cancelled, then drains open connections.
pub async fn serve(listener: TcpListener, router: Router, shutdown: CancellationToken) -> Result<()> {
    let local = listener
        .local_addr()
        .context("listener has no local address")?;
    log_info!("Interactions endpoint listening on {local}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("interactions server failed")
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn interactions(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
    let verified = match (header(SIGNATURE_HEADER), header(TIMESTAMP_HEADER)) {
        (Some(signature), Some(timestamp)) => state.verifier.verify(signature, timestamp, &body),
        _ => false,
    };
    if !verified {
        log_warn!("Rejected interaction with a missing or invalid signature");
        return (StatusCode::UNAUTHORIZED, "invalid request signature").into_response();
    }

    let interaction: Interaction = match serde_json::from_slice(&body) {
        Ok(interaction) => interaction,
        Err(err) => {
            log_warn!("Undecodable interaction payload: {err}");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match interaction {
        Interaction {
            kind: INTERACTION_PING,
            ..
        } => Json(json!({ "type": RESPONSE_PONG })).into_response(),
        Interaction {
            kind: INTERACTION_COMPONENT,
            channel_id: Some(channel),
            data: Some(data),
        } => {
            log_debug!("Button '{}' pressed in channel {channel}", data.custom_id);
            let outcome = state.handler.handle_custom_id(channel, &data.custom_id).await;
            Json(json!({
                "type": RESPONSE_CHANNEL_MESSAGE,
                "data": { "content": outcome.reply, "flags": FLAG_EPHEMERAL },
            }))
            .into_response()
        }
        other => {
            log_warn!("Unsupported interaction type {}", other.kind);
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing::Harness, tracker::SessionStatus};
    use axum::{body::Body, http::Request};
    use ed25519_dalek::{Signer, SigningKey};
    use std::sync::Arc;
    use tower::ServiceExt;

    const TALLER: EntityId = EntityId::new(555);

    struct Fixture {
        harness: Harness,
        signing: SigningKey,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                harness: Harness::new(1.0, None),
                signing: SigningKey::from_bytes(&[7; 32]),
            }
        }

        fn router(&self) -> Router {
            router(AppState {
                handler: Arc::new(self.harness.handler.clone()),
                verifier: Arc::new(SignatureVerifier::from_key(self.signing.verifying_key())),
            })
        }

        fn signed_request(&self, body: serde_json::Value) -> Request<Body> {
            let body = body.to_string();
            let timestamp = "1717401600";
            let signature = self.signing.sign(format!("{timestamp}{body}").as_bytes());
            Request::post("/interactions")
                .header("content-type", "application/json")
                .header(SIGNATURE_HEADER, hex::encode(signature.to_bytes()))
                .header(TIMESTAMP_HEADER, timestamp)
                .body(Body::from(body))
                .unwrap()
        }
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let fixture = Fixture::new();
        let response = fixture
            .router()
            .oneshot(fixture.signed_request(json!({ "type": 1 })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "type": 1 }));
    }

    #[tokio::test]
    async fn unsigned_request_is_rejected() {
        let fixture = Fixture::new();
        let request = Request::post("/interactions")
            .body(Body::from(json!({ "type": 1 }).to_string()))
            .unwrap();

        let response = fixture.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn tampered_body_is_rejected() {
        let fixture = Fixture::new();
        let mut request = fixture.signed_request(json!({ "type": 1 }));
        *request.body_mut() = Body::from(json!({ "type": 2 }).to_string());

        let response = fixture.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn button_press_clocks_in_and_answers_ephemerally() {
        let fixture = Fixture::new();
        let request = fixture.signed_request(json!({
            "type": 3,
            "channel_id": TALLER.to_string(),
            "data": { "custom_id": "ingreso", "component_type": 2 },
        }));

        let response = fixture.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({
                "type": 4,
                "data": { "content": "✅ Has fichado tu **entrada**.", "flags": 64 },
            })
        );

        let report = fixture.harness.tracker.query(TALLER).await.unwrap();
        assert_eq!(report.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn unsupported_interaction_is_a_bad_request() {
        let fixture = Fixture::new();
        let response = fixture
            .router()
            .oneshot(fixture.signed_request(json!({ "type": 2, "channel_id": "1" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_needs_no_signature() {
        let fixture = Fixture::new();
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let response = fixture.router().oneshot(request).await.unwrap();
        assert_eq!(json_body(response).await, json!({ "status": "ok" }));
    }
}
