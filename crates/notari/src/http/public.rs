//! Public HTTP façade: publishes the verification key set and the host key,
//! nothing else.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info};

use crate::keys::jwks::JwkSet;

const MAX_HEADER_BYTES: usize = 100_000;
const IO_TIMEOUT: Duration = Duration::from_secs(2);

struct PublicState {
    public_jwks: JwkSet,
    host_key_authorized_keys: String,
}

pub fn router(public_jwks: JwkSet, host_key_authorized_keys: String) -> Router {
    let state = Arc::new(PublicState {
        public_jwks,
        host_key_authorized_keys,
    });

    Router::new()
        .route("/jwks.json", get(jwks_handler))
        .route("/host_key", get(host_key_handler))
        .layer(TimeoutLayer::new(IO_TIMEOUT))
        .with_state(state)
}

async fn jwks_handler(State(state): State<Arc<PublicState>>) -> impl IntoResponse {
    match serde_json::to_string_pretty(&state.public_jwks) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/jwk-set+json")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to serialize jwks");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn host_key_handler(State(state): State<Arc<PublicState>>) -> impl IntoResponse {
    (StatusCode::OK, state.host_key_authorized_keys.clone())
}

/// Serve the public façade on `address` until the process exits.
pub async fn serve(address: &str, public_jwks: JwkSet, host_key_authorized_keys: String) -> std::io::Result<()> {
    let app = router(public_jwks, host_key_authorized_keys);
    info!(address, "starting external http server");
    super::serve_with_header_limit(address, app, MAX_HEADER_BYTES).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn sample_jwks() -> JwkSet {
        JwkSet {
            keys: vec![crate::keys::jwks::RsaJwk {
                kty: "RSA".into(),
                kid: "k1".into(),
                alg: "RS256".into(),
                use_: Some("sig".into()),
                n: "n".into(),
                e: "e".into(),
                d: None,
                p: None,
                q: None,
                dp: None,
                dq: None,
                qi: None,
            }],
        }
    }

    #[tokio::test]
    async fn jwks_endpoint_serves_the_public_set() {
        let app = router(sample_jwks(), "ssh-rsa AAAA notari".to_string());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/jwks.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/jwk-set+json"
        );
    }

    #[tokio::test]
    async fn host_key_endpoint_serves_authorized_keys_line() {
        let app = router(sample_jwks(), "ssh-rsa AAAA notari".to_string());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/host_key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"ssh-rsa AAAA notari");
    }
}
