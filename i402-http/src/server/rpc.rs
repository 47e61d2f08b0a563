//! Raw RPC passthrough to the payment transport.
//!
//! `POST /__ilp_rpc?method=<m>` forwards the JSON body to
//! [`Transport::rpc`] and answers with the transport's reply. Callers must
//! present `Authorization: Bearer <secret>`; the secret is compared in
//! constant time.
//!
//! | Outcome                    | Status |
//! |----------------------------|--------|
//! | missing or wrong bearer    | `401`  |
//! | missing `method`           | `400`  |
//! | body is not JSON           | `400`  |
//! | transport error            | `422`  |
//! | success                    | `200`  |

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use http::{HeaderMap, StatusCode, header};
use i402::{PaymentGate, Transport, TransportError};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::constants::RPC_PATH;

/// Query string of an RPC call.
#[derive(Debug, Deserialize)]
struct RpcParams {
    method: Option<String>,
    /// Ledger prefix sent by Interledger RPC clients. Only logged.
    #[serde(default)]
    #[cfg_attr(not(feature = "telemetry"), allow(dead_code))]
    prefix: Option<String>,
}

struct RpcState<T> {
    gate: Arc<PaymentGate<T>>,
    secret: String,
}

/// Errors answered by the RPC route.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The bearer token was absent or did not match.
    #[error("Unauthorized")]
    Unauthorized,
    /// The `method` query parameter was absent.
    #[error("Missing method query parameter")]
    MissingMethod,
    /// The body was not JSON.
    #[error("Invalid JSON body: {0}")]
    InvalidBody(String),
    /// The transport rejected the call.
    #[error("{0}")]
    Transport(#[from] TransportError),
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()).into_response(),
            Self::MissingMethod | Self::InvalidBody(_) => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            Self::Transport(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({ "error": self.to_string() })),
            )
                .into_response(),
        }
    }
}

/// Builds a router serving the RPC route for `gate`'s transport.
///
/// Merge it into the application router. Requests must carry
/// `Authorization: Bearer <secret>`.
pub fn rpc_router<T>(gate: Arc<PaymentGate<T>>, secret: impl Into<String>) -> Router
where
    T: Transport + 'static,
{
    let state = Arc::new(RpcState {
        gate,
        secret: secret.into(),
    });
    Router::new()
        .route(RPC_PATH, post(handle_rpc::<T>))
        .with_state(state)
}

async fn handle_rpc<T>(
    State(state): State<Arc<RpcState<T>>>,
    Query(params): Query<RpcParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, RpcError>
where
    T: Transport + 'static,
{
    if !is_authorized(&headers, &state.secret) {
        return Err(RpcError::Unauthorized);
    }
    let method = params.method.ok_or(RpcError::MissingMethod)?;
    let payload = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| RpcError::InvalidBody(e.to_string()))?
    };

    #[cfg(feature = "telemetry")]
    tracing::debug!(%method, prefix = ?params.prefix, "Forwarding RPC call to transport");

    state.gate.ensure_connected().await?;
    let reply = state.gate.transport().rpc(&method, payload).await?;
    Ok(Json(reply))
}

fn is_authorized(headers: &HeaderMap, secret: &str) -> bool {
    let Some(presented) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    else {
        return false;
    };
    presented.as_bytes().ct_eq(secret.as_bytes()).into()
}
