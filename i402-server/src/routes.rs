//! Demo routes.
//!
//! - `GET /health` - liveness probe
//! - `OPTIONS|GET /price` - announces the price and a payment destination
//! - `GET /paid` - charges the configured price and echoes the decision
//! - `POST /__ilp_rpc` - transport RPC, only when an RPC secret is configured

use std::sync::Arc;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::routing::{get, options};
use axum::{Json, Router};
use i402::{GateDecision, GatePolicy, PaymentGate, Transport};
use i402_http::server::{PayMiddleware, rpc_router};

use crate::config::ServerConfig;

/// Builds the demo router over a shared gate.
pub fn app<T>(gate: Arc<PaymentGate<T>>, config: &ServerConfig) -> Router
where
    T: Transport + 'static,
{
    let pay = PayMiddleware::from_shared(Arc::clone(&gate));
    let announce = pay.announce(config.price);
    let enforce = match config.policy() {
        GatePolicy::Required => pay.enforce(config.price),
        GatePolicy::Optional => pay.enforce(config.price).optional(),
    };

    let router = Router::new()
        .route("/health", get(health))
        .route("/price", options(price).get(price).layer(announce))
        .route("/paid", get(paid).layer(enforce));

    match config.rpc_secret() {
        Some(secret) => router.merge(rpc_router(gate, secret)),
        None => router,
    }
}

/// `GET /health` - Reports liveness and the crate version.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `OPTIONS|GET /price` - The gate sets the headers; the body stays empty.
async fn price() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// `GET /paid`
async fn paid(req: Request) -> Json<serde_json::Value> {
    let decision = req.extensions().get::<GateDecision>();
    Json(serde_json::json!({
        "message": "Thanks for paying!",
        "payment": decision,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Method;
    use i402::{Decimal, LoopbackTransport, PaymentToken};
    use i402_http::constants::{PAY_BALANCE_HEADER, PAY_HEADER, PAY_TOKEN_HEADER};
    use tower::ServiceExt;

    fn config(toml: &str) -> ServerConfig {
        ServerConfig::parse(toml, |_| None).unwrap()
    }

    fn gate() -> Arc<PaymentGate<Arc<LoopbackTransport>>> {
        Arc::new(PaymentGate::new(Arc::new(LoopbackTransport::new(
            "test.loopback.server",
        ))))
    }

    fn request(method: Method, uri: &str, token: Option<&str>) -> Request {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(PAY_TOKEN_HEADER, token);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = app(gate(), &config(""));
        let response = app
            .oneshot(request(Method::GET, "/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn price_announces_with_no_content() {
        let app = app(gate(), &config(""));
        for method in [Method::OPTIONS, Method::GET] {
            let response = app
                .clone()
                .oneshot(request(method, "/price", None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
            let pay = response.headers()[PAY_HEADER].to_str().unwrap();
            assert!(pay.starts_with("10 test.loopback.server."));
        }
    }

    #[tokio::test]
    async fn paid_charges_the_configured_price() {
        let gate = gate();
        let token = PaymentToken::from("abc");
        gate.ledger().credit(&token, Decimal::from(25)).unwrap();
        let app = app(Arc::clone(&gate), &config(r#"price = "10""#));

        let response = app
            .oneshot(request(Method::GET, "/paid", Some("abc")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[PAY_BALANCE_HEADER], "15");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["payment"]["paid"], true);
        assert_eq!(gate.balance(&token), Decimal::from(15));
    }

    #[tokio::test]
    async fn optional_config_lets_unpaid_requests_through() {
        let app = app(gate(), &config("optional = true"));
        let response = app
            .oneshot(request(Method::GET, "/paid", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rpc_route_requires_a_secret() {
        let without = app(gate(), &config(""));
        let response = without
            .oneshot(request(Method::POST, "/__ilp_rpc?method=send_payment", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let with = app(gate(), &config(r#"rpc_secret = "s3cret""#));
        let response = with
            .oneshot(request(Method::POST, "/__ilp_rpc?method=send_payment", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
