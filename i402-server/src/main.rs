//! i402 demo server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p i402-server --release
//!
//! # Run with custom config path
//! CONFIG=/path/to/config.toml cargo run -p i402-server
//!
//! # Configure logging level
//! RUST_LOG=debug cargo run -p i402-server
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `config.toml`)
//! - `HOST` - Override bind address (default: `0.0.0.0`)
//! - `PORT` - Override port (default: `4402`)
//! - `RUST_LOG` - Log level filter (default: `info`)

use std::sync::Arc;

use axum::http::{HeaderName, Method};
use i402::{Decimal, LoopbackTransport, PaymentGate};
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use i402_server::config::ServerConfig;
use i402_server::shutdown::SigDown;
use i402_server::sweeper::sweep_expired;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize tracing with RUST_LOG env filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Server failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        account = %config.account_address,
        price = %config.price,
        optional = config.optional,
        credit_ordering = ?config.credit_ordering,
        "Loaded configuration"
    );

    if config.price < Decimal::ZERO {
        return Err(format!("price must not be negative, got {}", config.price).into());
    }
    if config.rpc_secret.is_some() && config.rpc_secret().is_none() {
        tracing::warn!("rpc_secret not resolved (missing env var?) - RPC route disabled");
    }

    let transport = Arc::new(LoopbackTransport::new(config.account_address.clone()));
    let gate = Arc::new(
        PaymentGate::builder(transport)
            .ledger_config(config.ledger_config())
            .credit_ordering(config.credit_ordering)
            .build(),
    );

    let app = i402_server::app(Arc::clone(&gate), &config)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(cors::Any)
                .expose_headers([
                    HeaderName::from_static("pay"),
                    HeaderName::from_static("pay-balance"),
                ]),
        );

    let sig_down = SigDown::try_new()?;
    let shutdown = sig_down.cancellation_token();

    let sweeper = config.ledger_ttl_secs.map(|ttl| {
        tracing::info!(
            ttl_secs = ttl,
            interval_secs = config.sweep_interval().as_secs(),
            "Expiring idle balances"
        );
        tokio::spawn(sweep_expired(
            gate.ledger().clone(),
            config.sweep_interval(),
            shutdown.clone(),
        ))
    });

    let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
    tracing::info!("Listening on http://{}", config.socket_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    sig_down.recv().await;
    if let Some(sweeper) = sweeper {
        sweeper.await?;
    }

    tracing::info!("Server shut down gracefully");
    Ok(())
}
