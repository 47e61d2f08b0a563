//! Demo server for the i402 pay-per-request gate.
//!
//! Serves a priced route behind an in-process loopback transport, with an
//! optional RPC route for injecting payments.
//!
//! # Modules
//!
//! - [`config`] - Server configuration with environment variable expansion
//! - [`error`] - Configuration error types
//! - [`routes`] - Axum router with the demo routes
//! - [`shutdown`] - Signal handling for graceful shutdown
//! - [`sweeper`] - Background removal of expired balances

pub mod config;
pub mod error;
pub mod routes;
pub mod shutdown;
pub mod sweeper;

pub use config::ServerConfig;
pub use routes::app;
