#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport layer for the i402 pay-per-request gate.
//!
//! Provides the payment header names and codecs and (feature-gated) tower
//! middleware that announces or enforces payment on axum routes.
//!
//! # Modules
//!
//! - [`constants`] - HTTP header names and the RPC path
//! - [`headers`] - `Pay`, `Pay-Token` and `Pay-Balance` encoding/decoding
//! - [`error`] - HTTP transport error types
//! - [`server`] - Payment gate middleware and RPC router (feature: `server`)
//!
//! # Feature Flags
//!
//! - `server` - Tower layer, price sources and RPC router (on by default)
//! - `telemetry` - Tracing spans and events for gate handling

pub mod constants;
pub mod error;
pub mod headers;

#[cfg(feature = "server")]
pub mod server;

pub use error::HttpError;
