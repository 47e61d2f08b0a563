//! Axum middleware for gating routes behind Interledger micropayments.
//!
//! A [`PayMiddleware`] wraps one shared [`PaymentGate`](i402::PaymentGate) and
//! produces a [`PayLayer`] per route. Announce layers only advertise; enforce
//! layers debit the payer's `Pay-Token` balance before the route runs and
//! answer `402 Payment Required` when it is too low.
//!
//! ```ignore
//! let transport = Arc::new(LoopbackTransport::new("test.example"));
//! let pay = PayMiddleware::new(PaymentGate::new(transport));
//! let app = Router::new()
//!     .route("/price", get(price).layer(pay.announce(Decimal::from(10))))
//!     .route("/paid", get(paid).layer(pay.enforce(Decimal::from(10))));
//! ```
//!
//! The raw transport RPC route is built by [`rpc_router`].

pub mod error;
pub mod layer;
pub mod paygate;
pub mod price_source;
pub mod rpc;

pub use error::PaygateError;
pub use layer::{GateMode, PayLayer, PayMiddleware, PayService};
pub use price_source::{DynamicPrice, PriceSource, StaticPrice};
pub use rpc::{RpcError, rpc_router};
