#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for gating requests behind Interledger micropayments.
//!
//! A payer chooses an opaque [`PaymentToken`], streams value to a destination
//! advertised by the [`ChallengeGenerator`], and the [`PaymentReceiver`] credits
//! the [`BalanceLedger`] entry named by the correlation data of each settled
//! payment. At request time the [`PaymentGate`] debits that entry against the
//! resolved price and decides whether the request may proceed.
//!
//! This crate is transport- and framework-agnostic. The payment network is
//! reached through the [`Transport`] trait; HTTP integration lives in
//! `i402-http`.
//!
//! # Modules
//!
//! - [`token`] - Payer-chosen payment tokens
//! - [`ledger`] - Per-token balances with serialized credit/debit
//! - [`challenge`] - Destination address and shared secret derivation
//! - [`receiver`] - Inbound payment handling
//! - [`gate`] - Request-time payment decision
//! - [`transport`] - Payment transport abstraction and an in-process loopback
//! - [`error`] - Error types shared across the crate
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation (on by default)

pub mod challenge;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod receiver;
pub mod token;
pub mod transport;

pub use challenge::{ChallengeGenerator, PaymentChallenge, RootSecret, SharedSecret};
pub use error::{ChallengeError, LedgerError, ReceiveError, TokenError, TransportError};
pub use gate::{
    Announcement, GateDecision, GatePolicy, PaymentGate, PaymentGateBuilder, RejectReason,
    Rejection, Verdict,
};
pub use ledger::{BalanceLedger, LedgerConfig};
pub use receiver::{CreditOrdering, PaymentReceiver, Receipt};
pub use token::PaymentToken;
pub use transport::{
    Fulfill, Fulfillment, IncomingPayment, LoopbackTransport, PaymentHandler, Transport,
};

/// Exact decimal amount used for prices and balances.
pub use rust_decimal::Decimal;
