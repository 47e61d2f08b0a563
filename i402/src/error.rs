//! Error types for the i402 core.
//!
//! Each component has its own error enum; [`ReceiveError`] wraps the ledger
//! and transport failures that can occur while handling an inbound payment.

use rust_decimal::Decimal;

/// Errors returned by [`BalanceLedger`](crate::BalanceLedger) mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The entry holds less than the requested debit.
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds {
        /// Balance at the time of the debit attempt.
        balance: Decimal,
        /// Amount that was requested.
        required: Decimal,
    },
    /// Credits and debits must be non-negative.
    #[error("amount must not be negative: {0}")]
    NegativeAmount(Decimal),
    /// The resulting balance does not fit the decimal representation.
    #[error("balance overflow")]
    Overflow,
}

/// Errors raised when building a [`PaymentToken`](crate::PaymentToken).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Correlation data must be exactly 16 bytes.
    #[error("invalid token length: expected 16 bytes, got {0}")]
    InvalidLength(usize),
}

/// Errors raised when parsing a `Pay` header into a challenge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    /// The header does not have exactly three space-separated fields.
    #[error("malformed Pay header: expected `<price> <destination> <secret>`")]
    Malformed,
    /// The price field is not a decimal number.
    #[error("invalid price in Pay header: {0}")]
    InvalidPrice(String),
}

/// Errors reported by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// An operation required a live connection.
    #[error("transport is not connected")]
    NotConnected,
    /// Establishing the connection failed.
    #[error("transport connect failed: {0}")]
    Connect(String),
    /// The sender rejected or never acknowledged the fulfillment.
    #[error("fulfillment failed: {0}")]
    Fulfill(String),
    /// The RPC method is not handled by this transport.
    #[error("unknown rpc method: {0}")]
    UnknownMethod(String),
    /// The RPC payload could not be interpreted.
    #[error("invalid rpc payload: {0}")]
    InvalidPayload(String),
}

/// Errors returned by the [`PaymentReceiver`](crate::PaymentReceiver).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiveError {
    /// Correlation data was not exactly 16 bytes. The payment was dropped.
    #[error("invalid token length: expected 16 bytes, got {0}")]
    InvalidTokenLength(usize),
    /// The payment was addressed to a destination this receiver never issued.
    #[error("payment addressed to unknown destination {0}")]
    UnknownDestination(String),
    /// Crediting the ledger failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The payment could not be fulfilled.
    #[error(transparent)]
    Fulfillment(TransportError),
}

impl ReceiveError {
    /// Returns `true` for malformed payments that were dropped without any
    /// ledger or transport side effect.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidTokenLength(_) | Self::UnknownDestination(_)
        )
    }
}

impl From<TokenError> for ReceiveError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidLength(len) => Self::InvalidTokenLength(len),
        }
    }
}
