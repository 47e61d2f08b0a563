//! Error types for the payment gate middleware.

use i402::{Decimal, Rejection, TransportError};

use crate::error::HttpError;

/// Why the gate answered instead of the wrapped handler.
#[derive(Debug, thiserror::Error)]
pub enum PaygateError {
    /// The request cannot be paid for. Answered with `402`.
    #[error(transparent)]
    Rejected(Rejection),
    /// The payment transport could not be reached. Answered with `503`.
    #[error("Payment transport unavailable: {0}")]
    Transport(#[from] TransportError),
    /// The price source produced a negative price. Answered with `500`.
    #[error("Invalid price {0}")]
    InvalidPrice(Decimal),
    /// A payment header could not be encoded. Answered with `500`.
    #[error(transparent)]
    Header(#[from] HttpError),
}
