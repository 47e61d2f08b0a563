//! Error types for the HTTP transport layer.

use i402::ChallengeError;

/// Errors that can occur during payment header encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// A value could not be placed in a header.
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// A received header was not visible ASCII.
    #[error("header is not visible ASCII: {0}")]
    NotAscii(#[from] http::header::ToStrError),

    /// The `Pay` header did not parse.
    #[error("invalid Pay header: {0}")]
    Challenge(#[from] ChallengeError),

    /// The `Pay-Balance` header was not a decimal.
    #[error("invalid Pay-Balance header: {0}")]
    InvalidBalance(String),
}
