//! Payer-chosen payment tokens.
//!
//! A token names one accruing ledger balance. Its canonical form is 16 raw
//! bytes rendered as url-safe base64 without padding, which is exactly what a
//! payer embeds as correlation data in each payment. Tokens are bearer strings
//! and are not authenticated: anyone presenting a token spends its balance.

use std::fmt;

use base64::prelude::*;
use rand::RngExt;
use rand::rng;
use serde::{Deserialize, Serialize};

use crate::error::TokenError;

/// Length in bytes of the correlation data that identifies a token.
pub const TOKEN_BYTES: usize = 16;

/// Opaque bearer string identifying a ledger balance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentToken(String);

impl PaymentToken {
    /// Wraps an arbitrary token string as supplied by a payer.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Generates a fresh canonical token from 16 random bytes.
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; TOKEN_BYTES] = rng().random();
        Self(BASE64_URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Canonicalizes payment correlation data into a token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidLength`] unless `data` is exactly 16 bytes.
    pub fn from_correlation(data: &[u8]) -> Result<Self, TokenError> {
        if data.len() != TOKEN_BYTES {
            return Err(TokenError::InvalidLength(data.len()));
        }
        Ok(Self(BASE64_URL_SAFE_NO_PAD.encode(data)))
    }

    /// Decodes the token back into correlation bytes, if it is canonical.
    #[must_use]
    pub fn to_correlation(&self) -> Option<[u8; TOKEN_BYTES]> {
        let bytes = BASE64_URL_SAFE_NO_PAD.decode(&self.0).ok()?;
        bytes.try_into().ok()
    }

    /// Returns the token string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PaymentToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PaymentToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for PaymentToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
