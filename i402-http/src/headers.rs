//! Encoding and decoding of the `Pay`, `Pay-Token` and `Pay-Balance` headers.
//!
//! Amounts are written in normalized decimal form (`60`, never `60.00`).

use std::str::FromStr;

use http::{HeaderMap, HeaderValue};
use i402::{Decimal, PaymentChallenge, PaymentToken};

use crate::constants::{PAY_BALANCE_HEADER, PAY_HEADER, PAY_TOKEN_HEADER};
use crate::error::HttpError;

/// Reads the payer's token from the `Pay-Token` header.
///
/// Absent, empty or non-ASCII values count as no token.
#[must_use]
pub fn payment_token(headers: &HeaderMap) -> Option<PaymentToken> {
    let value = headers.get(PAY_TOKEN_HEADER)?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| PaymentToken::from(value))
}

/// Encodes a challenge as a `Pay` header value.
///
/// # Errors
///
/// Returns [`HttpError::InvalidHeaderValue`] if the account address contains
/// characters not allowed in a header.
pub fn encode_pay(challenge: &PaymentChallenge) -> Result<HeaderValue, HttpError> {
    Ok(HeaderValue::from_str(&challenge.to_header_value())?)
}

/// Decodes a `Pay` header value.
///
/// # Errors
///
/// Returns [`HttpError`] if the value is not ASCII or not a valid challenge.
pub fn decode_pay(value: &HeaderValue) -> Result<PaymentChallenge, HttpError> {
    Ok(value.to_str()?.parse()?)
}

/// Encodes a balance as a `Pay-Balance` header value.
///
/// # Errors
///
/// Never fails for finite decimals; the `Result` mirrors the other encoders.
pub fn encode_balance(balance: Decimal) -> Result<HeaderValue, HttpError> {
    Ok(HeaderValue::from_str(&balance.normalize().to_string())?)
}

/// Decodes a `Pay-Balance` header value.
///
/// # Errors
///
/// Returns [`HttpError::InvalidBalance`] if the value is not a decimal.
pub fn decode_balance(value: &HeaderValue) -> Result<Decimal, HttpError> {
    let text = value.to_str()?;
    Decimal::from_str(text.trim()).map_err(|e| HttpError::InvalidBalance(e.to_string()))
}

/// Writes `Pay` and, when known, `Pay-Balance` into `headers`.
///
/// # Errors
///
/// Returns [`HttpError`] if either value cannot be encoded.
pub fn insert_payment_headers(
    headers: &mut HeaderMap,
    challenge: &PaymentChallenge,
    balance: Option<Decimal>,
) -> Result<(), HttpError> {
    headers.insert(PAY_HEADER, encode_pay(challenge)?);
    if let Some(balance) = balance {
        headers.insert(PAY_BALANCE_HEADER, encode_balance(balance)?);
    }
    Ok(())
}
