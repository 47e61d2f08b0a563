//! Destination and shared-secret derivation for payment challenges.
//!
//! Every gated response advertises a fresh [`PaymentChallenge`]: a destination
//! address under the server's account and a shared secret the payer uses to
//! encrypt and condition its payment. Both are derived from a process-wide
//! [`RootSecret`] and a per-challenge random nonce:
//!
//! ```text
//! receiver_id   = HMAC-SHA256(root, "ilp_psk_receiver_id")[..8]
//! shared_secret = HMAC-SHA256(HMAC-SHA256(root, "ilp_psk_generation"), nonce)[..16]
//! destination   = "<account>." || b64url(receiver_id) || b64url(nonce)
//! ```
//!
//! The receiver keeps no per-challenge state: [`ChallengeGenerator::recognize`]
//! re-derives the shared secret from the destination address alone. Guessing
//! another payer's shared secret requires the root secret.

use std::fmt;
use std::str::FromStr;

use base64::prelude::*;
use hmac::{Hmac, Mac};
use rand::RngExt;
use rand::rng;
use rust_decimal::Decimal;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::ChallengeError;

type HmacSha256 = Hmac<Sha256>;

const RECEIVER_ID_STRING: &[u8] = b"ilp_psk_receiver_id";
const GENERATION_STRING: &[u8] = b"ilp_psk_generation";

const RECEIVER_ID_BYTES: usize = 8;
const NONCE_BYTES: usize = 16;
const SHARED_SECRET_BYTES: usize = 16;

// b64url lengths without padding
const RECEIVER_ID_CHARS: usize = 11;
const NONCE_CHARS: usize = 22;

fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// 256-bit secret from which all challenges of one gate are derived.
#[derive(Clone)]
pub struct RootSecret([u8; 32]);

impl RootSecret {
    /// Generates a new random root secret.
    #[must_use]
    pub fn generate() -> Self {
        Self(rng().random())
    }

    /// Uses the given bytes as the root secret.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for RootSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RootSecret(<redacted>)")
    }
}

/// 128-bit secret shared between the receiver and one payer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SharedSecret([u8; SHARED_SECRET_BYTES]);

impl SharedSecret {
    /// Returns the raw secret bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SHARED_SECRET_BYTES] {
        &self.0
    }
}

impl fmt::Display for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE64_URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret({self})")
    }
}

impl FromStr for SharedSecret {
    type Err = ChallengeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = BASE64_URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| ChallengeError::Malformed)?;
        let bytes: [u8; SHARED_SECRET_BYTES] =
            bytes.try_into().map_err(|_| ChallengeError::Malformed)?;
        Ok(Self(bytes))
    }
}

/// Parameters advertised to a payer in the `Pay` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentChallenge {
    /// Price of the request.
    pub price: Decimal,
    /// Address the payer must send to.
    pub destination_address: String,
    /// Secret the payer uses for this destination.
    pub shared_secret: SharedSecret,
}

impl PaymentChallenge {
    /// Renders the challenge as `"<price> <destination> <secret>"`.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PaymentChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.price.normalize(),
            self.destination_address,
            self.shared_secret
        )
    }
}

impl FromStr for PaymentChallenge {
    type Err = ChallengeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_ascii_whitespace();
        let (Some(price), Some(destination), Some(secret), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ChallengeError::Malformed);
        };
        let price =
            Decimal::from_str(price).map_err(|_| ChallengeError::InvalidPrice(price.to_owned()))?;
        Ok(Self {
            price,
            destination_address: destination.to_owned(),
            shared_secret: secret.parse()?,
        })
    }
}

/// Derives challenges from a fixed root secret.
#[derive(Clone)]
pub struct ChallengeGenerator {
    receiver_id: [u8; RECEIVER_ID_BYTES],
    generation_key: [u8; 32],
}

impl fmt::Debug for ChallengeGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeGenerator")
            .field("receiver_id", &BASE64_URL_SAFE_NO_PAD.encode(self.receiver_id))
            .finish_non_exhaustive()
    }
}

impl ChallengeGenerator {
    /// Creates a generator bound to `root`.
    #[must_use]
    pub fn new(root: &RootSecret) -> Self {
        let id = hmac_sha256(&root.0, RECEIVER_ID_STRING);
        let mut receiver_id = [0u8; RECEIVER_ID_BYTES];
        receiver_id.copy_from_slice(&id[..RECEIVER_ID_BYTES]);
        Self {
            receiver_id,
            generation_key: hmac_sha256(&root.0, GENERATION_STRING),
        }
    }

    /// Produces a fresh challenge for `price` under `account_address`.
    #[must_use]
    pub fn generate(&self, account_address: &str, price: Decimal) -> PaymentChallenge {
        let nonce: [u8; NONCE_BYTES] = rng().random();
        PaymentChallenge {
            price,
            destination_address: format!(
                "{account_address}.{}{}",
                BASE64_URL_SAFE_NO_PAD.encode(self.receiver_id),
                BASE64_URL_SAFE_NO_PAD.encode(nonce)
            ),
            shared_secret: self.shared_secret_for(&nonce),
        }
    }

    /// Recovers the shared secret for an address this generator issued.
    ///
    /// Returns `None` if the address does not carry this receiver's id.
    #[must_use]
    pub fn recognize(&self, destination_address: &str) -> Option<SharedSecret> {
        let (account, suffix) = destination_address.rsplit_once('.')?;
        if account.is_empty()
            || !suffix.is_ascii()
            || suffix.len() != RECEIVER_ID_CHARS + NONCE_CHARS
        {
            return None;
        }
        let (id, nonce) = suffix.split_at(RECEIVER_ID_CHARS);
        let id = BASE64_URL_SAFE_NO_PAD.decode(id).ok()?;
        if !bool::from(id.as_slice().ct_eq(&self.receiver_id)) {
            return None;
        }
        let nonce = BASE64_URL_SAFE_NO_PAD.decode(nonce).ok()?;
        Some(self.shared_secret_for(&nonce))
    }

    fn shared_secret_for(&self, nonce: &[u8]) -> SharedSecret {
        let full = hmac_sha256(&self.generation_key, nonce);
        let mut secret = [0u8; SHARED_SECRET_BYTES];
        secret.copy_from_slice(&full[..SHARED_SECRET_BYTES]);
        SharedSecret(secret)
    }
}
