//! HTTP-specific constants for the i402 gate.

/// Response header advertising `"<price> <destination> <shared secret>"`.
pub const PAY_HEADER: &str = "Pay";

/// Request header carrying the payer's token.
pub const PAY_TOKEN_HEADER: &str = "Pay-Token";

/// Response header carrying the token's balance.
pub const PAY_BALANCE_HEADER: &str = "Pay-Balance";

/// CORS header name for exposing custom headers.
pub const ACCESS_CONTROL_EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";

/// Headers a browser payer must be allowed to read.
pub const EXPOSED_PAYMENT_HEADERS: &str = "Pay, Pay-Balance";

/// Path of the raw transport RPC route.
pub const RPC_PATH: &str = "/__ilp_rpc";
