//! Payment transport abstraction.
//!
//! A [`Transport`] is the gate's connection to the payment network: it is
//! lazily connected, names the account under which challenges are issued,
//! delivers prepared inbound payments to a registered [`PaymentHandler`], and
//! forwards opaque RPC calls from the HTTP passthrough.
//!
//! [`LoopbackTransport`] is an in-process implementation that settles
//! payments locally.

mod loopback;

pub use loopback::LoopbackTransport;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::TransportError;

/// Boxed future returned by object-safe transport methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callback invoked by a transport for every prepared inbound payment.
pub type PaymentHandler = Arc<dyn Fn(IncomingPayment) -> BoxFuture<'static, ()> + Send + Sync>;

/// Connection to the payment network.
pub trait Transport: Send + Sync {
    /// Establishes the connection. Must be safe to call when already connected.
    fn connect(&self) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Returns `true` while the connection is usable.
    fn is_connected(&self) -> bool;

    /// Address of the account that receives payments.
    fn account_address(&self) -> String;

    /// Registers the callback that receives prepared inbound payments,
    /// replacing any previous one.
    fn set_payment_handler(&self, handler: PaymentHandler);

    /// Handles an opaque RPC call forwarded from the HTTP passthrough.
    fn rpc(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> BoxFuture<'_, Result<serde_json::Value, TransportError>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn connect(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        (**self).connect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn account_address(&self) -> String {
        (**self).account_address()
    }

    fn set_payment_handler(&self, handler: PaymentHandler) {
        (**self).set_payment_handler(handler);
    }

    fn rpc(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> BoxFuture<'_, Result<serde_json::Value, TransportError>> {
        (**self).rpc(method, payload)
    }
}

/// Settlement side of a prepared payment.
pub trait Fulfill: Send {
    /// Accepts the payment, releasing the sender's funds to the receiver.
    fn fulfill(self: Box<Self>) -> BoxFuture<'static, Result<(), TransportError>>;
}

/// One-shot handle that settles a prepared payment.
pub struct Fulfillment(Box<dyn Fulfill>);

impl Fulfillment {
    /// Wraps a transport-specific settlement handle.
    pub fn new(inner: impl Fulfill + 'static) -> Self {
        Self(Box::new(inner))
    }

    /// Settles the payment.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Fulfill`] if the sender did not accept it.
    pub async fn fulfill(self) -> Result<(), TransportError> {
        self.0.fulfill().await
    }
}

impl fmt::Debug for Fulfillment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Fulfillment")
    }
}

/// A prepared payment awaiting fulfillment.
#[derive(Debug)]
pub struct IncomingPayment {
    /// Amount being transferred.
    pub amount: Decimal,
    /// Correlation data chosen by the payer; names the ledger entry.
    pub data: Vec<u8>,
    /// Destination the payment was addressed to, when the transport reports it.
    pub destination: Option<String>,
    /// Settlement handle.
    pub fulfillment: Fulfillment,
}
