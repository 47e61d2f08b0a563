use std::str::FromStr;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use base64::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::oneshot;

use super::{BoxFuture, Fulfill, Fulfillment, IncomingPayment, PaymentHandler, Transport};
use crate::error::TransportError;

/// RPC method that delivers a payment through the loopback.
pub const SEND_PAYMENT_METHOD: &str = "send_payment";

/// In-process transport that settles payments locally.
///
/// Payments are injected with [`deliver`](Self::deliver) or through the
/// `send_payment` RPC method and handed straight to the registered
/// [`PaymentHandler`]. Fulfillment succeeds unless
/// [`set_fail_fulfillments`](Self::set_fail_fulfillments) is enabled.
pub struct LoopbackTransport {
    account: String,
    connected: AtomicBool,
    connects: AtomicUsize,
    fail_fulfillments: AtomicBool,
    handler: RwLock<Option<PaymentHandler>>,
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("account", &self.account)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct SendPaymentParams {
    amount: String,
    data: String,
    #[serde(default)]
    destination: Option<String>,
}

struct LoopbackFulfill {
    fail: bool,
    ack: oneshot::Sender<()>,
}

impl Fulfill for LoopbackFulfill {
    fn fulfill(self: Box<Self>) -> BoxFuture<'static, Result<(), TransportError>> {
        Box::pin(async move {
            if self.fail {
                return Err(TransportError::Fulfill("rejected by sender".to_owned()));
            }
            self.ack
                .send(())
                .map_err(|()| TransportError::Fulfill("sender went away".to_owned()))
        })
    }
}

impl LoopbackTransport {
    /// Creates a disconnected loopback for `account`.
    #[must_use]
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            fail_fulfillments: AtomicBool::new(false),
            handler: RwLock::new(None),
        }
    }

    /// Makes every subsequent fulfillment fail.
    pub fn set_fail_fulfillments(&self, fail: bool) {
        self.fail_fulfillments.store(fail, Ordering::SeqCst);
    }

    /// Number of times [`connect`](Transport::connect) established a connection.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Delivers a prepared payment and reports whether it was fulfilled.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] before the first connect.
    pub async fn deliver(
        &self,
        amount: Decimal,
        data: Vec<u8>,
        destination: Option<String>,
    ) -> Result<bool, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let handler = self
            .handler
            .read()
            .map_err(|_| TransportError::NotConnected)?
            .clone();
        let Some(handler) = handler else {
            return Ok(false);
        };

        let (ack, acked) = oneshot::channel();
        let payment = IncomingPayment {
            amount,
            data,
            destination,
            fulfillment: Fulfillment::new(LoopbackFulfill {
                fail: self.fail_fulfillments.load(Ordering::SeqCst),
                ack,
            }),
        };
        handler(payment).await;
        Ok(acked.await.is_ok())
    }

    async fn send_payment(
        &self,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let params: SendPaymentParams = serde_json::from_value(payload)
            .map_err(|e| TransportError::InvalidPayload(e.to_string()))?;
        let amount = Decimal::from_str(&params.amount)
            .map_err(|e| TransportError::InvalidPayload(format!("amount: {e}")))?;
        let data = BASE64_URL_SAFE_NO_PAD
            .decode(params.data.trim_end_matches('='))
            .map_err(|e| TransportError::InvalidPayload(format!("data: {e}")))?;
        let fulfilled = self.deliver(amount, data, params.destination).await?;
        Ok(serde_json::json!({ "fulfilled": fulfilled }))
    }
}

impl Transport for LoopbackTransport {
    fn connect(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if !self.connected.swap(true, Ordering::SeqCst) {
                self.connects.fetch_add(1, Ordering::SeqCst);
                #[cfg(feature = "telemetry")]
                tracing::info!(account = %self.account, "Loopback transport connected");
            }
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn account_address(&self) -> String {
        self.account.clone()
    }

    fn set_payment_handler(&self, handler: PaymentHandler) {
        if let Ok(mut slot) = self.handler.write() {
            *slot = Some(handler);
        }
    }

    fn rpc(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> BoxFuture<'_, Result<serde_json::Value, TransportError>> {
        let method = method.to_owned();
        Box::pin(async move {
            match method.as_str() {
                SEND_PAYMENT_METHOD => self.send_payment(payload).await,
                _ => Err(TransportError::UnknownMethod(method)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    fn recording_handler(seen: Arc<Mutex<Vec<Decimal>>>) -> PaymentHandler {
        Arc::new(move |payment: IncomingPayment| -> BoxFuture<'static, ()> {
            let seen = Arc::clone(&seen);
            Box::pin(async move {
                seen.lock().unwrap().push(payment.amount);
                let _ = payment.fulfillment.fulfill().await;
            })
        })
    }

    #[tokio::test]
    async fn deliver_requires_connection() {
        let transport = LoopbackTransport::new("test.loopback");
        let err = transport
            .deliver(Decimal::ONE, vec![0; 16], None)
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::NotConnected);
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let transport = LoopbackTransport::new("test.loopback");
        transport.connect().await.unwrap();
        transport.connect().await.unwrap();
        assert!(transport.is_connected());
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn delivered_payments_reach_handler_and_fulfill() {
        let transport = LoopbackTransport::new("test.loopback");
        transport.connect().await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        transport.set_payment_handler(recording_handler(Arc::clone(&seen)));

        let fulfilled = transport
            .deliver(Decimal::from(3), vec![1; 16], None)
            .await
            .unwrap();
        assert!(fulfilled);
        assert_eq!(*seen.lock().unwrap(), vec![Decimal::from(3)]);

        transport.set_fail_fulfillments(true);
        let fulfilled = transport
            .deliver(Decimal::from(4), vec![1; 16], None)
            .await
            .unwrap();
        assert!(!fulfilled);
    }

    #[tokio::test]
    async fn rpc_send_payment_decodes_payload() {
        let transport = LoopbackTransport::new("test.loopback");
        transport.connect().await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        transport.set_payment_handler(recording_handler(Arc::clone(&seen)));

        let reply = transport
            .rpc(
                SEND_PAYMENT_METHOD,
                serde_json::json!({ "amount": "2.5", "data": "AAAAAAAAAAAAAAAAAAAAAA" }),
            )
            .await
            .unwrap();
        assert_eq!(reply, serde_json::json!({ "fulfilled": true }));
        assert_eq!(*seen.lock().unwrap(), vec![Decimal::new(25, 1)]);
    }

    #[tokio::test]
    async fn rpc_rejects_unknown_method_and_bad_payload() {
        let transport = LoopbackTransport::new("test.loopback");
        transport.connect().await.unwrap();
        assert_eq!(
            transport.rpc("nope", serde_json::Value::Null).await,
            Err(TransportError::UnknownMethod("nope".to_owned()))
        );
        assert!(matches!(
            transport
                .rpc(SEND_PAYMENT_METHOD, serde_json::json!({ "amount": "x", "data": "" }))
                .await,
            Err(TransportError::InvalidPayload(_))
        ));
    }
}
