//! Inbound payment handling.
//!
//! The [`PaymentReceiver`] is registered with a [`Transport`](crate::Transport)
//! and runs once per prepared payment. It canonicalizes the payment's 16-byte
//! correlation data into a [`PaymentToken`], credits the ledger and fulfills
//! the payment. Malformed payments are dropped without touching the ledger or
//! fulfilling.
//!
//! Whether the credit happens before or after the fulfillment is acknowledged
//! is selected with [`CreditOrdering`].

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::challenge::ChallengeGenerator;
use crate::error::ReceiveError;
use crate::ledger::BalanceLedger;
use crate::token::PaymentToken;
use crate::transport::{BoxFuture, IncomingPayment, PaymentHandler};

/// Order of the ledger credit relative to payment fulfillment.
///
/// Deserializes from `"after_fulfill"` / `"before_fulfill"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditOrdering {
    /// Fulfill first and credit only once fulfillment succeeded. A failed
    /// fulfillment credits nothing.
    #[default]
    AfterFulfill,
    /// Credit first, then fulfill. A failed fulfillment keeps the credit, so
    /// the token may spend value that never settled.
    BeforeFulfill,
}

/// Outcome of a successfully processed payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Token credited by the payment.
    pub token: PaymentToken,
    /// Amount credited.
    pub amount: Decimal,
    /// Token balance after the credit.
    pub balance: Decimal,
}

/// Credits the ledger for inbound payments.
#[derive(Debug, Clone)]
pub struct PaymentReceiver {
    ledger: BalanceLedger,
    challenges: Arc<ChallengeGenerator>,
    ordering: CreditOrdering,
}

impl PaymentReceiver {
    /// Creates a receiver crediting `ledger` for payments sent to addresses
    /// issued by `challenges`.
    #[must_use]
    pub fn new(ledger: BalanceLedger, challenges: Arc<ChallengeGenerator>) -> Self {
        Self {
            ledger,
            challenges,
            ordering: CreditOrdering::default(),
        }
    }

    /// Sets the credit ordering.
    #[must_use]
    pub const fn with_ordering(mut self, ordering: CreditOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Returns the configured credit ordering.
    #[must_use]
    pub const fn ordering(&self) -> CreditOrdering {
        self.ordering
    }

    /// Processes one prepared payment.
    ///
    /// # Errors
    ///
    /// - [`ReceiveError::InvalidTokenLength`] / [`ReceiveError::UnknownDestination`]
    ///   for malformed payments, which are neither credited nor fulfilled.
    /// - [`ReceiveError::Ledger`] if the credit cannot be applied.
    /// - [`ReceiveError::Fulfillment`] if settlement failed. Under
    ///   [`CreditOrdering::BeforeFulfill`] the credit has already been applied
    ///   and is not reversed.
    pub async fn receive(&self, payment: IncomingPayment) -> Result<Receipt, ReceiveError> {
        let IncomingPayment {
            amount,
            data,
            destination,
            fulfillment,
        } = payment;

        let token = PaymentToken::from_correlation(&data)?;
        if let Some(destination) = destination {
            if self.challenges.recognize(&destination).is_none() {
                return Err(ReceiveError::UnknownDestination(destination));
            }
        }

        match self.ordering {
            CreditOrdering::AfterFulfill => {
                fulfillment
                    .fulfill()
                    .await
                    .map_err(ReceiveError::Fulfillment)?;
                let balance = self.ledger.credit(&token, amount)?;
                Ok(Receipt {
                    token,
                    amount,
                    balance,
                })
            }
            CreditOrdering::BeforeFulfill => {
                let balance = self.ledger.credit(&token, amount)?;
                fulfillment
                    .fulfill()
                    .await
                    .map_err(ReceiveError::Fulfillment)?;
                Ok(Receipt {
                    token,
                    amount,
                    balance,
                })
            }
        }
    }

    /// Wraps the receiver as a transport callback that logs every outcome.
    #[must_use]
    pub fn into_handler(self) -> PaymentHandler {
        let receiver = Arc::new(self);
        Arc::new(move |payment: IncomingPayment| -> BoxFuture<'static, ()> {
            let receiver = Arc::clone(&receiver);
            Box::pin(async move {
                let result = receiver.receive(payment).await;
                log_outcome(&result);
            })
        })
    }
}

#[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
fn log_outcome(result: &Result<Receipt, ReceiveError>) {
    #[cfg(feature = "telemetry")]
    match result {
        Ok(receipt) => tracing::debug!(
            token = %receipt.token,
            amount = %receipt.amount,
            balance = %receipt.balance,
            "Received payment"
        ),
        Err(err) if err.is_protocol_violation() => {
            tracing::warn!(error = %err, "Dropped malformed payment");
        }
        Err(err) => tracing::error!(error = %err, "Failed to process incoming payment"),
    }
}
