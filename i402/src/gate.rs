//! Request-time payment decision.
//!
//! [`PaymentGate`] owns the per-instance state shared by both gate modes: the
//! root-secret-derived [`ChallengeGenerator`], the [`BalanceLedger`] and the
//! [`Transport`]. Construction registers a [`PaymentReceiver`] with the
//! transport so that inbound payments credit the same ledger the gate debits.
//!
//! [`PaymentGate::evaluate`] is the single decision function. It returns a
//! [`Verdict`] when the request may proceed and a [`Rejection`] otherwise;
//! translating a rejection into a response is left to the HTTP layer.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::challenge::{ChallengeGenerator, PaymentChallenge, RootSecret};
use crate::error::{LedgerError, TransportError};
use crate::ledger::{BalanceLedger, LedgerConfig};
use crate::receiver::{CreditOrdering, PaymentReceiver};
use crate::token::PaymentToken;
use crate::transport::Transport;

/// Whether an unpaid request may still reach the handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GatePolicy {
    /// Reject requests that cannot be paid for.
    #[default]
    Required,
    /// Let unpaid requests through with `paid: false`.
    Optional,
}

/// Payment outcome attached to a request for downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    /// Token presented by the payer, if any.
    pub token: Option<PaymentToken>,
    /// Balance left on the token after this request.
    pub remaining_balance: Decimal,
    /// Whether the price was debited.
    pub paid: bool,
    /// Price resolved for this request.
    pub price: Decimal,
}

/// A request that may proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The price was zero; no gating took place.
    Free,
    /// The price was debited.
    Paid(GateDecision),
    /// The price could not be debited but the policy is optional.
    Unpaid(GateDecision),
}

impl Verdict {
    /// Returns the decision for gated requests.
    #[must_use]
    pub const fn decision(&self) -> Option<&GateDecision> {
        match self {
            Self::Free => None,
            Self::Paid(decision) | Self::Unpaid(decision) => Some(decision),
        }
    }
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No payment token was presented.
    MissingToken,
    /// The token holds no funds at all.
    NoFunds,
    /// The token holds less than the price.
    InsufficientFunds,
    /// The resolved price was negative.
    InvalidPrice,
}

/// A refused request, carrying what the payer needs to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Reason for the refusal.
    pub reason: RejectReason,
    /// Token presented by the payer, if any.
    pub token: Option<PaymentToken>,
    /// Current, unchanged balance of the token.
    pub balance: Decimal,
    /// Price resolved for this request.
    pub price: Decimal,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let price = self.price.normalize();
        let token = self.token.as_ref().map_or("", PaymentToken::as_str);
        match self.reason {
            RejectReason::MissingToken => f.write_str("No valid payment token provided"),
            RejectReason::NoFunds => write!(
                f,
                "Your Payment Token {token} has no funds available. It needs at least {price}"
            ),
            RejectReason::InsufficientFunds => write!(
                f,
                "Your Payment Token {token} does not have sufficient funds available (has: {}. It needs at least: {price})",
                self.balance.normalize()
            ),
            RejectReason::InvalidPrice => write!(f, "Invalid price {price}"),
        }
    }
}

impl std::error::Error for Rejection {}

/// What an announce-mode response advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// Fresh challenge for the resolved price.
    pub challenge: PaymentChallenge,
    /// Balance of the presented token, if one was presented.
    pub balance: Option<Decimal>,
}

/// Builder for [`PaymentGate`].
#[derive(Debug)]
pub struct PaymentGateBuilder<T> {
    transport: T,
    root_secret: Option<RootSecret>,
    ledger_config: LedgerConfig,
    credit_ordering: CreditOrdering,
}

impl<T: Transport> PaymentGateBuilder<T> {
    /// Uses a fixed root secret instead of generating one.
    #[must_use]
    pub fn root_secret(mut self, secret: RootSecret) -> Self {
        self.root_secret = Some(secret);
        self
    }

    /// Sets the ledger configuration.
    #[must_use]
    pub const fn ledger_config(mut self, config: LedgerConfig) -> Self {
        self.ledger_config = config;
        self
    }

    /// Sets when inbound payments are credited relative to fulfillment.
    #[must_use]
    pub const fn credit_ordering(mut self, ordering: CreditOrdering) -> Self {
        self.credit_ordering = ordering;
        self
    }

    /// Builds the gate and registers its payment receiver with the transport.
    #[must_use]
    pub fn build(self) -> PaymentGate<T> {
        let root = self.root_secret.unwrap_or_else(RootSecret::generate);
        let challenges = Arc::new(ChallengeGenerator::new(&root));
        let ledger = BalanceLedger::with_config(self.ledger_config);
        let receiver = PaymentReceiver::new(ledger.clone(), Arc::clone(&challenges))
            .with_ordering(self.credit_ordering);
        self.transport.set_payment_handler(receiver.into_handler());
        PaymentGate {
            transport: self.transport,
            ledger,
            challenges,
            connect_lock: Mutex::new(()),
        }
    }
}

/// Per-instance gate state shared by announce and enforce handling.
pub struct PaymentGate<T> {
    transport: T,
    ledger: BalanceLedger,
    challenges: Arc<ChallengeGenerator>,
    connect_lock: Mutex<()>,
}

impl<T> fmt::Debug for PaymentGate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentGate")
            .field("ledger_entries", &self.ledger.len())
            .field("challenges", &self.challenges)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> PaymentGate<T> {
    /// Creates a gate with a fresh root secret and default settings.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::builder(transport).build()
    }

    /// Starts configuring a gate.
    #[must_use]
    pub fn builder(transport: T) -> PaymentGateBuilder<T> {
        PaymentGateBuilder {
            transport,
            root_secret: None,
            ledger_config: LedgerConfig::default(),
            credit_ordering: CreditOrdering::default(),
        }
    }

    /// Returns the transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the ledger shared with the payment receiver.
    pub const fn ledger(&self) -> &BalanceLedger {
        &self.ledger
    }

    /// Connects the transport unless it already is.
    ///
    /// Concurrent callers wait for a single in-flight connect.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if connecting fails.
    pub async fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.transport.is_connected() {
            return Ok(());
        }
        let _guard = self.connect_lock.lock().await;
        if self.transport.is_connected() {
            return Ok(());
        }
        #[cfg(feature = "telemetry")]
        tracing::info!("Connecting payment transport");
        self.transport.connect().await
    }

    /// Generates a fresh challenge for `price`.
    #[must_use]
    pub fn challenge(&self, price: Decimal) -> PaymentChallenge {
        self.challenges
            .generate(&self.transport.account_address(), price)
    }

    /// Returns the current balance of `token`.
    #[must_use]
    pub fn balance(&self, token: &PaymentToken) -> Decimal {
        self.ledger.peek(token)
    }

    /// Builds the announce-mode advertisement. Never mutates the ledger.
    #[must_use]
    pub fn announce(&self, token: Option<&PaymentToken>, price: Decimal) -> Announcement {
        Announcement {
            challenge: self.challenge(price),
            balance: token.map(|token| self.ledger.peek(token)),
        }
    }

    /// Decides whether a request priced at `price` may proceed.
    ///
    /// A zero price bypasses the ledger entirely. Otherwise the price is
    /// debited from `token`; the ledger only changes when the result is
    /// [`Verdict::Paid`].
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] for a negative price, and under
    /// [`GatePolicy::Required`] when the token is missing or underfunded.
    pub fn evaluate(
        &self,
        token: Option<&PaymentToken>,
        price: Decimal,
        policy: GatePolicy,
    ) -> Result<Verdict, Rejection> {
        let reject = |reason, balance| Rejection {
            reason,
            token: token.cloned(),
            balance,
            price,
        };

        if price.is_zero() {
            return Ok(Verdict::Free);
        }
        if price < Decimal::ZERO {
            return Err(reject(RejectReason::InvalidPrice, Decimal::ZERO));
        }

        let Some(token) = token else {
            return match policy {
                GatePolicy::Required => Err(reject(RejectReason::MissingToken, Decimal::ZERO)),
                GatePolicy::Optional => Ok(Verdict::Unpaid(GateDecision {
                    token: None,
                    remaining_balance: Decimal::ZERO,
                    paid: false,
                    price,
                })),
            };
        };

        match self.ledger.debit(token, price) {
            Ok(remaining_balance) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(%token, %price, %remaining_balance, "Debited payment token");
                Ok(Verdict::Paid(GateDecision {
                    token: Some(token.clone()),
                    remaining_balance,
                    paid: true,
                    price,
                }))
            }
            Err(LedgerError::InsufficientFunds { balance, .. }) => match policy {
                GatePolicy::Required => {
                    let reason = if balance > Decimal::ZERO {
                        RejectReason::InsufficientFunds
                    } else {
                        RejectReason::NoFunds
                    };
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(%token, %price, %balance, ?reason, "Rejected unpaid request");
                    Err(reject(reason, balance))
                }
                GatePolicy::Optional => Ok(Verdict::Unpaid(GateDecision {
                    token: Some(token.clone()),
                    remaining_balance: balance,
                    paid: false,
                    price,
                })),
            },
            Err(LedgerError::NegativeAmount(_) | LedgerError::Overflow) => {
                Err(reject(RejectReason::InvalidPrice, self.ledger.peek(token)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackTransport;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn gate() -> PaymentGate<Arc<LoopbackTransport>> {
        PaymentGate::new(Arc::new(LoopbackTransport::new("test.server")))
    }

    #[test]
    fn paid_request_debits_ledger() {
        let gate = gate();
        let token = PaymentToken::from("abc");
        gate.ledger().credit(&token, dec("100")).unwrap();

        let verdict = gate
            .evaluate(Some(&token), dec("40"), GatePolicy::Required)
            .unwrap();
        assert_eq!(
            verdict,
            Verdict::Paid(GateDecision {
                token: Some(token.clone()),
                remaining_balance: dec("60"),
                paid: true,
                price: dec("40"),
            })
        );
        assert_eq!(gate.balance(&token), dec("60"));
    }

    #[test]
    fn zero_price_bypasses_token_requirement() {
        let gate = gate();
        assert_eq!(
            gate.evaluate(None, Decimal::ZERO, GatePolicy::Required),
            Ok(Verdict::Free)
        );
        assert!(gate.ledger().is_empty());
    }

    #[test]
    fn missing_token_is_rejected_when_required() {
        let gate = gate();
        let rejection = gate
            .evaluate(None, dec("10"), GatePolicy::Required)
            .unwrap_err();
        assert_eq!(rejection.reason, RejectReason::MissingToken);
        assert_eq!(rejection.to_string(), "No valid payment token provided");
        assert!(gate.ledger().is_empty());
    }

    #[test]
    fn missing_token_passes_unpaid_when_optional() {
        let gate = gate();
        let verdict = gate.evaluate(None, dec("10"), GatePolicy::Optional).unwrap();
        let decision = verdict.decision().unwrap();
        assert!(!decision.paid);
        assert_eq!(decision.token, None);
    }

    #[test]
    fn underfunded_token_is_rejected_without_debit() {
        let gate = gate();
        let token = PaymentToken::from("abc");
        gate.ledger().credit(&token, dec("5")).unwrap();

        let rejection = gate
            .evaluate(Some(&token), dec("10"), GatePolicy::Required)
            .unwrap_err();
        assert_eq!(rejection.reason, RejectReason::InsufficientFunds);
        assert_eq!(rejection.balance, dec("5"));
        assert_eq!(
            rejection.to_string(),
            "Your Payment Token abc does not have sufficient funds available (has: 5. It needs at least: 10)"
        );
        assert_eq!(gate.balance(&token), dec("5"));
    }

    #[test]
    fn empty_token_reports_no_funds() {
        let gate = gate();
        let token = PaymentToken::from("abc");
        let rejection = gate
            .evaluate(Some(&token), dec("10"), GatePolicy::Required)
            .unwrap_err();
        assert_eq!(rejection.reason, RejectReason::NoFunds);
        assert_eq!(
            rejection.to_string(),
            "Your Payment Token abc has no funds available. It needs at least 10"
        );
    }

    #[test]
    fn underfunded_token_passes_unpaid_when_optional() {
        let gate = gate();
        let token = PaymentToken::from("abc");
        gate.ledger().credit(&token, dec("5")).unwrap();

        let verdict = gate
            .evaluate(Some(&token), dec("10"), GatePolicy::Optional)
            .unwrap();
        assert_eq!(
            verdict,
            Verdict::Unpaid(GateDecision {
                token: Some(token.clone()),
                remaining_balance: dec("5"),
                paid: false,
                price: dec("10"),
            })
        );
        assert_eq!(gate.balance(&token), dec("5"));
    }

    #[test]
    fn negative_price_is_rejected() {
        let gate = gate();
        let rejection = gate
            .evaluate(Some(&PaymentToken::from("abc")), dec("-1"), GatePolicy::Optional)
            .unwrap_err();
        assert_eq!(rejection.reason, RejectReason::InvalidPrice);
    }

    #[test]
    fn announce_reports_balance_without_mutation() {
        let gate = gate();
        let token = PaymentToken::from("abc");
        gate.ledger().credit(&token, dec("3")).unwrap();

        let announcement = gate.announce(Some(&token), dec("1"));
        assert_eq!(announcement.balance, Some(dec("3")));
        assert!(
            announcement
                .challenge
                .destination_address
                .starts_with("test.server.")
        );
        assert_eq!(gate.announce(None, dec("1")).balance, None);
        assert_eq!(gate.balance(&token), dec("3"));
    }

    #[tokio::test]
    async fn ensure_connected_connects_once() {
        let transport = Arc::new(LoopbackTransport::new("test.server"));
        let gate = Arc::new(PaymentGate::new(Arc::clone(&transport)));
        let (a, b) = tokio::join!(gate.ensure_connected(), gate.ensure_connected());
        a.unwrap();
        b.unwrap();
        gate.ensure_connected().await.unwrap();
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn payments_through_transport_credit_the_gate_ledger() {
        let transport = Arc::new(LoopbackTransport::new("test.server"));
        let gate = PaymentGate::new(Arc::clone(&transport));
        gate.ensure_connected().await.unwrap();

        let destination = gate.challenge(dec("1")).destination_address;
        let fulfilled = transport
            .deliver(dec("25"), vec![9; 16], Some(destination))
            .await
            .unwrap();
        assert!(fulfilled);

        let token = PaymentToken::from_correlation(&[9; 16]).unwrap();
        assert_eq!(gate.balance(&token), dec("25"));
    }
}
