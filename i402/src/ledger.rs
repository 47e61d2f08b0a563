//! Per-token balance ledger.
//!
//! [`BalanceLedger`] maps payment tokens to exact decimal balances and exposes
//! only [`credit`](BalanceLedger::credit), [`debit`](BalanceLedger::debit) and
//! [`peek`](BalanceLedger::peek). Every read-modify-write on a token runs while
//! holding the map shard's write lock for that token, so a credit racing a
//! debit (or two credits racing each other) can never lose an update. No lock
//! is held across an `.await`.
//!
//! Entries are absent until the first credit and are removed once a debit
//! brings them to exactly zero. With [`LedgerConfig::entry_ttl`] set, an entry
//! whose last credit is older than the TTL reads as zero and is dropped by
//! [`purge_expired`](BalanceLedger::purge_expired).

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;

use crate::error::LedgerError;
use crate::token::PaymentToken;

/// Ledger behavior configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerConfig {
    /// How long an entry survives after its last credit. `None` keeps entries
    /// until they are spent.
    pub entry_ttl: Option<Duration>,
}

impl LedgerConfig {
    /// Sets the entry time-to-live.
    #[must_use]
    pub const fn with_entry_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = Some(ttl);
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    balance: Decimal,
    credited_at: Instant,
}

impl Slot {
    fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        ttl.is_some_and(|ttl| now.saturating_duration_since(self.credited_at) >= ttl)
    }
}

/// Shared, cheaply cloneable token balance ledger.
#[derive(Debug, Clone, Default)]
pub struct BalanceLedger {
    slots: Arc<DashMap<PaymentToken, Slot>>,
    config: LedgerConfig,
}

impl BalanceLedger {
    /// Creates an empty ledger whose entries never expire.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty ledger with the given configuration.
    #[must_use]
    pub fn with_config(config: LedgerConfig) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Returns the ledger configuration.
    #[must_use]
    pub const fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Adds `amount` to the token's balance and returns the new balance.
    ///
    /// Creates the entry when absent, except for zero credits which leave an
    /// absent token absent. An expired entry is replaced rather than topped up.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NegativeAmount`] for negative amounts and
    /// [`LedgerError::Overflow`] if the sum cannot be represented exactly.
    pub fn credit(&self, token: &PaymentToken, amount: Decimal) -> Result<Decimal, LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount(amount));
        }
        let now = Instant::now();
        match self.slots.entry(token.clone()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                let base = if slot.is_expired(self.config.entry_ttl, now) {
                    Decimal::ZERO
                } else {
                    slot.balance
                };
                let balance = base
                    .checked_add(amount)
                    .filter(|sum| is_exact_sum(base, amount, *sum))
                    .ok_or(LedgerError::Overflow)?;
                *slot = Slot {
                    balance,
                    credited_at: now,
                };
                Ok(balance)
            }
            Entry::Vacant(_) if amount.is_zero() => Ok(Decimal::ZERO),
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    balance: amount,
                    credited_at: now,
                });
                Ok(amount)
            }
        }
    }

    /// Subtracts `amount` from the token's balance and returns what remains.
    ///
    /// An entry debited to exactly zero is removed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientFunds`] when `amount` exceeds the
    /// balance; the ledger is left unchanged. Negative amounts are rejected
    /// with [`LedgerError::NegativeAmount`], and a difference that would lose
    /// precision with [`LedgerError::Overflow`].
    pub fn debit(&self, token: &PaymentToken, amount: Decimal) -> Result<Decimal, LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount(amount));
        }
        let now = Instant::now();
        match self.slots.entry(token.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(self.config.entry_ttl, now) {
                    occupied.remove();
                    return Self::debit_empty(amount);
                }
                let balance = occupied.get().balance;
                if amount > balance {
                    return Err(LedgerError::InsufficientFunds {
                        balance,
                        required: amount,
                    });
                }
                let remaining = balance
                    .checked_sub(amount)
                    .filter(|rest| is_exact_sum(*rest, amount, balance))
                    .ok_or(LedgerError::Overflow)?;
                if remaining.is_zero() {
                    occupied.remove();
                } else {
                    occupied.get_mut().balance = remaining;
                }
                Ok(remaining)
            }
            Entry::Vacant(_) => Self::debit_empty(amount),
        }
    }

    fn debit_empty(amount: Decimal) -> Result<Decimal, LedgerError> {
        if amount.is_zero() {
            Ok(Decimal::ZERO)
        } else {
            Err(LedgerError::InsufficientFunds {
                balance: Decimal::ZERO,
                required: amount,
            })
        }
    }

    /// Returns the token's current balance, zero when absent or expired.
    #[must_use]
    pub fn peek(&self, token: &PaymentToken) -> Decimal {
        let now = Instant::now();
        self.slots
            .get(token)
            .filter(|slot| !slot.is_expired(self.config.entry_ttl, now))
            .map_or(Decimal::ZERO, |slot| slot.balance)
    }

    /// Returns `true` if the token has a live entry.
    #[must_use]
    pub fn contains(&self, token: &PaymentToken) -> bool {
        let now = Instant::now();
        self.slots
            .get(token)
            .is_some_and(|slot| !slot.is_expired(self.config.entry_ttl, now))
    }

    /// Number of stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    ///
    /// A no-op when no TTL is configured.
    pub fn purge_expired(&self) -> usize {
        let Some(ttl) = self.config.entry_ttl else {
            return 0;
        };
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.is_expired(Some(ttl), now));
        before.saturating_sub(self.slots.len())
    }
}

/// `Decimal` arithmetic rounds once a result needs more than 28 significant
/// digits; `a + b == sum` must survive being undone in both directions.
fn is_exact_sum(a: Decimal, b: Decimal, sum: Decimal) -> bool {
    sum.checked_sub(a) == Some(b) && sum.checked_sub(b) == Some(a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn credits_sum_exactly() {
        let ledger = BalanceLedger::new();
        let token = PaymentToken::from("abc");
        for _ in 0..10 {
            ledger.credit(&token, dec("0.1")).unwrap();
        }
        ledger.credit(&token, dec("0.2")).unwrap();
        assert_eq!(ledger.peek(&token), dec("1.2"));
    }

    #[test]
    fn debit_within_balance_leaves_remainder() {
        let ledger = BalanceLedger::new();
        let token = PaymentToken::from("abc");
        ledger.credit(&token, dec("100")).unwrap();
        assert_eq!(ledger.debit(&token, dec("40")).unwrap(), dec("60"));
        assert_eq!(ledger.peek(&token), dec("60"));
    }

    #[test]
    fn debit_to_zero_removes_entry() {
        let ledger = BalanceLedger::new();
        let token = PaymentToken::from("abc");
        ledger.credit(&token, dec("2.5")).unwrap();
        assert_eq!(ledger.debit(&token, dec("2.50")).unwrap(), Decimal::ZERO);
        assert!(!ledger.contains(&token));
        assert!(ledger.is_empty());
        assert_eq!(ledger.peek(&token), Decimal::ZERO);
    }

    #[test]
    fn overdraw_fails_and_leaves_balance() {
        let ledger = BalanceLedger::new();
        let token = PaymentToken::from("abc");
        ledger.credit(&token, dec("5")).unwrap();
        assert_eq!(
            ledger.debit(&token, dec("5.01")),
            Err(LedgerError::InsufficientFunds {
                balance: dec("5"),
                required: dec("5.01"),
            })
        );
        assert_eq!(ledger.peek(&token), dec("5"));
    }

    #[test]
    fn debit_of_absent_token_fails_without_creating_entry() {
        let ledger = BalanceLedger::new();
        let token = PaymentToken::from("ghost");
        assert!(matches!(
            ledger.debit(&token, dec("1")),
            Err(LedgerError::InsufficientFunds { .. })
        ));
        assert!(ledger.is_empty());
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let ledger = BalanceLedger::new();
        let token = PaymentToken::from("abc");
        assert_eq!(
            ledger.credit(&token, dec("-1")),
            Err(LedgerError::NegativeAmount(dec("-1")))
        );
        assert_eq!(
            ledger.debit(&token, dec("-1")),
            Err(LedgerError::NegativeAmount(dec("-1")))
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn overflow_is_reported() {
        let ledger = BalanceLedger::new();
        let token = PaymentToken::from("abc");
        ledger.credit(&token, Decimal::MAX).unwrap();
        assert_eq!(ledger.credit(&token, dec("1")), Err(LedgerError::Overflow));
        assert_eq!(ledger.peek(&token), Decimal::MAX);
    }

    #[test]
    fn credit_that_would_round_is_refused() {
        let ledger = BalanceLedger::new();
        let token = PaymentToken::from("abc");
        let big = dec("10000000000000000000000000000");
        ledger.credit(&token, big).unwrap();
        assert_eq!(ledger.credit(&token, dec("0.1")), Err(LedgerError::Overflow));
        assert_eq!(ledger.peek(&token), big);
    }

    #[test]
    fn debit_that_would_round_is_refused() {
        let ledger = BalanceLedger::new();
        let token = PaymentToken::from("abc");
        let big = dec("10000000000000000000000000000");
        ledger.credit(&token, big).unwrap();
        for _ in 0..3 {
            assert_eq!(ledger.debit(&token, dec("0.1")), Err(LedgerError::Overflow));
        }
        assert_eq!(ledger.peek(&token), big);
        assert_eq!(ledger.debit(&token, dec("1")).unwrap(), big - dec("1"));
    }

    #[test]
    fn credit_replaces_expired_balance() {
        let config = LedgerConfig::default().with_entry_ttl(Duration::ZERO);
        let ledger = BalanceLedger::with_config(config);
        let token = PaymentToken::from("abc");
        ledger.credit(&token, dec("10")).unwrap();
        assert_eq!(ledger.credit(&token, dec("3")).unwrap(), dec("3"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn debit_of_expired_entry_removes_it() {
        let config = LedgerConfig::default().with_entry_ttl(Duration::ZERO);
        let ledger = BalanceLedger::with_config(config);
        let token = PaymentToken::from("abc");
        ledger.credit(&token, dec("10")).unwrap();
        assert_eq!(
            ledger.debit(&token, dec("1")),
            Err(LedgerError::InsufficientFunds {
                balance: Decimal::ZERO,
                required: dec("1"),
            })
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn expired_entries_read_as_zero_and_are_purged() {
        let config = LedgerConfig::default().with_entry_ttl(Duration::ZERO);
        let ledger = BalanceLedger::with_config(config);
        let token = PaymentToken::from("abc");
        ledger.credit(&token, dec("10")).unwrap();
        assert_eq!(ledger.peek(&token), Decimal::ZERO);
        assert_eq!(ledger.purge_expired(), 1);
        assert!(ledger.is_empty());
    }

    #[test]
    fn purge_without_ttl_keeps_everything() {
        let ledger = BalanceLedger::new();
        ledger.credit(&PaymentToken::from("a"), dec("1")).unwrap();
        assert_eq!(ledger.purge_expired(), 0);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_credits_all_land() {
        let ledger = BalanceLedger::new();
        let token = PaymentToken::from("race");
        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let ledger = ledger.clone();
                let token = token.clone();
                tokio::spawn(async move { ledger.credit(&token, dec("5")).unwrap() })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(ledger.peek(&token), dec("320"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_debits_never_overdraw() {
        let ledger = BalanceLedger::new();
        let token = PaymentToken::from("race");
        ledger.credit(&token, dec("10")).unwrap();
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let ledger = ledger.clone();
                let token = token.clone();
                tokio::spawn(async move { ledger.debit(&token, dec("1")).is_ok() })
            })
            .collect();
        let mut successes = 0;
        for task in tasks {
            if task.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 10);
        assert!(!ledger.contains(&token));
    }
}
