//! Periodic removal of expired ledger balances.

use std::time::Duration;

use i402::BalanceLedger;
use tokio_util::sync::CancellationToken;

/// Purges expired entries from `ledger` every `interval` until `shutdown`
/// is cancelled.
///
/// Does nothing useful unless the ledger was configured with an entry TTL.
pub async fn sweep_expired(
    ledger: BalanceLedger,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let purged = ledger.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, remaining = ledger.len(), "Purged expired balances");
                }
            }
        }
    }
    tracing::debug!("Ledger sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use i402::{Decimal, LedgerConfig, PaymentToken};

    #[tokio::test]
    async fn purges_until_cancelled() {
        let ledger =
            BalanceLedger::with_config(LedgerConfig::default().with_entry_ttl(Duration::ZERO));
        ledger
            .credit(&PaymentToken::from("stale"), Decimal::ONE)
            .unwrap();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(sweep_expired(
            ledger.clone(),
            Duration::from_millis(5),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ledger.is_empty());

        shutdown.cancel();
        task.await.unwrap();
    }
}
