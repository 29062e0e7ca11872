//! Post-transfer settlement of sold units.
//!
//! Once a minted token's on-chain ownership has actually moved from the
//! brand wallet to the buyer wallet (an external event this core reacts
//! to, not drives), the sold unit leaves the sellable pool and the
//! order's reservation is released. Both happen in one single-document
//! transaction on the lot, and the whole operation is idempotent so the
//! delivery workflow can re-run it after a crash or a duplicate
//! notification.

use crate::errors::CoreResult;
use crate::lot::InventoryLot;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::store::DocumentStore;
use crate::txn::{read_modify_write, Applied, OnMissing};
use crate::types::{DocumentKey, LotKey, OrderId, ProductId, Timestamp};
use tracing::{info, instrument};

/// Finalizes sold units after successful transfer to the buyer wallet.
#[derive(Debug)]
pub struct TransferSettlement<S> {
    store: S,
    retry_config: RetryConfig,
    retry_policy: RetryPolicy,
}

impl<S> TransferSettlement<S>
where
    S: DocumentStore<Document = InventoryLot>,
{
    /// Creates a settlement worker with default retry behavior.
    ///
    /// Settlement is safe to retry indefinitely, so the default leans on
    /// the fault-tolerant retry configuration.
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry_config: RetryConfig::fault_tolerant(),
            retry_policy: RetryPolicy::ConflictsAndTransient,
        }
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Settles one transferred unit: removes it from whichever model's
    /// unit set holds it and releases that model's reservation for
    /// `order`, in the same transaction.
    ///
    /// Returns the number of units removed: 0 when the unit was already
    /// gone (or the lot never existed), which is the idempotent re-run
    /// path, not an error. Release's own no-op-on-missing behavior keeps
    /// the operation tolerant of out-of-order delivery notifications.
    #[instrument(name = "settlement.apply", skip(self), fields(lot = %lot_key, product = %product, order = %order))]
    pub async fn apply(
        &self,
        lot_key: &LotKey,
        product: &ProductId,
        order: &OrderId,
        now: Timestamp,
    ) -> CoreResult<usize> {
        let key = DocumentKey::from(lot_key.clone());

        let removed = read_modify_write(
            &self.store,
            &key,
            &OnMissing::Skip,
            &self.retry_config,
            &self.retry_policy,
            |lot| {
                let Some(model) = lot.remove_unit(product, now) else {
                    // Already settled; nothing to write.
                    return Ok(Applied::Unchanged(0));
                };
                let released = lot.release(&model, order, now);
                info!(
                    lot = %lot.id,
                    model = %model,
                    released,
                    "[settlement.apply] unit removed from sellable pool"
                );
                Ok(Applied::Write(1))
            },
        )
        .await?
        .unwrap_or(0);

        Ok(removed)
    }
}
