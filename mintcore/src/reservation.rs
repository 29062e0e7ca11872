//! Atomic reservation of stock against inventory lots.
//!
//! The [`ReservationCoordinator`] is the only writer of reservation state.
//! Each operation is a single-document read-modify-write transaction on
//! the lot, linearized by the store's optimistic concurrency control: two
//! concurrent reservations on one lot cannot together oversell a model,
//! because the loser's write fails its version check and re-reads the
//! winner's state before re-applying.

use crate::errors::{CoreError, CoreResult};
use crate::inspection::{InspectionResult, ProductRepo};
use crate::lot::InventoryLot;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::store::DocumentStore;
use crate::txn::{read_modify_write, Applied, OnMissing};
use crate::types::{DocumentKey, LotKey, ModelId, OrderId, ProductId, Timestamp};
use tracing::{info, instrument};

/// One line item of a paid order, as handed over by the order workflow.
///
/// The order payloads upstream are loosely shaped; this is the typed
/// contract they are parsed into before any reservation runs. The
/// `inventory_id` may be a composite identifier; it is normalized into
/// a [`LotKey`] at reservation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    /// Composite inventory identifier from the catalog.
    pub inventory_id: String,
    /// The model being purchased.
    pub model_id: ModelId,
    /// Quantity purchased.
    pub quantity: u32,
}

/// Performs atomic reserve/release/upsert operations on inventory lots.
#[derive(Debug)]
pub struct ReservationCoordinator<S> {
    store: S,
    retry_config: RetryConfig,
    retry_policy: RetryPolicy,
}

impl<S> ReservationCoordinator<S>
where
    S: DocumentStore<Document = InventoryLot>,
{
    /// Creates a coordinator with default retry behavior.
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry_config: RetryConfig::default(),
            retry_policy: RetryPolicy::default(),
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

    /// Idempotently unions `units` into the model's unit set, creating
    /// the lot document on first intake.
    ///
    /// Never touches reservations. Concurrent upserts from different
    /// production batches cannot lose updates: each runs as its own
    /// version-guarded transaction.
    #[instrument(name = "reservation.upsert_units", skip(self, units), fields(lot = %lot_key, model = %model))]
    pub async fn upsert_units(
        &self,
        lot_key: &LotKey,
        model: &ModelId,
        units: &[ProductId],
    ) -> CoreResult<InventoryLot> {
        self.upsert_units_at(lot_key, "", model, units).await
    }

    /// [`Self::upsert_units`] with a location recorded if the lot is
    /// created by this call. Used by production intake, which knows
    /// where the units physically are.
    pub async fn upsert_units_at(
        &self,
        lot_key: &LotKey,
        location: &str,
        model: &ModelId,
        units: &[ProductId],
    ) -> CoreResult<InventoryLot> {
        let key = DocumentKey::from(lot_key.clone());
        let seed = InventoryLot::new(lot_key.clone(), location, Timestamp::now());

        let updated = read_modify_write(
            &self.store,
            &key,
            &OnMissing::Create(seed),
            &self.retry_config,
            &self.retry_policy,
            |lot| {
                let added = lot.upsert_units(model, units, Timestamp::now())?;
                Ok(Applied::Write((lot.clone(), added)))
            },
        )
        .await?
        .expect("upsert seeds missing lots");

        let (lot, added) = updated;
        info!(
            lot = %lot_key,
            model = %model,
            added,
            "[reservation.upsert_units] stock updated"
        );
        Ok(lot)
    }

    /// Sets the quantity reserved by `order` for `model` in the lot.
    ///
    /// Overwrite semantics: resending the same reservation is safe.
    /// Fails with [`CoreError::InsufficientStock`] when the lot (or the
    /// model) cannot cover the total; that failure is surfaced
    /// immediately and never retried.
    #[instrument(name = "reservation.reserve", skip(self), fields(lot = %lot_key, model = %model, order = %order))]
    pub async fn reserve(
        &self,
        lot_key: &LotKey,
        model: &ModelId,
        order: &OrderId,
        quantity: u32,
    ) -> CoreResult<()> {
        let key = DocumentKey::from(lot_key.clone());
        let missing_lot = lot_key.clone();

        let outcome = read_modify_write(
            &self.store,
            &key,
            &OnMissing::Skip,
            &self.retry_config,
            &self.retry_policy,
            |lot| {
                lot.reserve(model, order, quantity, Timestamp::now())?;
                Ok(Applied::Write(()))
            },
        )
        .await?;

        match outcome {
            Some(()) => {
                info!(
                    lot = %lot_key,
                    model = %model,
                    order = %order,
                    quantity,
                    "[reservation.reserve] reservation recorded"
                );
                Ok(())
            }
            // A lot that was never stocked has nothing to sell.
            None => Err(CoreError::InsufficientStock {
                lot: missing_lot,
                model: model.clone(),
                requested: quantity,
                available: 0,
            }),
        }
    }

    /// Removes the order's reservation for `model`, returning the
    /// released quantity.
    ///
    /// Idempotent: a missing lot or a missing reservation releases 0
    /// without error, so retried settlement and out-of-order delivery
    /// notifications are harmless.
    #[instrument(name = "reservation.release", skip(self), fields(lot = %lot_key, model = %model, order = %order))]
    pub async fn release(
        &self,
        lot_key: &LotKey,
        model: &ModelId,
        order: &OrderId,
    ) -> CoreResult<u32> {
        let key = DocumentKey::from(lot_key.clone());

        let released = read_modify_write(
            &self.store,
            &key,
            &OnMissing::Skip,
            &self.retry_config,
            &self.retry_policy,
            |lot| {
                let released = lot.release(model, order, Timestamp::now());
                if released == 0 {
                    Ok(Applied::Unchanged(0))
                } else {
                    Ok(Applied::Write(released))
                }
            },
        )
        .await?
        .unwrap_or(0);

        info!(
            lot = %lot_key,
            order = %order,
            released,
            "[reservation.release] reservation released"
        );
        Ok(released)
    }

    /// Reserves every line item of a paid order.
    ///
    /// Each item's composite inventory identifier is normalized into its
    /// lot key. Items are reserved one lot at a time; there is no
    /// cross-lot transaction, and the first failure aborts the walk so
    /// the caller can release what was already taken.
    #[instrument(name = "reservation.reserve_items", skip(self, items), fields(order = %order, items = items.len()))]
    pub async fn reserve_items(&self, order: &OrderId, items: &[OrderItem]) -> CoreResult<()> {
        for item in items {
            let lot_key = LotKey::normalize(&item.inventory_id).map_err(|err| {
                CoreError::InvalidInput(format!(
                    "inventory id '{}' is not a valid lot key: {err}",
                    item.inventory_id
                ))
            })?;
            self.reserve(&lot_key, &item.model_id, order, item.quantity)
                .await?;
        }
        Ok(())
    }
}

/// Takes inspected production runs into stock.
///
/// Bridges the inspection subsystem to the ledger: per-unit outcomes are
/// reported to the product repository, and the passed units are unioned
/// into the lot through the coordinator.
#[derive(Debug)]
pub struct ProductionIntake<S, P> {
    coordinator: ReservationCoordinator<S>,
    products: P,
}

impl<S, P> ProductionIntake<S, P>
where
    S: DocumentStore<Document = InventoryLot>,
    P: ProductRepo,
{
    /// Creates an intake over a coordinator and a product repository.
    pub const fn new(coordinator: ReservationCoordinator<S>, products: P) -> Self {
        Self {
            coordinator,
            products,
        }
    }

    /// Records one inspected production batch.
    ///
    /// Every unit's outcome is pushed to the product repository; the
    /// passed units enter the lot's sellable pool. Returns the updated
    /// lot.
    #[instrument(name = "intake.record_inspection", skip(self, results), fields(lot = %lot_key, model = %model, units = results.len()))]
    pub async fn record_inspection(
        &self,
        lot_key: &LotKey,
        location: &str,
        model: &ModelId,
        results: &[(ProductId, InspectionResult)],
    ) -> CoreResult<InventoryLot> {
        for (product, result) in results {
            self.products
                .update_inspection_result(product, result)
                .await?;
        }

        let passed: Vec<ProductId> = results
            .iter()
            .filter(|(_, result)| result.passed())
            .map(|(product, _)| product.clone())
            .collect();

        info!(
            lot = %lot_key,
            passed = passed.len(),
            failed = results.len() - passed.len(),
            "[intake.record_inspection] inspection recorded"
        );

        self.coordinator
            .upsert_units_at(lot_key, location, model, &passed)
            .await
    }
}
