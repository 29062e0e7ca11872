//! The inventory lot document.
//!
//! An [`InventoryLot`] is the per-(product-blueprint, token-blueprint)
//! stock record: which production units exist per model, and how many of
//! each model are currently held by which order. It is the only mutable
//! shared resource in the system, and it is only ever mutated through the
//! methods here; each one preserves the document invariants:
//!
//! - `reserved_count` equals the sum of the per-order quantities
//! - `reserved_count` never exceeds the number of units
//! - a unit id belongs to at most one model
//!
//! The methods are pure (no I/O); the coordinators wrap them in
//! read-modify-write store transactions.

use crate::errors::{CoreError, CoreResult};
use crate::types::{LotKey, ModelId, OrderId, ProductId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Lifecycle status of an inventory lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    /// Production units are still being inspected.
    Inspecting,
    /// Inspection finished; stock reflects the passed units.
    Inspected,
    /// The lot is listed for sale.
    Listed,
    /// The lot was discarded before listing.
    Discarded,
    /// The lot is retired. Documents are never physically deleted, only
    /// transitioned here.
    Deleted,
}

/// Stock record for one model within a lot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStock {
    /// The production units that exist for this model.
    pub unit_ids: BTreeSet<ProductId>,
    /// Quantity held per order.
    pub reserved_by_order: BTreeMap<OrderId, u32>,
    /// Cached sum of `reserved_by_order` values.
    pub reserved_count: u32,
}

impl ModelStock {
    /// Units not currently held by any order.
    pub fn available(&self) -> u32 {
        let total = u32::try_from(self.unit_ids.len()).unwrap_or(u32::MAX);
        total.saturating_sub(self.reserved_count)
    }

    fn recompute_reserved(&mut self) {
        self.reserved_count = self.reserved_by_order.values().sum();
    }
}

/// The per-lot stock document. See the module docs for the invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLot {
    /// Stable identifier, also the transactional document key.
    pub id: LotKey,
    /// Physical location of the lot.
    pub location: String,
    /// Lifecycle status.
    pub status: LotStatus,
    /// Stock per model.
    pub stock_by_model: BTreeMap<ModelId, ModelStock>,
    /// When the lot document was created.
    pub created_at: Timestamp,
    /// When the lot document was last mutated.
    pub updated_at: Timestamp,
}

impl InventoryLot {
    /// Creates an empty lot at a location, in `Inspecting` status.
    pub fn new(id: LotKey, location: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id,
            location: location.into(),
            status: LotStatus::Inspecting,
            stock_by_model: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Unions `units` into the model's unit set.
    ///
    /// Idempotent: units already present under the same model are skipped.
    /// A unit already owned by a *different* model is rejected: admitting
    /// it would put one physical unit in two sellable pools. Reservations
    /// are never touched here.
    ///
    /// Returns the number of units newly added.
    pub fn upsert_units(
        &mut self,
        model: &ModelId,
        units: &[ProductId],
        now: Timestamp,
    ) -> CoreResult<usize> {
        for unit in units {
            if let Some(owner) = self.model_holding(unit) {
                if owner != *model {
                    return Err(CoreError::InvalidInput(format!(
                        "unit '{unit}' already belongs to model '{owner}'"
                    )));
                }
            }
        }

        let stock = self.stock_by_model.entry(model.clone()).or_default();
        let before = stock.unit_ids.len();
        stock.unit_ids.extend(units.iter().cloned());
        let added = stock.unit_ids.len() - before;

        if added > 0 {
            self.updated_at = now;
        }
        Ok(added)
    }

    /// Sets the quantity held by `order` for `model`.
    ///
    /// Overwrite, not increment: a retried checkout resends the same
    /// call and lands on the same state. A quantity of zero removes the
    /// order's entry. Fails with
    /// [`CoreError::InsufficientStock`] when the new total across all
    /// orders would exceed the model's unit count.
    pub fn reserve(
        &mut self,
        model: &ModelId,
        order: &OrderId,
        quantity: u32,
        now: Timestamp,
    ) -> CoreResult<()> {
        let lot = self.id.clone();
        let Some(stock) = self.stock_by_model.get_mut(model) else {
            return Err(CoreError::InsufficientStock {
                lot,
                model: model.clone(),
                requested: quantity,
                available: 0,
            });
        };

        let previous = stock.reserved_by_order.get(order).copied().unwrap_or(0);
        let others = stock.reserved_count - previous;
        let requested_total = others.saturating_add(quantity);
        let total_units = u32::try_from(stock.unit_ids.len()).unwrap_or(u32::MAX);

        if requested_total > total_units {
            return Err(CoreError::InsufficientStock {
                lot,
                model: model.clone(),
                requested: requested_total,
                available: total_units,
            });
        }

        if quantity == 0 {
            stock.reserved_by_order.remove(order);
        } else {
            stock.reserved_by_order.insert(order.clone(), quantity);
        }
        stock.recompute_reserved();
        self.updated_at = now;
        Ok(())
    }

    /// Removes the order's reservation for `model`.
    ///
    /// Returns the released quantity; 0 when the order held nothing,
    /// which makes the call safe to repeat.
    pub fn release(&mut self, model: &ModelId, order: &OrderId, now: Timestamp) -> u32 {
        let Some(stock) = self.stock_by_model.get_mut(model) else {
            return 0;
        };
        let Some(released) = stock.reserved_by_order.remove(order) else {
            return 0;
        };
        stock.recompute_reserved();
        self.updated_at = now;
        released
    }

    /// Removes one unit from whichever model holds it.
    ///
    /// Returns the owning model, or `None` when no model holds the unit
    /// (already removed).
    pub fn remove_unit(&mut self, unit: &ProductId, now: Timestamp) -> Option<ModelId> {
        let model = self.model_holding(unit)?;
        let stock = self
            .stock_by_model
            .get_mut(&model)
            .expect("model_holding returned an existing model");
        stock.unit_ids.remove(unit);
        self.updated_at = now;
        Some(model)
    }

    /// The model whose unit set contains `unit`, if any.
    pub fn model_holding(&self, unit: &ProductId) -> Option<ModelId> {
        self.stock_by_model
            .iter()
            .find(|(_, stock)| stock.unit_ids.contains(unit))
            .map(|(model, _)| model.clone())
    }

    /// Checks the document invariants. Used by tests and debug
    /// assertions; mutators maintain these by construction.
    pub fn invariants_hold(&self) -> bool {
        let mut seen = BTreeSet::new();
        for stock in self.stock_by_model.values() {
            let sum: u32 = stock.reserved_by_order.values().sum();
            if stock.reserved_count != sum {
                return false;
            }
            if (stock.reserved_count as usize) > stock.unit_ids.len() {
                return false;
            }
            if stock.reserved_by_order.values().any(|qty| *qty == 0) {
                return false;
            }
            for unit in &stock.unit_ids {
                if !seen.insert(unit.clone()) {
                    return false;
                }
            }
        }
        true
    }
}
