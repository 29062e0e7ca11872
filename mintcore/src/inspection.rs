//! Ports toward the inspection subsystem.
//!
//! Inspection is an external collaborator: it decides which production
//! units pass. This core reads the passed set when assembling mint
//! batches and when taking stock in, and notifies the product repository
//! of per-unit outcomes; it never owns inspection state.

use crate::errors::CoreResult;
use crate::types::{ProductId, ProductionRunId};
use async_trait::async_trait;

/// Outcome of inspecting one production unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InspectionResult {
    /// The unit passed and joins the sellable pool.
    Passed,
    /// The unit failed and is excluded.
    Failed {
        /// Inspector-supplied reason.
        reason: String,
    },
}

impl InspectionResult {
    /// Whether the unit passed.
    pub const fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Read-only source of passed units per production run.
#[async_trait]
pub trait InspectionSource: Send + Sync {
    /// The product ids that passed inspection for `run`.
    async fn passed_products(&self, run: &ProductionRunId) -> CoreResult<Vec<ProductId>>;
}

/// Product repository notified of inspection outcomes.
///
/// Notified, not owned: the product records live elsewhere; this core
/// only reports what it learned during intake.
#[async_trait]
pub trait ProductRepo: Send + Sync {
    /// Records the inspection outcome for one unit.
    async fn update_inspection_result(
        &self,
        product: &ProductId,
        result: &InspectionResult,
    ) -> CoreResult<()>;
}

#[async_trait]
impl<T: ProductRepo + ?Sized> ProductRepo for std::sync::Arc<T> {
    async fn update_inspection_result(
        &self,
        product: &ProductId,
        result: &InspectionResult,
    ) -> CoreResult<()> {
        self.as_ref().update_inspection_result(product, result).await
    }
}

#[async_trait]
impl<T: InspectionSource + ?Sized> InspectionSource for std::sync::Arc<T> {
    async fn passed_products(&self, run: &ProductionRunId) -> CoreResult<Vec<ProductId>> {
        self.as_ref().passed_products(run).await
    }
}
