//! Driving a mint batch through the external blockchain call.
//!
//! Per batch the flow is `requested → minting → {minted | failed}`: a
//! failed submission returns to `requested` by caller-driven
//! resubmission, and `minted` is terminal. The orchestrator guarantees at
//! most one successful mint per batch with two mechanisms:
//!
//! - [`MintOrchestrator::load_for_minting`] rejects already-minted
//!   batches before any blockchain call, so resubmission after success
//!   fails fast and cheap.
//! - [`MintOrchestrator::mark_minted`] is the only writer of the minted
//!   fields, guarded by the store's version check; a concurrent marker
//!   loses the race, re-reads, and sees [`CoreError::AlreadyMinted`].
//!
//! [`MintOrchestrator::submit`] itself never retries: the chain call is
//! not idempotent, and replaying a possibly-landed transaction risks a
//! double mint. The safe retry boundary is `load_for_minting`.

use crate::blockchain::{BlockchainMintClient, MintReceipt, MintRequest};
use crate::errors::{CoreError, CoreResult, StoreError};
use crate::inspection::InspectionSource;
use crate::mint::{MintBatch, MintResult};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::store::{DocumentStore, ExpectedVersion};
use crate::txn::{read_modify_write, Applied, OnMissing};
use crate::types::{
    BatchId, BrandId, DocumentKey, ProductId, ProductionRunId, Timestamp, TokenBlueprintId,
    UserId, WalletAddress,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// On-chain naming and metadata of a token blueprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBlueprint {
    /// Token name.
    pub name: String,
    /// Token symbol.
    pub symbol: String,
    /// Metadata URI.
    pub metadata_uri: String,
}

/// Resolves a brand to its receiving wallet.
#[async_trait::async_trait]
pub trait BrandDirectory: Send + Sync {
    /// The wallet that receives the brand's minted tokens.
    async fn wallet_address(&self, brand: &BrandId) -> CoreResult<WalletAddress>;
}

/// Resolves token blueprint metadata.
#[async_trait::async_trait]
pub trait BlueprintCatalog: Send + Sync {
    /// Name, symbol and metadata URI for a blueprint.
    async fn blueprint(&self, id: &TokenBlueprintId) -> CoreResult<TokenBlueprint>;
}

/// Everything needed for one mint submission, resolved up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintContext {
    /// The batch being minted.
    pub batch_id: BatchId,
    /// Destination wallet (the brand wallet).
    pub destination: WalletAddress,
    /// Token amount.
    pub amount: u32,
    /// Token name from the blueprint.
    pub name: String,
    /// Token symbol from the blueprint.
    pub symbol: String,
    /// Metadata URI from the blueprint.
    pub metadata_uri: String,
}

/// Drives mint batches through the external blockchain mint exactly once.
pub struct MintOrchestrator<S, C> {
    store: S,
    client: C,
    brands: Arc<dyn BrandDirectory>,
    blueprints: Arc<dyn BlueprintCatalog>,
    retry_config: RetryConfig,
    retry_policy: RetryPolicy,
}

impl<S, C> MintOrchestrator<S, C>
where
    S: DocumentStore<Document = MintBatch>,
    C: BlockchainMintClient,
{
    /// Creates an orchestrator over a batch store, a chain client, and
    /// the brand/blueprint directories.
    pub fn new(
        store: S,
        client: C,
        brands: Arc<dyn BrandDirectory>,
        blueprints: Arc<dyn BlueprintCatalog>,
    ) -> Self {
        Self {
            store,
            client,
            brands,
            blueprints,
            retry_config: RetryConfig::default(),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Sets the retry configuration used by [`Self::mark_minted`].
    #[must_use]
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Sets the retry policy used by [`Self::mark_minted`].
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Creates and persists a batch from a set of passed units.
    #[instrument(name = "mint.create_batch", skip(self, passed_units), fields(brand = %brand, blueprint = %blueprint, units = passed_units.len()))]
    pub async fn create_batch(
        &self,
        brand: BrandId,
        blueprint: TokenBlueprintId,
        passed_units: &[ProductId],
        created_by: UserId,
        now: Timestamp,
    ) -> CoreResult<MintBatch> {
        let batch = MintBatch::build(brand, blueprint, passed_units, created_by, now);
        let key = DocumentKey::from(batch.id.clone());

        self.store
            .put(&key, ExpectedVersion::New, batch.clone())
            .await?;

        info!(
            batch = %batch.id,
            units = batch.products.len(),
            "[mint.create_batch] batch persisted"
        );
        Ok(batch)
    }

    /// Creates a batch from the passed units of a production run, as
    /// reported by the inspection subsystem.
    pub async fn create_batch_from_inspection<I: InspectionSource>(
        &self,
        inspection: &I,
        run: &ProductionRunId,
        brand: BrandId,
        blueprint: TokenBlueprintId,
        created_by: UserId,
        now: Timestamp,
    ) -> CoreResult<MintBatch> {
        let passed = inspection.passed_products(run).await?;
        self.create_batch(brand, blueprint, &passed, created_by, now)
            .await
    }

    /// Resolves everything a submission needs, failing fast with
    /// [`CoreError::AlreadyMinted`] if the batch has already completed;
    /// this check runs before any blockchain call and is the safe
    /// boundary for resubmission after a failure or timeout.
    #[instrument(name = "mint.load_for_minting", skip(self), fields(batch = %batch_id))]
    pub async fn load_for_minting(&self, batch_id: &BatchId) -> CoreResult<MintContext> {
        let key = DocumentKey::from(batch_id.clone());
        let batch = match self.store.get(&key).await {
            Ok(versioned) => versioned.document,
            Err(StoreError::DocumentNotFound(_)) => {
                return Err(CoreError::NotFound {
                    what: format!("mint batch '{batch_id}'"),
                })
            }
            Err(err) => return Err(err.into()),
        };

        if batch.is_minted() {
            return Err(CoreError::AlreadyMinted(batch_id.clone()));
        }

        let destination = self.brands.wallet_address(&batch.brand_id).await?;
        let blueprint = self.blueprints.blueprint(&batch.token_blueprint_id).await?;

        Ok(MintContext {
            batch_id: batch_id.clone(),
            destination,
            amount: batch.amount(),
            name: blueprint.name,
            symbol: blueprint.symbol,
            metadata_uri: blueprint.metadata_uri,
        })
    }

    /// Submits the mint to the chain. One round-trip, no internal retry.
    ///
    /// The call may take seconds to minutes; the caller owns the timeout,
    /// and a timeout must not be read as "did not happen". Failures map
    /// to [`CoreError::MintFailed`] so the orchestrating workflow can
    /// decide to resubmit, safe only while the batch is still unminted,
    /// which [`Self::load_for_minting`] verifies.
    #[instrument(name = "mint.submit", skip(self, context), fields(batch = %context.batch_id, amount = context.amount))]
    pub async fn submit(&self, context: &MintContext) -> CoreResult<MintResult> {
        let request = MintRequest {
            destination: context.destination.clone(),
            amount: context.amount,
            name: context.name.clone(),
            symbol: context.symbol.clone(),
            metadata_uri: context.metadata_uri.clone(),
        };

        let MintReceipt {
            tx_signature,
            mint_address,
        } = match self.client.mint(&request).await {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(
                    batch = %context.batch_id,
                    error = %err,
                    "[mint.submit] blockchain mint failed"
                );
                return Err(CoreError::MintFailed(err));
            }
        };

        info!(
            batch = %context.batch_id,
            signature = %tx_signature,
            "[mint.submit] mint landed on chain"
        );
        Ok(MintResult {
            tx_signature,
            mint_address,
        })
    }

    /// Records the successful mint on the batch document.
    ///
    /// Single writer of the minted fields: the write is guarded by the
    /// document version, and a batch found minted on (re-)read fails
    /// with [`CoreError::AlreadyMinted`] without touching anything.
    #[instrument(name = "mint.mark_minted", skip(self, result), fields(batch = %batch_id))]
    pub async fn mark_minted(
        &self,
        batch_id: &BatchId,
        result: &MintResult,
        now: Timestamp,
    ) -> CoreResult<()> {
        let key = DocumentKey::from(batch_id.clone());

        let outcome = read_modify_write(
            &self.store,
            &key,
            &OnMissing::Fail,
            &self.retry_config,
            &self.retry_policy,
            |batch| {
                batch.mark_minted(result, now)?;
                Ok(Applied::Write(()))
            },
        )
        .await;

        match outcome {
            Ok(_) => {
                info!(batch = %batch_id, "[mint.mark_minted] batch marked minted");
                Ok(())
            }
            Err(CoreError::Store(StoreError::DocumentNotFound(_))) => Err(CoreError::NotFound {
                what: format!("mint batch '{batch_id}'"),
            }),
            Err(err) => Err(err),
        }
    }
}
