//! The mint batch document.
//!
//! A [`MintBatch`] groups the passed, inspected units of one production
//! run for a single (brand, token blueprint) pairing into one on-chain
//! mint. A batch transitions exactly once, unminted to minted, and is
//! immutable afterwards apart from burn-scheduling metadata.

use crate::errors::{CoreError, CoreResult};
use crate::types::{
    BatchId, BrandId, MintAddress, ProductId, Timestamp, TokenBlueprintId, TxSignature, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of a successful on-chain mint, as recorded on the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintResult {
    /// Signature of the mint transaction.
    pub tx_signature: TxSignature,
    /// On-chain address of the minted token.
    pub mint_address: MintAddress,
}

/// One minting operation for a set of passed units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintBatch {
    /// Stable identifier, also the transactional document key.
    pub id: BatchId,
    /// The brand whose wallet receives the minted tokens.
    pub brand_id: BrandId,
    /// The on-chain collection template.
    pub token_blueprint_id: TokenBlueprintId,
    /// Units in the batch; the mint address is `None` until minted.
    pub products: BTreeMap<ProductId, Option<MintAddress>>,
    /// Whether the one successful mint has happened.
    pub minted: bool,
    /// When the mint completed. Set exactly when `minted` is.
    pub minted_at: Option<Timestamp>,
    /// On-chain address of the minted token.
    pub mint_address: Option<MintAddress>,
    /// Signature of the mint transaction.
    pub tx_signature: Option<TxSignature>,
    /// When a scheduled burn should run, if one is planned.
    pub burn_scheduled_at: Option<Timestamp>,
    /// Operator that created the batch.
    pub created_by: UserId,
    /// When the batch was created.
    pub created_at: Timestamp,
}

impl MintBatch {
    /// Builds a batch from the passed units of one production run.
    ///
    /// Duplicate unit ids collapse to one entry. An empty unit list is
    /// accepted here: the inspection workflow upstream is the single
    /// owner of the nothing-passed invariant, and validating it twice
    /// would obscure the root cause in logs.
    pub fn build(
        brand_id: BrandId,
        token_blueprint_id: TokenBlueprintId,
        passed_units: &[ProductId],
        created_by: UserId,
        now: Timestamp,
    ) -> Self {
        let products = passed_units
            .iter()
            .map(|unit| (unit.clone(), None))
            .collect();

        Self {
            id: BatchId::generate(),
            brand_id,
            token_blueprint_id,
            products,
            minted: false,
            minted_at: None,
            mint_address: None,
            tx_signature: None,
            burn_scheduled_at: None,
            created_by,
            created_at: now,
        }
    }

    /// The token amount sent on-chain: the number of units, floored to 1.
    ///
    /// The floor means an empty batch still mints one token. Carried over
    /// from the upstream workflow as-is; see DESIGN.md.
    pub fn amount(&self) -> u32 {
        u32::try_from(self.products.len()).unwrap_or(u32::MAX).max(1)
    }

    /// Whether the batch has completed its one successful mint.
    pub const fn is_minted(&self) -> bool {
        self.minted
    }

    /// Records the successful mint.
    ///
    /// Sets `minted`, `minted_at`, the transaction signature and the mint
    /// address, and stamps every unit with the batch mint address. Fails
    /// with [`CoreError::AlreadyMinted`] when the batch is already
    /// minted, leaving every recorded field untouched.
    pub fn mark_minted(&mut self, result: &MintResult, now: Timestamp) -> CoreResult<()> {
        if self.minted {
            return Err(CoreError::AlreadyMinted(self.id.clone()));
        }

        self.minted = true;
        self.minted_at = Some(now);
        self.tx_signature = Some(result.tx_signature.clone());
        self.mint_address = Some(result.mint_address.clone());
        for slot in self.products.values_mut() {
            *slot = Some(result.mint_address.clone());
        }
        Ok(())
    }

    /// Schedules a burn. The only mutation allowed after minting.
    pub fn schedule_burn(&mut self, at: Timestamp) {
        self.burn_scheduled_at = Some(at);
    }

    /// Checks the minted-flag invariant: `minted` exactly when
    /// `minted_at` is set.
    pub const fn invariants_hold(&self) -> bool {
        self.minted == self.minted_at.is_some()
    }
}
