//! The blockchain mint client port.
//!
//! The chain is an external collaborator: slow, occasionally unreliable,
//! and not idempotent. The core calls it through this trait and never
//! retries a submission on its own; see
//! [`crate::orchestrator::MintOrchestrator::submit`].

use crate::errors::MintClientError;
use crate::types::{MintAddress, TxSignature, WalletAddress};
use async_trait::async_trait;

/// Parameters of one mint call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRequest {
    /// Wallet that receives the minted tokens (the brand wallet).
    pub destination: WalletAddress,
    /// Token amount to mint.
    pub amount: u32,
    /// Token name from the blueprint.
    pub name: String,
    /// Token symbol from the blueprint.
    pub symbol: String,
    /// Metadata URI from the blueprint.
    pub metadata_uri: String,
}

/// What the chain returns for a successful mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    /// Signature of the mint transaction.
    pub tx_signature: TxSignature,
    /// On-chain address of the minted token.
    pub mint_address: MintAddress,
}

/// Client for the external blockchain mint call.
///
/// Implementations wrap the chain SDK of choice. The round-trip may take
/// seconds to minutes; callers apply their own timeout, and a timeout
/// must not be read as "did not happen", because the transaction may have
/// landed. The safe resubmission boundary is re-loading the batch, which
/// fails fast once a previous attempt recorded success.
#[async_trait]
pub trait BlockchainMintClient: Send + Sync {
    /// Submits one mint transaction.
    async fn mint(&self, request: &MintRequest) -> Result<MintReceipt, MintClientError>;
}
