//! `MintCore`: inventory reservation and mint-settlement core.
//!
//! The library tracks per-model stock across inventory lots, reserves
//! quantities atomically per order so concurrent checkouts never
//! oversell, batches inspected units into a mint request, drives the
//! external blockchain mint to completion at most once, and reconciles
//! reservations once a transfer to the buyer wallet completes.
//!
//! The only coordination primitive is the backing store's
//! single-document compare-and-swap, exposed through the
//! [`store::DocumentStore`] port. There is no in-process lock, because multiple
//! service instances run concurrently. Backends live in their own
//! crates (`mintcore-memory`, `mintcore-postgres`).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod blockchain;
pub mod errors;
pub mod inspection;
pub mod lot;
pub mod mint;
pub mod orchestrator;
pub mod reservation;
pub mod retry;
pub mod settlement;
pub mod store;
mod txn;
pub mod types;

pub use blockchain::{BlockchainMintClient, MintReceipt, MintRequest};
pub use errors::{CoreError, CoreResult, MintClientError, StoreError, StoreResult};
pub use inspection::{InspectionResult, InspectionSource, ProductRepo};
pub use lot::{InventoryLot, LotStatus, ModelStock};
pub use mint::{MintBatch, MintResult};
pub use orchestrator::{
    BlueprintCatalog, BrandDirectory, MintContext, MintOrchestrator, TokenBlueprint,
};
pub use reservation::{OrderItem, ProductionIntake, ReservationCoordinator};
pub use retry::{RetryConfig, RetryPolicy};
pub use settlement::TransferSettlement;
pub use store::{DocumentStore, ExpectedVersion, Versioned};
pub use types::{
    BatchId, BrandId, DocumentKey, DocumentVersion, LotKey, MintAddress, ModelId, OrderId,
    ProductId, ProductionRunId, Timestamp, TokenBlueprintId, TxSignature, UserId, WalletAddress,
};
