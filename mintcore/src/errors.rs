//! Error types for `mintcore`.
//!
//! Two layers of errors mirror the two layers of the system:
//!
//! - [`StoreError`]: persistence-port failures (version conflicts,
//!   unavailable backends, serialization problems).
//! - [`CoreError`]: business-operation failures surfaced to callers
//!   (insufficient stock, already-minted batches, invalid input).
//!
//! Store conflicts are recovered locally by the coordinators (retry with
//! backoff) and only surface as [`CoreError::Conflict`] once retries are
//! exhausted. Business-rule violations are never retried and propagate to
//! the caller unchanged. A caller never sees a raw driver error.

use crate::types::{BatchId, DocumentKey, DocumentVersion, LotKey, ModelId};
use thiserror::Error;

/// Errors surfaced by business operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed ids, empty required fields, or otherwise invalid input.
    /// Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A reservation would exceed the units available for the model.
    /// Surfaced to the caller for user-visible out-of-stock handling.
    #[error(
        "insufficient stock in lot '{lot}' model '{model}': requested {requested}, available {available}"
    )]
    InsufficientStock {
        /// The lot the reservation targeted.
        lot: LotKey,
        /// The model within the lot.
        model: ModelId,
        /// Total quantity the reservation would have held.
        requested: u32,
        /// Units present for the model.
        available: u32,
    },

    /// Concurrent writers kept conflicting past the bounded retry budget.
    #[error("concurrent modification of document '{key}' exceeded retry budget")]
    Conflict {
        /// The contended document.
        key: DocumentKey,
    },

    /// The batch has already completed its one successful mint.
    #[error("mint batch '{0}' is already minted")]
    AlreadyMinted(BatchId),

    /// The external blockchain call failed or timed out. Resubmission is
    /// safe only while the batch is still unminted.
    #[error("mint submission failed")]
    MintFailed(#[source] MintClientError),

    /// A referenced record could not be resolved.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing record.
        what: String,
    },

    /// A store failure that is not a version conflict.
    #[error("store error: {0}")]
    Store(StoreError),
}

/// Errors surfaced by the document store port.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested document does not exist.
    #[error("document '{0}' not found")]
    DocumentNotFound(DocumentKey),

    /// The expected version did not match the stored version.
    #[error(
        "version conflict on document '{key}': expected {expected:?}, but current is {current}"
    )]
    VersionConflict {
        /// The contended document.
        key: DocumentKey,
        /// The version the writer expected, if it expected one.
        expected: Option<DocumentVersion>,
        /// The version actually stored.
        current: DocumentVersion,
    },

    /// Serializing a document for persistence failed.
    #[error("failed to serialize document '{key}': {detail}")]
    SerializationFailed {
        /// The document being written.
        key: DocumentKey,
        /// Backend detail.
        detail: String,
    },

    /// A stored payload could not be deserialized into the document type.
    #[error("failed to deserialize document '{key}': {detail}")]
    DeserializationFailed {
        /// The document being read.
        key: DocumentKey,
        /// Backend detail.
        detail: String,
    },

    /// The connection to the store failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The operation did not complete within its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The store is temporarily unavailable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors surfaced by the blockchain mint client port.
#[derive(Debug, Error)]
pub enum MintClientError {
    /// The chain rejected the transaction outright.
    #[error("mint rejected: {0}")]
    Rejected(String),

    /// The round-trip did not complete within the caller's deadline.
    ///
    /// A timeout does not mean the transaction did not happen; callers
    /// must re-check batch state before resubmitting.
    #[error("mint timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The transport to the chain failed.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Type alias for business-operation results.
pub type CoreResult<T> = Result<T, CoreError>;

/// Type alias for store-port results.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { key, .. } => Self::Conflict { key },
            other => Self::Store(other),
        }
    }
}

impl CoreError {
    /// Whether the error is a transient store condition that a retry may
    /// clear, as opposed to a business-rule violation.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. }
                | Self::Store(
                    StoreError::ConnectionFailed(_)
                        | StoreError::Timeout(_)
                        | StoreError::Unavailable(_)
                )
        )
    }
}
