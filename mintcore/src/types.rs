//! Core identifier and value types for the `mintcore` library.
//!
//! All identifiers use smart constructors so that a value, once built, is
//! known to be non-empty and within length bounds. Raw strings are parsed
//! into these types at the system boundary and stay valid from then on.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};

/// Key of a transactional document in the store.
///
/// Every persisted document (inventory lot, mint batch) is addressed by a
/// `DocumentKey`. Lot keys and batch ids convert into this type when they
/// cross the store port.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct DocumentKey(String);

/// Identifies one inventory lot: a (product-blueprint, token-blueprint)
/// combination at a physical location.
///
/// The composite identifiers supplied by the catalog encode more segments
/// than the lot key uses; [`LotKey::normalize`] applies the external
/// convention that only the first two underscore-delimited segments
/// address the lot document.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct LotKey(String);

impl LotKey {
    /// Normalizes a composite inventory identifier into a lot key.
    ///
    /// Keeps the first two underscore-delimited segments; an identifier
    /// with fewer segments normalizes to itself. The composition rule for
    /// the raw identifier is an external convention this core does not
    /// own.
    pub fn normalize(raw: &str) -> Result<Self, LotKeyError> {
        let mut segments = raw.splitn(3, '_');
        match (segments.next(), segments.next()) {
            (Some(first), Some(second)) => Self::try_new(format!("{first}_{second}")),
            _ => Self::try_new(raw),
        }
    }
}

impl From<LotKey> for DocumentKey {
    fn from(key: LotKey) -> Self {
        Self::try_new(key.into_inner()).expect("lot key is already a valid document key")
    }
}

/// Identifies a product model (size/colour variant) within a lot.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ModelId(String);

/// Identifies a buyer order.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct OrderId(String);

/// Identifies one physical production unit.
///
/// Unit ids are the product ids assigned at inspection time; the same id
/// keys the unit in its lot's stock and in any mint batch it joins.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ProductId(String);

/// Identifies a brand.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct BrandId(String);

/// Identifies a token blueprint (the on-chain collection template).
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct TokenBlueprintId(String);

/// Identifies a mint batch document.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct BatchId(String);

impl BatchId {
    /// Creates a fresh batch id from a `UUIDv7`, so batch documents sort
    /// by creation time.
    pub fn generate() -> Self {
        Self::try_new(uuid::Uuid::now_v7().to_string()).expect("uuid string is non-empty")
    }
}

impl From<BatchId> for DocumentKey {
    fn from(id: BatchId) -> Self {
        Self::try_new(id.into_inner()).expect("batch id is already a valid document key")
    }
}

/// Identifies a production run handed over by the inspection subsystem.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ProductionRunId(String);

/// A wallet address on the target chain.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct WalletAddress(String);

/// The on-chain address of a minted token.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct MintAddress(String);

/// Signature of the on-chain mint transaction.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct TxSignature(String);

/// Identifies the operator or service account that created a record.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct UserId(String);

/// The version of a document in the store.
///
/// Versions start at 0 and advance by one on every successful write; the
/// store uses them to detect concurrent modification.
#[nutype(
    validate(greater_or_equal = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct DocumentVersion(u64);

impl DocumentVersion {
    /// The version of a freshly created document (0).
    pub fn initial() -> Self {
        Self::try_new(0).expect("0 is always a valid version")
    }

    /// Returns the next version after this one.
    #[must_use]
    pub fn next(self) -> Self {
        let current: u64 = self.into();
        Self::try_new(current + 1).expect("next version should always be valid")
    }
}

/// A timestamp attached to document lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Converts the timestamp into the underlying `DateTime`.
    pub const fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.into_datetime()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
