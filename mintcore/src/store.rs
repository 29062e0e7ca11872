//! Document store abstraction.
//!
//! This module defines the [`DocumentStore`] trait: the port every storage
//! backend implements. The port is deliberately small (read a whole
//! document with its version, write a whole document guarded by an
//! expected version) because the domain's only coordination primitive is
//! the store's single-document compare-and-swap. A document-oriented
//! backend satisfies it with an etag/version field, a relational backend
//! with a version column; neither leaks through the port.

use crate::errors::StoreResult;
use crate::types::{DocumentKey, DocumentVersion};
use async_trait::async_trait;

/// A document read from the store together with the version that guards
/// subsequent writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<D> {
    /// The document payload.
    pub document: D,
    /// The version the document had when read.
    pub version: DocumentVersion,
}

impl<D> Versioned<D> {
    /// Creates a new versioned document.
    pub const fn new(document: D, version: DocumentVersion) -> Self {
        Self { document, version }
    }
}

/// Expected version for optimistic concurrency control on writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The document must not exist yet.
    New,
    /// The document must exist and have exactly this version.
    Exact(DocumentVersion),
    /// Any state is acceptable (no concurrency control).
    Any,
}

/// The document store port all backends must satisfy.
///
/// Writes are linearized per document: two concurrent `put` calls with the
/// same expected version cannot both succeed, which is the property the
/// reservation and settlement coordinators build their read-modify-write
/// loops on. There is no cross-document transaction; the system does not
/// need one.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// The document type this store persists.
    type Document: Send + Sync;

    /// Reads a document and its current version.
    ///
    /// # Errors
    /// Returns [`crate::errors::StoreError::DocumentNotFound`] if no
    /// document exists under `key`.
    async fn get(&self, key: &DocumentKey) -> StoreResult<Versioned<Self::Document>>;

    /// Writes a document guarded by an expected version.
    ///
    /// Every successful write advances the stored version by one, so
    /// concurrent writers holding the old version fail with
    /// [`crate::errors::StoreError::VersionConflict`] and must re-read.
    ///
    /// # Errors
    /// * `VersionConflict`: the expected version did not match
    /// * `SerializationFailed`: the document could not be encoded
    async fn put(
        &self,
        key: &DocumentKey,
        expected: ExpectedVersion,
        document: Self::Document,
    ) -> StoreResult<DocumentVersion>;

    /// Checks whether a document exists.
    async fn exists(&self, key: &DocumentKey) -> StoreResult<bool>;

    /// Returns the current version of a document, or `None` if it does
    /// not exist.
    async fn version(&self, key: &DocumentKey) -> StoreResult<Option<DocumentVersion>>;
}

#[async_trait]
impl<T: DocumentStore> DocumentStore for std::sync::Arc<T> {
    type Document = T::Document;

    async fn get(&self, key: &DocumentKey) -> StoreResult<Versioned<Self::Document>> {
        self.as_ref().get(key).await
    }

    async fn put(
        &self,
        key: &DocumentKey,
        expected: ExpectedVersion,
        document: Self::Document,
    ) -> StoreResult<DocumentVersion> {
        self.as_ref().put(key, expected, document).await
    }

    async fn exists(&self, key: &DocumentKey) -> StoreResult<bool> {
        self.as_ref().exists(key).await
    }

    async fn version(&self, key: &DocumentKey) -> StoreResult<Option<DocumentVersion>> {
        self.as_ref().version(key).await
    }
}

#[async_trait]
impl<T: DocumentStore> DocumentStore for &T {
    type Document = T::Document;

    async fn get(&self, key: &DocumentKey) -> StoreResult<Versioned<Self::Document>> {
        (*self).get(key).await
    }

    async fn put(
        &self,
        key: &DocumentKey,
        expected: ExpectedVersion,
        document: Self::Document,
    ) -> StoreResult<DocumentVersion> {
        (*self).put(key, expected, document).await
    }

    async fn exists(&self, key: &DocumentKey) -> StoreResult<bool> {
        (*self).exists(key).await
    }

    async fn version(&self, key: &DocumentKey) -> StoreResult<Option<DocumentVersion>> {
        (*self).version(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versioned_document_creation() {
        let versioned = Versioned::new("payload", DocumentVersion::initial());

        assert_eq!(versioned.document, "payload");
        assert_eq!(versioned.version, DocumentVersion::initial());
    }

    #[test]
    fn expected_version_variants() {
        let exact = ExpectedVersion::Exact(DocumentVersion::try_new(5).unwrap());

        assert_eq!(ExpectedVersion::New, ExpectedVersion::New);
        assert_eq!(
            exact,
            ExpectedVersion::Exact(DocumentVersion::try_new(5).unwrap())
        );
        assert_ne!(ExpectedVersion::Any, ExpectedVersion::New);
    }
}
