//! In-memory adapter for the `MintCore` document store.
//!
//! This crate provides an in-memory implementation of the
//! `DocumentStore` trait from the mintcore crate, useful for testing and
//! development scenarios where persistence is not required. Version
//! checks behave exactly as the port specifies, so the reservation and
//! settlement coordinators exercise their full conflict-retry paths
//! against it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use mintcore::errors::{StoreError, StoreResult};
use mintcore::store::{DocumentStore, ExpectedVersion, Versioned};
use mintcore::types::{DocumentKey, DocumentVersion};

/// Thread-safe in-memory document store.
///
/// `Clone` shares the underlying storage, so handing clones to several
/// coordinators (or test tasks) gives them one common set of documents.
#[derive(Debug)]
pub struct InMemoryDocumentStore<D> {
    // Maps document keys to the payload and its current version.
    documents: Arc<RwLock<HashMap<DocumentKey, (D, DocumentVersion)>>>,
}

impl<D> Clone for InMemoryDocumentStore<D> {
    fn clone(&self) -> Self {
        Self {
            documents: Arc::clone(&self.documents),
        }
    }
}

impl<D> InMemoryDocumentStore<D> {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The number of documents currently stored.
    pub fn len(&self) -> usize {
        self.documents.read().expect("RwLock poisoned").len()
    }

    /// Whether the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<D> Default for InMemoryDocumentStore<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D> DocumentStore for InMemoryDocumentStore<D>
where
    D: Send + Sync + Clone + 'static,
{
    type Document = D;

    async fn get(&self, key: &DocumentKey) -> StoreResult<Versioned<Self::Document>> {
        let documents = self.documents.read().expect("RwLock poisoned");

        documents
            .get(key)
            .map(|(document, version)| Versioned::new(document.clone(), *version))
            .ok_or_else(|| StoreError::DocumentNotFound(key.clone()))
    }

    async fn put(
        &self,
        key: &DocumentKey,
        expected: ExpectedVersion,
        document: Self::Document,
    ) -> StoreResult<DocumentVersion> {
        let mut documents = self.documents.write().expect("RwLock poisoned");

        let current = documents.get(key).map(|(_, version)| *version);

        let next = match (expected, current) {
            (ExpectedVersion::New, None) => DocumentVersion::initial(),
            (ExpectedVersion::New, Some(current)) => {
                return Err(StoreError::VersionConflict {
                    key: key.clone(),
                    expected: None,
                    current,
                });
            }
            (ExpectedVersion::Exact(expected), Some(current)) => {
                if expected != current {
                    return Err(StoreError::VersionConflict {
                        key: key.clone(),
                        expected: Some(expected),
                        current,
                    });
                }
                current.next()
            }
            (ExpectedVersion::Exact(_), None) => {
                return Err(StoreError::DocumentNotFound(key.clone()));
            }
            (ExpectedVersion::Any, current) => {
                current.map_or_else(DocumentVersion::initial, DocumentVersion::next)
            }
        };

        documents.insert(key.clone(), (document, next));
        Ok(next)
    }

    async fn exists(&self, key: &DocumentKey) -> StoreResult<bool> {
        let documents = self.documents.read().expect("RwLock poisoned");

        Ok(documents.contains_key(key))
    }

    async fn version(&self, key: &DocumentKey) -> StoreResult<Option<DocumentVersion>> {
        let documents = self.documents.read().expect("RwLock poisoned");

        Ok(documents.get(key).map(|(_, version)| *version))
    }
}
