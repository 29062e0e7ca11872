//! Shared read-modify-write transaction loop.
//!
//! Every mutation of a stored document goes through [`read_modify_write`]:
//! read the document with its version, apply a pure mutator, write back
//! guarded by that version, and on a version conflict re-read and re-apply
//! with bounded exponential backoff. The loop is written once against the
//! [`DocumentStore`] port so that every backend, document-oriented or
//! relational, gets the same contention behavior.
//!
//! Business-rule failures returned by the mutator abort immediately and
//! are never retried; only store-level conflicts (and, by policy,
//! transient store failures) earn another attempt.

use crate::errors::{CoreError, CoreResult, StoreError};
use crate::retry::{store_error_retryable, RetryConfig, RetryPolicy};
use crate::store::{DocumentStore, ExpectedVersion};
use crate::types::DocumentKey;
use tracing::warn;

/// What to do when the document does not exist yet.
pub(crate) enum OnMissing<D> {
    /// Seed this value and write it with [`ExpectedVersion::New`].
    Create(D),
    /// Treat the operation as a no-op (idempotent paths).
    Skip,
    /// Surface the missing document to the caller.
    Fail,
}

/// Outcome of one application of the mutator.
pub(crate) enum Applied<T> {
    /// The document changed; write it back and return this value.
    Write(T),
    /// Nothing to change; skip the write and return this value.
    Unchanged(T),
}

/// Runs `apply` against the current state of the document under `key`,
/// retrying on version conflicts per `config`/`policy`.
///
/// Returns `Ok(None)` when the document is missing and `on_missing` is
/// [`OnMissing::Skip`]; otherwise the mutator's value.
pub(crate) async fn read_modify_write<S, T, F>(
    store: &S,
    key: &DocumentKey,
    on_missing: &OnMissing<S::Document>,
    config: &RetryConfig,
    policy: &RetryPolicy,
    mut apply: F,
) -> CoreResult<Option<T>>
where
    S: DocumentStore,
    S::Document: Clone,
    F: FnMut(&mut S::Document) -> CoreResult<Applied<T>> + Send,
{
    let mut attempt: u32 = 0;

    loop {
        let (mut document, expected) = match store.get(key).await {
            Ok(versioned) => (
                versioned.document,
                ExpectedVersion::Exact(versioned.version),
            ),
            Err(StoreError::DocumentNotFound(_)) => match on_missing {
                OnMissing::Create(seed) => (seed.clone(), ExpectedVersion::New),
                OnMissing::Skip => return Ok(None),
                OnMissing::Fail => {
                    return Err(CoreError::Store(StoreError::DocumentNotFound(key.clone())))
                }
            },
            Err(err) if store_error_retryable(&err, policy) && attempt + 1 < config.max_attempts => {
                attempt += 1;
                warn!(
                    document = %key,
                    attempt,
                    error = %err,
                    "[store.rmw] transient read failure, retrying"
                );
                tokio::time::sleep(config.delay_for_attempt(attempt - 1)).await;
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        // Business-rule failures abort here and are never retried.
        let value = match apply(&mut document)? {
            Applied::Write(value) => value,
            Applied::Unchanged(value) => return Ok(Some(value)),
        };

        match store.put(key, expected, document).await {
            Ok(_) => return Ok(Some(value)),
            Err(err @ StoreError::VersionConflict { .. }) => {
                if attempt + 1 >= config.max_attempts {
                    return Err(err.into());
                }
                attempt += 1;
                warn!(
                    document = %key,
                    attempt,
                    "[store.rmw] version conflict, retrying"
                );
                tokio::time::sleep(config.delay_for_attempt(attempt - 1)).await;
            }
            Err(err) if store_error_retryable(&err, policy) && attempt + 1 < config.max_attempts => {
                attempt += 1;
                warn!(
                    document = %key,
                    attempt,
                    error = %err,
                    "[store.rmw] transient write failure, retrying"
                );
                tokio::time::sleep(config.delay_for_attempt(attempt - 1)).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}
