//! Stored-record verification
//!
//! Checks that what the ledger holds under a submission's identifier is
//! what was hashed at submission time.

use crate::client::RecordFetcher;
use crate::clock::{Clock, SystemClock};
use crate::coordinator::SubmissionResult;
use crate::error::PipelineError;
use crate::history::{fetch_with_retry, VersionChain};
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use preg_record::{MetadataHash, RecordId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of a verification
///
/// A mismatch is reported here, not as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub record_id: RecordId,
    pub verified: bool,
    pub expected_hash: MetadataHash,
    pub stored_hash: MetadataHash,
    pub checked_at: DateTime<Utc>,
}

/// Compares stored hashes against submission results
#[derive(Debug, Clone)]
pub struct RecordVerifier {
    fetcher: Arc<dyn RecordFetcher>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl RecordVerifier {
    #[must_use]
    pub fn new(fetcher: Arc<dyn RecordFetcher>, retry: RetryPolicy) -> Self {
        Self {
            fetcher,
            retry,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source used for `checked_at`
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Verify a submission against the ledger
    ///
    /// # Errors
    /// See [`Self::verify_hash`].
    pub async fn verify(&self, result: &SubmissionResult) -> Result<Verification, PipelineError> {
        self.verify_hash(result.record_id, result.hash, &CancellationToken::new())
            .await
    }

    /// Verify that record `id` is stored with hash `expected`
    ///
    /// # Errors
    /// - `PipelineError::HistoryIncomplete` (empty chain) if the fetch fails
    /// - `PipelineError::Cancelled` on caller cancellation
    pub async fn verify_hash(
        &self,
        id: RecordId,
        expected: MetadataHash,
        cancel: &CancellationToken,
    ) -> Result<Verification, PipelineError> {
        let stored = fetch_with_retry(self.fetcher.as_ref(), &self.retry, id, cancel)
            .await
            .map_err(|e| e.into_pipeline_error(VersionChain::default(), id))?;

        let verified = stored.metadata_hash == expected;
        if verified {
            tracing::debug!(%id, "stored hash verified");
        } else {
            tracing::warn!(%id, expected = %expected, stored = %stored.metadata_hash, "stored hash mismatch");
        }

        Ok(Verification {
            record_id: id,
            verified,
            expected_hash: expected,
            stored_hash: stored.metadata_hash,
            checked_at: self.clock.now(),
        })
    }
}
