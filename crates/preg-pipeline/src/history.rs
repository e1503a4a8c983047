//! Lineage reconstruction
//!
//! [`HistoryResolver`] walks `previous_version` links from a starting
//! record back to the first version. The chain is rebuilt on every call;
//! nothing is cached.

use crate::client::{FetchedRecord, RecordFetcher};
use crate::error::PipelineError;
use crate::retry::{RetryError, RetryPolicy};
use preg_record::RecordId;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Versions of one lineage, newest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionChain {
    records: Vec<FetchedRecord>,
}

impl VersionChain {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Newest version
    #[inline]
    #[must_use]
    pub fn head(&self) -> Option<&FetchedRecord> {
        self.records.first()
    }

    /// Oldest version reached
    #[inline]
    #[must_use]
    pub fn root(&self) -> Option<&FetchedRecord> {
        self.records.last()
    }

    /// Iterate newest to oldest
    pub fn iter(&self) -> std::slice::Iter<'_, FetchedRecord> {
        self.records.iter()
    }

    /// Record identifiers, newest to oldest
    #[must_use]
    pub fn ids(&self) -> Vec<RecordId> {
        self.records.iter().map(|r| r.id).collect()
    }

    /// Check that every adjacent pair is properly linked
    ///
    /// `newer.previous_version == older.id` and versions strictly decrease.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.records.windows(2).all(|pair| {
            pair[0].previous_version == Some(pair[1].id) && pair[0].version > pair[1].version
        })
    }

    /// Consume into the underlying records
    #[inline]
    #[must_use]
    pub fn into_records(self) -> Vec<FetchedRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a VersionChain {
    type Item = &'a FetchedRecord;
    type IntoIter = std::slice::Iter<'a, FetchedRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Rebuilds version history from the ledger
#[derive(Debug, Clone)]
pub struct HistoryResolver {
    fetcher: Arc<dyn RecordFetcher>,
    retry: RetryPolicy,
}

impl HistoryResolver {
    /// Create resolver; each fetch is retried under `retry`
    #[must_use]
    pub fn new(fetcher: Arc<dyn RecordFetcher>, retry: RetryPolicy) -> Self {
        Self { fetcher, retry }
    }

    /// Fetch a single record
    ///
    /// # Errors
    /// - `PipelineError::HistoryIncomplete` (with an empty chain) if the
    ///   fetch fails
    /// - `PipelineError::Cancelled` on caller cancellation
    pub async fn fetch(&self, id: RecordId, cancel: &CancellationToken) -> Result<FetchedRecord, PipelineError> {
        fetch_with_retry(self.fetcher.as_ref(), &self.retry, id, cancel)
            .await
            .map_err(|e| e.into_pipeline_error(VersionChain::default(), id))
    }

    /// Resolve the lineage ending at `start`
    ///
    /// # Errors
    /// See [`Self::resolve_with_cancel`].
    pub async fn resolve(&self, start: RecordId) -> Result<VersionChain, PipelineError> {
        self.resolve_with_cancel(start, &CancellationToken::new()).await
    }

    /// Resolve the lineage ending at `start`, newest first
    ///
    /// # Errors
    /// - `PipelineError::HistoryCorrupt` if an identifier repeats
    /// - `PipelineError::HistoryIncomplete` if a fetch fails; carries the
    ///   records gathered so far and the identifier that could not be read
    /// - `PipelineError::Cancelled` on caller cancellation
    #[tracing::instrument(skip(self, cancel))]
    pub async fn resolve_with_cancel(
        &self,
        start: RecordId,
        cancel: &CancellationToken,
    ) -> Result<VersionChain, PipelineError> {
        let mut chain = VersionChain::default();
        let mut seen = HashSet::new();
        let mut next = Some(start);

        while let Some(id) = next {
            if !seen.insert(id) {
                tracing::error!(%id, depth = chain.len(), "cycle in version history");
                return Err(PipelineError::HistoryCorrupt(id));
            }

            let record = match fetch_with_retry(self.fetcher.as_ref(), &self.retry, id, cancel).await {
                Ok(record) => record,
                Err(e) => return Err(e.into_pipeline_error(chain, id)),
            };
            tracing::debug!(%id, version = record.version, previous = ?record.previous_version, "fetched version");

            next = record.previous_version;
            chain.records.push(record);
        }

        tracing::info!(%start, depth = chain.len(), "version history resolved");
        Ok(chain)
    }
}

/// Failure of a single retried fetch
#[derive(Debug)]
pub(crate) struct FetchFailure(RetryError);

impl FetchFailure {
    pub(crate) fn into_pipeline_error(self, chain: VersionChain, failed: RecordId) -> PipelineError {
        match self.0 {
            RetryError::Cancelled { .. } => PipelineError::Cancelled,
            RetryError::Exhausted { cause, .. } | RetryError::Rejected { cause, .. } => {
                PipelineError::HistoryIncomplete { chain, failed, cause }
            }
        }
    }
}

pub(crate) async fn fetch_with_retry(
    fetcher: &dyn RecordFetcher,
    retry: &RetryPolicy,
    id: RecordId,
    cancel: &CancellationToken,
) -> Result<FetchedRecord, FetchFailure> {
    retry
        .run(cancel, "fetch", move |_| fetcher.get(id))
        .await
        .map(|(record, _)| record)
        .map_err(FetchFailure)
}
