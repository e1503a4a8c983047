//! Attachment uploader
//!
//! Pushes auxiliary files to the blob store concurrently:
//! - At most `max_concurrent` uploads in flight per call
//! - Output identifiers line up with input paths, whatever the completion order
//! - The first failure to complete aborts the batch; outstanding uploads are dropped
//!
//! The bounded pool lives only for the duration of one [`AttachmentUploader::upload`]
//! call. Nothing is shared across calls.

use crate::client::BlobStore;
use crate::error::{ClientError, PipelineError};
use crate::retry::{RetryError, RetryPolicy};
use futures::stream::{self, StreamExt, TryStreamExt};
use preg_record::ContentId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Concurrent, order-preserving attachment uploader
#[derive(Debug, Clone)]
pub struct AttachmentUploader {
    store: Arc<dyn BlobStore>,
    max_concurrent: usize,
    retry: RetryPolicy,
}

impl AttachmentUploader {
    /// Create uploader with the given concurrency bound
    ///
    /// A bound of zero is treated as one. Uploads are not retried unless a
    /// policy is set with [`Self::with_retry`].
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>, max_concurrent: usize) -> Self {
        Self {
            store,
            max_concurrent: max_concurrent.max(1),
            retry: RetryPolicy::no_retry(),
        }
    }

    /// Retry transient upload failures under `retry`
    ///
    /// Safe because identical bytes always get the same identifier.
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Concurrency bound
    #[inline]
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Upload all files, returning identifiers in input order
    ///
    /// # Errors
    /// - `PipelineError::UploadFailed` for the first file that could not be
    ///   read or stored
    /// - `PipelineError::Cancelled` if `cancel` fires between retry attempts
    pub async fn upload(
        &self,
        paths: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentId>, PipelineError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(
            count = paths.len(),
            max_concurrent = self.max_concurrent,
            "uploading attachments"
        );

        // Completion order, so a failure surfaces without waiting on slower
        // earlier uploads; input order is restored once all succeed.
        let mut indexed: Vec<(usize, ContentId)> = stream::iter(paths.iter().enumerate())
            .map(|(index, path)| async move {
                self.upload_one(path, cancel).await.map(|cid| (index, cid))
            })
            .buffer_unordered(self.max_concurrent)
            .try_collect()
            .await?;
        indexed.sort_unstable_by_key(|(index, _)| *index);

        tracing::debug!(count = indexed.len(), "attachments uploaded");
        Ok(indexed.into_iter().map(|(_, cid)| cid).collect())
    }

    async fn upload_one(&self, path: &Path, cancel: &CancellationToken) -> Result<ContentId, PipelineError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| PipelineError::UploadFailed {
            path: path.to_path_buf(),
            cause: ClientError::permanent(format!("read failed: {e}")),
        })?;

        let store = &self.store;
        let bytes = bytes.as_slice();
        let outcome = self
            .retry
            .run(cancel, "upload", move |_| store.put(bytes))
            .await;

        match outcome {
            Ok((cid, attempts)) => {
                tracing::debug!(path = %path.display(), %cid, attempts, "attachment stored");
                Ok(cid)
            }
            Err(RetryError::Cancelled { .. }) => Err(PipelineError::Cancelled),
            Err(RetryError::Exhausted { cause, .. } | RetryError::Rejected { cause, .. }) => {
                tracing::warn!(path = %path.display(), error = %cause, "attachment upload failed");
                Err(PipelineError::UploadFailed {
                    path: path.to_path_buf(),
                    cause,
                })
            }
        }
    }
}
