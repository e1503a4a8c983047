//! Submission coordinator
//!
//! Drives one record from caller input to a confirmed ledger entry:
//! 1. Validate the record (local, never retried)
//! 2. Upload attachments, if any, and collect content identifiers
//! 3. Build the canonical envelope and derive its hash
//! 4. Pick add vs. update from the presence of an update target
//! 5. Call the ledger under the retry policy
//! 6. Return a [`SubmissionResult`] binding the ledger id to the hash sent
//!
//! The envelope (and its timestamp) is fixed before the retry loop, so every
//! attempt sends byte-identical content.

use crate::client::{BlobStore, CallArg, LedgerCall, LedgerClient, LedgerOperation};
use crate::clock::{Clock, SystemClock};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::retry::RetryError;
use crate::uploader::AttachmentUploader;
use preg_record::{
    encode, validate, CanonicalEnvelope, ContentId, MetadataHash, ParasiteRecord, RecordId,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A record to submit, with optional attachments and update target
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub record: ParasiteRecord,
    pub attachments: Vec<PathBuf>,
    pub update_target: Option<RecordId>,
}

impl SubmitRequest {
    /// Submit `record` as a new ledger entry
    #[inline]
    #[must_use]
    pub fn new(record: ParasiteRecord) -> Self {
        Self {
            record,
            attachments: Vec::new(),
            update_target: None,
        }
    }

    /// With attachment files
    #[inline]
    #[must_use]
    pub fn with_attachments(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.attachments = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Submit as an update of an existing ledger entry
    #[inline]
    #[must_use]
    pub fn updating(mut self, target: RecordId) -> Self {
        self.update_target = Some(target);
        self
    }
}

/// Validated, encoded record ready for the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSubmission {
    pub envelope: CanonicalEnvelope,
    pub hash: MetadataHash,
}

/// Confirmed ledger entry
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    /// Identifier assigned by the ledger
    pub record_id: RecordId,
    /// Hash that was actually submitted
    pub hash: MetadataHash,
    /// Envelope the hash was derived from
    pub envelope: CanonicalEnvelope,
    /// Contract function that was called
    pub operation: LedgerOperation,
    /// Ledger attempts it took
    pub attempts: u32,
}

/// Assembles envelopes and submits them to the ledger
#[derive(Debug)]
pub struct SubmissionCoordinator {
    config: PipelineConfig,
    ledger: Arc<dyn LedgerClient>,
    uploader: AttachmentUploader,
    clock: Arc<dyn Clock>,
}

impl SubmissionCoordinator {
    /// Create coordinator
    ///
    /// # Errors
    /// Returns `PipelineError::Config` if `config` does not validate.
    pub fn new(
        config: PipelineConfig,
        ledger: Arc<dyn LedgerClient>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let uploader = AttachmentUploader::new(blobs, config.max_concurrent_uploads)
            .with_retry(config.retry.clone());
        Ok(Self {
            config,
            ledger,
            uploader,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate and encode a record without touching the network
    ///
    /// `attachments` are content identifiers already obtained from the blob
    /// store.
    ///
    /// # Errors
    /// - `PipelineError::RecordInvalid` if validation fails
    /// - `PipelineError::Encoding` if the envelope cannot be encoded
    pub fn prepare(
        &self,
        record: &ParasiteRecord,
        attachments: Vec<ContentId>,
    ) -> Result<PreparedSubmission, PipelineError> {
        validate(record)?;
        self.build_envelope(record, attachments)
    }

    /// Contract call for a prepared submission
    ///
    /// The update target, when present, is the first argument.
    #[must_use]
    pub fn ledger_call(&self, prepared: &PreparedSubmission, update_target: Option<RecordId>) -> LedgerCall {
        let env = &prepared.envelope;
        let mut arguments = Vec::with_capacity(5);
        let operation = match update_target {
            Some(target) => {
                arguments.push(CallArg::Uint(target.get()));
                LedgerOperation::UpdateRecord
            }
            None => LedgerOperation::AddRecord,
        };
        arguments.extend([
            CallArg::Text(env.name().to_string()),
            CallArg::Text(env.classification().to_string()),
            CallArg::Text(env.location().to_string()),
            CallArg::Hash(prepared.hash),
        ]);

        LedgerCall {
            target_address: self.config.ledger.target_address.clone(),
            target_name: self.config.ledger.target_name.clone(),
            operation,
            arguments,
        }
    }

    /// Submit a record
    ///
    /// # Errors
    /// See [`Self::submit_with_cancel`].
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmissionResult, PipelineError> {
        self.submit_with_cancel(request, &CancellationToken::new()).await
    }

    /// Submit a record, aborting between attempts if `cancel` fires
    ///
    /// # Errors
    /// - `PipelineError::RecordInvalid` before any network call
    /// - `PipelineError::UploadFailed` if any attachment fails
    /// - `PipelineError::SubmissionFailed` once the ledger call fails
    ///   permanently or retries run out
    /// - `PipelineError::Cancelled` on caller cancellation
    #[tracing::instrument(
        skip_all,
        fields(
            name = %request.record.name,
            version = request.record.version,
            update_target = ?request.update_target,
        )
    )]
    pub async fn submit_with_cancel(
        &self,
        request: SubmitRequest,
        cancel: &CancellationToken,
    ) -> Result<SubmissionResult, PipelineError> {
        let SubmitRequest {
            record,
            attachments,
            update_target,
        } = request;

        validate(&record)?;

        let content_ids = self.uploader.upload(&attachments, cancel).await?;

        // Fixed here: every retry below resends these exact bytes.
        let prepared = self.build_envelope(&record, content_ids)?;
        let call = self.ledger_call(&prepared, update_target);
        tracing::debug!(hash = %prepared.hash, operation = %call.operation, "envelope prepared");

        let ledger = &self.ledger;
        let call_ref = &call;
        let outcome = self
            .config
            .retry
            .run(cancel, call.operation.function_name(), move |attempt| {
                tracing::debug!(attempt, "submitting to ledger");
                ledger.call(call_ref)
            })
            .await;

        match outcome {
            Ok((record_id, attempts)) => {
                tracing::info!(%record_id, hash = %prepared.hash.short(), attempts, "record submitted");
                Ok(SubmissionResult {
                    record_id,
                    hash: prepared.hash,
                    envelope: prepared.envelope,
                    operation: call.operation,
                    attempts,
                })
            }
            Err(RetryError::Cancelled { attempts }) => {
                tracing::warn!(attempts, "submission cancelled");
                Err(PipelineError::Cancelled)
            }
            Err(RetryError::Exhausted { cause, attempts } | RetryError::Rejected { cause, attempts }) => {
                tracing::error!(attempts, error = %cause, "submission failed");
                Err(PipelineError::SubmissionFailed {
                    cause,
                    attempts_made: attempts,
                })
            }
        }
    }

    fn build_envelope(
        &self,
        record: &ParasiteRecord,
        attachments: Vec<ContentId>,
    ) -> Result<PreparedSubmission, PipelineError> {
        let envelope = CanonicalEnvelope::build(record, self.clock.now(), attachments);
        let hash = encode(&envelope)?.hash;
        Ok(PreparedSubmission { envelope, hash })
    }
}
