//! Error types for the record pipeline
//!
//! Two layers:
//! - [`ClientError`]: what a collaborator (ledger, blob store, fetcher)
//!   reports, already classified as transient or permanent
//! - [`PipelineError`]: what every public pipeline operation returns

use crate::history::VersionChain;
use preg_record::{EncodeError, RecordId, ValidationError};
use std::fmt;
use std::path::PathBuf;

/// Transient vs. permanent classification made at the collaborator boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failure, timeout, node unavailable: safe to retry
    Transient,
    /// Semantic rejection, malformed arguments, missing record: never retried
    Permanent,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Permanent => f.write_str("permanent"),
        }
    }
}

/// Error reported by an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct ClientError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClientError {
    /// Retryable failure
    #[inline]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Non-retryable failure
    #[inline]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// Whether retrying may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Record failed local validation
    #[error("record invalid: {0}")]
    RecordInvalid(#[from] ValidationError),

    /// Envelope could not be encoded
    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodeError),

    /// An attachment could not be read or stored
    #[error("upload failed for {}: {cause}", .path.display())]
    UploadFailed { path: PathBuf, cause: ClientError },

    /// The ledger call did not succeed
    #[error("submission failed after {attempts_made} attempt(s): {cause}")]
    SubmissionFailed { cause: ClientError, attempts_made: u32 },

    /// A record identifier reappeared while walking a lineage
    #[error("history corrupt: record {0} appears twice in its lineage")]
    HistoryCorrupt(RecordId),

    /// A fetch failed before the lineage reached its root
    #[error("history incomplete after {} record(s): fetch of {failed} failed: {cause}", .chain.len())]
    HistoryIncomplete {
        chain: VersionChain,
        failed: RecordId,
        cause: ClientError,
    },

    /// Caller requested cancellation
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Check if a later, independent call could succeed without changing input
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UploadFailed { cause, .. }
            | Self::SubmissionFailed { cause, .. }
            | Self::HistoryIncomplete { cause, .. } => cause.is_transient(),
            Self::Cancelled
            | Self::RecordInvalid(_)
            | Self::Encoding(_)
            | Self::HistoryCorrupt(_)
            | Self::Config(_) => false,
        }
    }

    /// Check if the error is a caller-requested abort
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
