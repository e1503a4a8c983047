//! Parasite Registry Pipeline
//!
//! Client-side pipeline that turns parasite records into verifiable ledger
//! submissions and reads their version history back:
//! - Uploads attachments to a content-addressed blob store
//! - Builds canonical envelopes and their metadata hashes
//! - Submits add/update calls to the ledger with bounded retry
//! - Reconstructs version lineage with cycle detection
//! - Verifies stored hashes and summarizes records by location
//!
//! # Example
//!
//! ```rust,ignore
//! use preg_pipeline::{PipelineConfig, SubmissionCoordinator, SubmitRequest};
//! use preg_record::ParasiteRecord;
//!
//! # async fn example(ledger: Arc<dyn LedgerClient>, blobs: Arc<dyn BlobStore>) -> Result<(), PipelineError> {
//! let coordinator = SubmissionCoordinator::new(PipelineConfig::new(), ledger, blobs)?;
//!
//! let record = ParasiteRecord::new("Plasmodium falciparum", "Apicomplexan", "Sub-Saharan Africa")
//!     .with_metadata_entry("resistance_profile", "chloroquine-resistant");
//! let result = coordinator
//!     .submit(SubmitRequest::new(record).with_attachments(["slide-01.tiff"]))
//!     .await?;
//!
//! println!("Stored as {} with hash {}", result.record_id, result.hash);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod client;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod distribution;
pub mod error;
pub mod history;
pub mod retry;
pub mod uploader;
pub mod verify;

// Re-exports for convenience
pub use client::{BlobStore, CallArg, FetchedRecord, LedgerCall, LedgerClient, LedgerOperation, RecordFetcher};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{LedgerTarget, PipelineConfig, DEFAULT_TARGET_ADDRESS, DEFAULT_TARGET_NAME};
pub use coordinator::{PreparedSubmission, SubmissionCoordinator, SubmissionResult, SubmitRequest};
pub use distribution::{aggregate, LocationSummary};
pub use error::{ClientError, ErrorKind, PipelineError};
pub use history::{HistoryResolver, VersionChain};
pub use retry::{Backoff, RetryError, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
pub use uploader::AttachmentUploader;
pub use verify::{RecordVerifier, Verification};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the pipeline
    pub use crate::{
        CancellationToken, HistoryResolver, PipelineConfig, PipelineError, RetryPolicy,
        SubmissionCoordinator, SubmissionResult, SubmitRequest, VersionChain,
    };
    pub use preg_record::{ParasiteRecord, RecordId, RecordStatus};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
