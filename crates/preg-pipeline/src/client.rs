//! External collaborator interfaces
//!
//! The pipeline talks to three collaborators it does not implement:
//! - [`LedgerClient`]: signs, broadcasts and confirms contract calls
//! - [`BlobStore`]: content-addressed storage for attachments
//! - [`RecordFetcher`]: reads stored records back by identifier
//!
//! Implementations classify their failures as transient or permanent
//! (see [`ClientError`]); the pipeline only retries transient ones.

use crate::error::ClientError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use preg_record::{ContentId, MetadataHash, MetadataValue, RecordId, RecordStatus};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// Ledger contract function invoked by a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerOperation {
    #[serde(rename = "add-parasite-record")]
    AddRecord,
    #[serde(rename = "update-parasite-record")]
    UpdateRecord,
}

impl LedgerOperation {
    /// Contract function name
    #[must_use]
    pub const fn function_name(self) -> &'static str {
        match self {
            Self::AddRecord => "add-parasite-record",
            Self::UpdateRecord => "update-parasite-record",
        }
    }
}

impl fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function_name())
    }
}

/// One positional argument of a contract call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CallArg {
    /// Unsigned integer (record identifiers)
    Uint(u64),
    /// UTF-8 string
    Text(String),
    /// Metadata hash, hex encoded on the wire
    Hash(MetadataHash),
}

/// Contract call handed to the ledger client
///
/// Serializes as
/// `{target_address, target_name, operation, arguments: [existingId?, name, classification, location, metadataHash]}`.
/// `existingId` is present only for [`LedgerOperation::UpdateRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerCall {
    pub target_address: String,
    pub target_name: String,
    pub operation: LedgerOperation,
    pub arguments: Vec<CallArg>,
}

/// A record as read back from the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedRecord {
    pub id: RecordId,
    pub name: String,
    pub classification: String,
    pub location: String,
    #[serde(default = "MetadataValue::empty_object")]
    pub metadata: MetadataValue,
    #[serde(default)]
    pub researcher: String,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub status: RecordStatus,
    pub version: u32,
    #[serde(default)]
    pub previous_version: Option<RecordId>,
    pub metadata_hash: MetadataHash,
    /// Ledger time at which the record was stored
    pub recorded_at: DateTime<Utc>,
}

/// Append-only ledger
#[async_trait]
pub trait LedgerClient: Send + Sync + Debug {
    /// Submit a contract call and wait for it to be accepted
    ///
    /// Returns the identifier the ledger assigned to the stored record.
    async fn call(&self, call: &LedgerCall) -> Result<RecordId, ClientError>;
}

/// Content-addressed blob store
///
/// Identical bytes must always map to the same identifier, which makes
/// repeated uploads safe.
#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    async fn put(&self, bytes: &[u8]) -> Result<ContentId, ClientError>;
}

/// Read access to stored records
#[async_trait]
pub trait RecordFetcher: Send + Sync + Debug {
    async fn get(&self, id: RecordId) -> Result<FetchedRecord, ClientError>;
}
