//! Parasite Registry Records
//!
//! Record types, validation, and canonical content hashing for parasite
//! provenance records.
//!
//! # Core Concepts
//!
//! - [`ParasiteRecord`]: Caller-owned input, one version of a lineage
//! - [`MetadataValue`]: Tagged value tree for open-ended metadata
//! - [`validate`]: Structural checks run before any network I/O
//! - [`CanonicalEnvelope`]: Immutable, hash-ready form of a record
//! - [`encode`]: Canonical bytes plus [`MetadataHash`] (SHA-256)
//!
//! # Example
//!
//! ```rust
//! use preg_record::{encode, validate, CanonicalEnvelope, ParasiteRecord};
//!
//! let record = ParasiteRecord::new("Plasmodium falciparum", "Apicomplexan", "Sub-Saharan Africa")
//!     .with_metadata_entry("prevalence", "high");
//! validate(&record).unwrap();
//!
//! let envelope = CanonicalEnvelope::build(&record, chrono::Utc::now(), Vec::new());
//! let encoded = encode(&envelope).unwrap();
//! println!("Hash: {}", encoded.hash);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod envelope;
mod hash;
mod record;
mod validation;
mod value;

pub use envelope::{
    encode, normalize_timestamp, verify_envelope, CanonicalBytes, CanonicalEnvelope, EncodeError,
};
pub use hash::{HashError, MetadataHash};
pub use record::{ContentId, ParasiteRecord, RecordId, RecordStatus};
pub use validation::{validate, ValidationError};
pub use value::{MetadataMap, MetadataValue};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
