//! Record validation
//!
//! Local, synchronous checks run before any network interaction.
//! A failure here is never retried: the caller must fix the input.

use crate::record::ParasiteRecord;
use crate::value::MetadataValue;

/// Reasons a record is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required string field is empty
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),

    /// Metadata is not an object
    #[error("metadata must be a mapping, got {kind}")]
    MetadataNotMapping { kind: &'static str },

    /// Version is zero
    #[error("version must be positive, got {0}")]
    NonPositiveVersion(u32),

    /// Later version without a backward link
    #[error("version {version} requires a previous version reference")]
    MissingPreviousVersion { version: u32 },

    /// First version carrying a backward link
    #[error("version 1 must not reference a previous version")]
    UnexpectedPreviousVersion,

    /// NaN or infinite number inside metadata
    #[error("non-finite number at {path}")]
    NonFiniteNumber { path: String },
}

/// Validate a record against its structural invariants
///
/// # Errors
/// Returns the first violated invariant, checked in field order.
pub fn validate(record: &ParasiteRecord) -> Result<(), ValidationError> {
    for (field, value) in [
        ("name", &record.name),
        ("classification", &record.classification),
        ("location", &record.location),
    ] {
        if value.trim().is_empty() {
            return Err(ValidationError::EmptyField(field));
        }
    }

    if !matches!(record.metadata, MetadataValue::Object(_)) {
        return Err(ValidationError::MetadataNotMapping {
            kind: record.metadata.kind(),
        });
    }
    if let Some(path) = record.metadata.find_non_finite("metadata") {
        return Err(ValidationError::NonFiniteNumber { path });
    }

    match (record.version, record.previous_version) {
        (0, _) => Err(ValidationError::NonPositiveVersion(0)),
        (1, Some(_)) => Err(ValidationError::UnexpectedPreviousVersion),
        (v, None) if v > 1 => Err(ValidationError::MissingPreviousVersion { version: v }),
        _ => Ok(()),
    }
}
