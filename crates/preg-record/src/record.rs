//! Parasite record types
//!
//! A [`ParasiteRecord`] is the caller-owned input to the pipeline. Records
//! of one lineage are linked backwards through `previous_version`.

use crate::value::{MetadataMap, MetadataValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ledger-assigned record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Raw numeric value
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Blob-store content identifier
///
/// Opaque to the pipeline; the blob store derives it from the uploaded bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Wrap an identifier returned by the blob store
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Active,
    Archived,
    Updated,
}

impl RecordStatus {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Updated => "updated",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parasite taxonomy/metadata record
///
/// # Invariants (checked by [`crate::validate`])
/// - `name`, `classification`, `location` are non-empty
/// - `metadata` is an object
/// - `version >= 1`
/// - `previous_version.is_some()` iff `version > 1`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParasiteRecord {
    pub name: String,
    pub classification: String,
    pub location: String,
    pub metadata: MetadataValue,
    pub researcher: String,
    pub institution: String,
    pub status: RecordStatus,
    pub version: u32,
    pub previous_version: Option<RecordId>,
}

impl ParasiteRecord {
    /// First version of a new lineage, with empty metadata
    pub fn new(
        name: impl Into<String>,
        classification: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            classification: classification.into(),
            location: location.into(),
            metadata: MetadataValue::empty_object(),
            researcher: String::new(),
            institution: String::new(),
            status: RecordStatus::Active,
            version: 1,
            previous_version: None,
        }
    }

    /// Replace metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: impl Into<MetadataValue>) -> Self {
        self.metadata = metadata.into();
        self
    }

    /// Insert a single metadata entry
    ///
    /// Non-object metadata is replaced by an object first.
    #[must_use]
    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        if !matches!(self.metadata, MetadataValue::Object(_)) {
            self.metadata = MetadataValue::empty_object();
        }
        if let MetadataValue::Object(map) = &mut self.metadata {
            map.insert(key.into(), value.into());
        }
        self
    }

    /// Set researcher and institution
    #[must_use]
    pub fn with_provenance(mut self, researcher: impl Into<String>, institution: impl Into<String>) -> Self {
        self.researcher = researcher.into();
        self.institution = institution.into();
        self
    }

    /// Set status
    #[must_use]
    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = status;
        self
    }

    /// Set version and backward link explicitly
    #[must_use]
    pub fn with_version(mut self, version: u32, previous_version: Option<RecordId>) -> Self {
        self.version = version;
        self.previous_version = previous_version;
        self
    }

    /// Next version in this lineage, linked to `stored_as`
    ///
    /// `stored_as` is the ledger identifier this record was submitted under.
    #[must_use]
    pub fn next_version(&self, stored_as: RecordId) -> Self {
        Self {
            version: self.version.saturating_add(1),
            previous_version: Some(stored_as),
            status: RecordStatus::Updated,
            ..self.clone()
        }
    }

    /// Metadata as an object, if it is one
    #[inline]
    #[must_use]
    pub fn metadata_map(&self) -> Option<&MetadataMap> {
        self.metadata.as_object()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_first_version() {
        let r = ParasiteRecord::new("Plasmodium falciparum", "Apicomplexan", "Sub-Saharan Africa");
        assert_eq!(r.version, 1);
        assert!(r.previous_version.is_none());
        assert_eq!(r.status, RecordStatus::Active);
        assert!(r.metadata_map().unwrap().is_empty());
    }

    #[test]
    fn next_version_links_back() {
        let r = ParasiteRecord::new("X", "Y", "Z");
        let next = r.next_version(RecordId(7));
        assert_eq!(next.version, 2);
        assert_eq!(next.previous_version, Some(RecordId(7)));
        assert_eq!(next.status, RecordStatus::Updated);
        assert_eq!(next.name, "X");
    }

    #[test]
    fn metadata_entry_replaces_non_object() {
        let r = ParasiteRecord::new("X", "Y", "Z")
            .with_metadata(MetadataValue::from("scalar"))
            .with_metadata_entry("prevalence", "high");
        assert_eq!(r.metadata_map().unwrap().len(), 1);
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(serde_json::to_string(&RecordStatus::Archived).unwrap(), "\"archived\"");
        assert_eq!(RecordStatus::Updated.to_string(), "updated");
    }

    #[test]
    fn record_id_parse_and_display() {
        let id: RecordId = "42".parse().unwrap();
        assert_eq!(id, RecordId(42));
        assert_eq!(id.to_string(), "42");
    }
}
