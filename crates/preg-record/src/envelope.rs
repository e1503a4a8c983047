//! Canonical envelope and encoder
//!
//! A [`CanonicalEnvelope`] is the fully assembled structure that gets hashed
//! and stored: record fields, a normalized UTC timestamp, and attachment
//! content identifiers. [`encode`] turns it into canonical bytes and a
//! [`MetadataHash`].
//!
//! # Canonical form
//! - Compact JSON, no insignificant whitespace
//! - Object keys in byte-wise lexicographic order at every depth
//! - Timestamps as RFC 3339 UTC with exactly six fractional digits and `Z`
//! - Non-finite floats are not representable and are rejected

use crate::hash::MetadataHash;
use crate::record::{ContentId, ParasiteRecord, RecordId, RecordStatus};
use crate::value::MetadataValue;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use std::io::Write;

/// Errors raised while producing canonical bytes
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// NaN or infinity somewhere in the tree
    #[error("non-finite number at {path}")]
    NonFiniteNumber { path: String },

    /// Underlying JSON writer failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Immutable, hash-ready view of a record
///
/// Built once per submission. Any change to the record means building a
/// new envelope; there are no setters.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEnvelope {
    name: String,
    classification: String,
    location: String,
    metadata: MetadataValue,
    researcher: String,
    institution: String,
    status: RecordStatus,
    version: u32,
    previous_version: Option<RecordId>,
    timestamp: DateTime<Utc>,
    attachments: Vec<ContentId>,
}

impl CanonicalEnvelope {
    /// Assemble an envelope from a record, a generation time and content ids
    ///
    /// The timestamp is truncated to microseconds so the stored value and
    /// its rendered form always agree.
    #[must_use]
    pub fn build(record: &ParasiteRecord, timestamp: DateTime<Utc>, attachments: Vec<ContentId>) -> Self {
        Self {
            name: record.name.clone(),
            classification: record.classification.clone(),
            location: record.location.clone(),
            metadata: record.metadata.clone(),
            researcher: record.researcher.clone(),
            institution: record.institution.clone(),
            status: record.status,
            version: record.version,
            previous_version: record.previous_version,
            timestamp: timestamp.trunc_subsecs(6),
            attachments,
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn classification(&self) -> &str {
        &self.classification
    }

    #[inline]
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[inline]
    #[must_use]
    pub fn metadata(&self) -> &MetadataValue {
        &self.metadata
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[inline]
    #[must_use]
    pub fn previous_version(&self) -> Option<RecordId> {
        self.previous_version
    }

    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Fixed-precision timestamp string used in the canonical form
    #[must_use]
    pub fn timestamp_string(&self) -> String {
        normalize_timestamp(self.timestamp)
    }

    #[inline]
    #[must_use]
    pub fn attachments(&self) -> &[ContentId] {
        &self.attachments
    }
}

/// Canonical bytes together with their digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalBytes {
    pub bytes: Vec<u8>,
    pub hash: MetadataHash,
}

/// Render a timestamp in the canonical UTC form
#[must_use]
pub fn normalize_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Encode an envelope into canonical bytes and derive its hash
///
/// # Errors
/// Returns [`EncodeError::NonFiniteNumber`] if metadata holds NaN or infinity.
pub fn encode(envelope: &CanonicalEnvelope) -> Result<CanonicalBytes, EncodeError> {
    let mut out = Vec::with_capacity(256);
    write_envelope(&mut out, envelope)?;
    let hash = MetadataHash::compute(&out);
    Ok(CanonicalBytes { bytes: out, hash })
}

/// Recompute the hash of an envelope and compare
///
/// # Errors
/// Propagates encoding failures.
pub fn verify_envelope(envelope: &CanonicalEnvelope, expected: &MetadataHash) -> Result<bool, EncodeError> {
    Ok(encode(envelope)?.hash == *expected)
}

// Keys are written in sorted order; keep this list sorted when adding fields.
fn write_envelope(out: &mut Vec<u8>, env: &CanonicalEnvelope) -> Result<(), EncodeError> {
    out.push(b'{');

    write_key(out, "attachments", true)?;
    out.push(b'[');
    for (i, cid) in env.attachments.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        serde_json::to_writer(&mut *out, cid.as_str())?;
    }
    out.push(b']');

    write_key(out, "classification", false)?;
    serde_json::to_writer(&mut *out, &env.classification)?;
    write_key(out, "institution", false)?;
    serde_json::to_writer(&mut *out, &env.institution)?;
    write_key(out, "location", false)?;
    serde_json::to_writer(&mut *out, &env.location)?;
    write_key(out, "metadata", false)?;
    write_value(out, &env.metadata, "metadata")?;
    write_key(out, "name", false)?;
    serde_json::to_writer(&mut *out, &env.name)?;
    write_key(out, "previous_version", false)?;
    match env.previous_version {
        Some(id) => serde_json::to_writer(&mut *out, &id.get())?,
        None => out.extend_from_slice(b"null"),
    }
    write_key(out, "researcher", false)?;
    serde_json::to_writer(&mut *out, &env.researcher)?;
    write_key(out, "status", false)?;
    serde_json::to_writer(&mut *out, env.status.as_str())?;
    write_key(out, "timestamp", false)?;
    serde_json::to_writer(&mut *out, &normalize_timestamp(env.timestamp))?;
    write_key(out, "version", false)?;
    serde_json::to_writer(&mut *out, &env.version)?;

    out.push(b'}');
    Ok(())
}

fn write_key(out: &mut Vec<u8>, key: &str, first: bool) -> Result<(), EncodeError> {
    if !first {
        out.push(b',');
    }
    serde_json::to_writer(&mut *out, key)?;
    out.push(b':');
    Ok(())
}

fn write_value(out: &mut Vec<u8>, value: &MetadataValue, path: &str) -> Result<(), EncodeError> {
    match value {
        MetadataValue::Null => out.extend_from_slice(b"null"),
        MetadataValue::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        MetadataValue::Integer(i) => {
            write!(out, "{i}").map_err(serde_json::Error::io)?;
        }
        MetadataValue::UInteger(u) => {
            write!(out, "{u}").map_err(serde_json::Error::io)?;
        }
        MetadataValue::Float(f) => {
            let n = serde_json::Number::from_f64(*f).ok_or_else(|| EncodeError::NonFiniteNumber {
                path: path.to_string(),
            })?;
            serde_json::to_writer(&mut *out, &n)?;
        }
        MetadataValue::String(s) => serde_json::to_writer(&mut *out, s)?,
        MetadataValue::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item, &format!("{path}[{i}]"))?;
            }
            out.push(b']');
        }
        MetadataValue::Object(map) => {
            // BTreeMap<String, _> iterates in byte-wise key order
            out.push(b'{');
            for (i, (k, v)) in map.iter().enumerate() {
                write_key(out, k, i == 0)?;
                write_value(out, v, &format!("{path}.{k}"))?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn canonical_bytes_exact_layout() {
        let record = ParasiteRecord::new("X", "Y", "Z")
            .with_metadata_entry("b", 2_i64)
            .with_metadata_entry("a", "one");
        let env = CanonicalEnvelope::build(&record, ts(), vec![ContentId::new("cid1")]);
        let encoded = encode(&env).unwrap();

        assert_eq!(
            String::from_utf8(encoded.bytes).unwrap(),
            concat!(
                r#"{"attachments":["cid1"],"classification":"Y","institution":"","#,
                r#""location":"Z","metadata":{"a":"one","b":2},"name":"X","#,
                r#""previous_version":null,"researcher":"","status":"active","#,
                r#""timestamp":"2024-05-01T12:30:00.000000Z","version":1}"#
            )
        );
    }

    #[test]
    fn canonical_bytes_parse_back_as_json() {
        let record = ParasiteRecord::new("X", "Y", "Z")
            .with_metadata_entry("nested", MetadataValue::from(serde_json::json!({"z": [1.5, null, true]})))
            .with_version(2, Some(RecordId(41)));
        let env = CanonicalEnvelope::build(&record, ts(), vec![]);
        let encoded = encode(&env).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&encoded.bytes).unwrap();
        assert_eq!(parsed["previous_version"], 41);
        assert_eq!(parsed["metadata"]["nested"]["z"][0], 1.5);
    }

    #[test]
    fn hash_matches_bytes() {
        let env = CanonicalEnvelope::build(&ParasiteRecord::new("X", "Y", "Z"), ts(), vec![]);
        let encoded = encode(&env).unwrap();
        assert_eq!(encoded.hash, MetadataHash::compute(&encoded.bytes));
        assert!(verify_envelope(&env, &encoded.hash).unwrap());
    }

    #[test]
    fn timestamp_truncated_to_micros() {
        let precise = ts() + chrono::Duration::nanoseconds(123_456_789);
        let env = CanonicalEnvelope::build(&ParasiteRecord::new("X", "Y", "Z"), precise, vec![]);
        assert_eq!(env.timestamp_string(), "2024-05-01T12:30:00.123456Z");
        assert_eq!(env.timestamp().timestamp_subsec_nanos(), 123_456_000);
    }

    #[test]
    fn non_finite_metadata_rejected_with_path() {
        let record = ParasiteRecord::new("X", "Y", "Z")
            .with_metadata_entry("samples", MetadataValue::Array(vec![MetadataValue::Float(f64::NAN)]));
        let env = CanonicalEnvelope::build(&record, ts(), vec![]);
        match encode(&env) {
            Err(EncodeError::NonFiniteNumber { path }) => assert_eq!(path, "metadata.samples[0]"),
            other => panic!("expected NonFiniteNumber, got {other:?}"),
        }
    }

    #[test]
    fn attachment_order_matters() {
        let record = ParasiteRecord::new("X", "Y", "Z");
        let a = CanonicalEnvelope::build(&record, ts(), vec![ContentId::new("a"), ContentId::new("b")]);
        let b = CanonicalEnvelope::build(&record, ts(), vec![ContentId::new("b"), ContentId::new("a")]);
        assert_ne!(encode(&a).unwrap().hash, encode(&b).unwrap().hash);
    }
}
