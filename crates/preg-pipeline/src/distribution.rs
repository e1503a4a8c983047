//! Geographic distribution of fetched records
//!
//! Pure in-memory grouping; no network access.

use crate::client::FetchedRecord;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Per-location summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationSummary {
    /// Records at this location
    pub count: usize,
    /// Distinct classifications seen
    pub classifications: BTreeSet<String>,
    /// Latest `recorded_at` among them
    pub most_recent: DateTime<Utc>,
}

/// Group records by location
///
/// Empty input yields an empty map.
#[must_use]
pub fn aggregate<'a, I>(records: I) -> BTreeMap<String, LocationSummary>
where
    I: IntoIterator<Item = &'a FetchedRecord>,
{
    let mut out: BTreeMap<String, LocationSummary> = BTreeMap::new();
    for record in records {
        out.entry(record.location.clone())
            .and_modify(|s| {
                s.count += 1;
                s.classifications.insert(record.classification.clone());
                s.most_recent = s.most_recent.max(record.recorded_at);
            })
            .or_insert_with(|| LocationSummary {
                count: 1,
                classifications: BTreeSet::from([record.classification.clone()]),
                most_recent: record.recorded_at,
            });
    }
    out
}
