//! Testing utilities for the parasite registry workspace
//!
//! In-memory collaborators, fixtures, and a tracing initializer.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use preg_pipeline::{
    BlobStore, CallArg, ClientError, FetchedRecord, FixedClock, LedgerCall, LedgerClient,
    LedgerOperation, RecordFetcher,
};
use preg_record::{ContentId, MetadataHash, MetadataValue, ParasiteRecord, RecordId, RecordStatus};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

/// Install a `tracing` subscriber for tests (once per process)
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Fixed instant used by fixtures
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Clock frozen at [`test_epoch`]
pub fn test_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(test_epoch()))
}

/// Sample first-version record
pub fn sample_record() -> ParasiteRecord {
    ParasiteRecord::new("Plasmodium falciparum", "Apicomplexan", "Sub-Saharan Africa")
        .with_provenance("Dr. A. Researcher", "Institute of Parasitology")
        .with_metadata_entry("resistance_profile", "chloroquine-resistant")
        .with_metadata_entry("prevalence", "high")
        .with_metadata_entry("year_identified", 2024_i64)
}

/// Fetched record fixture
pub fn fetched_record(id: u64, version: u32, previous: Option<u64>) -> FetchedRecord {
    FetchedRecord {
        id: RecordId(id),
        name: "X".into(),
        classification: "Y".into(),
        location: "Z".into(),
        metadata: MetadataValue::empty_object(),
        researcher: String::new(),
        institution: String::new(),
        status: if version > 1 {
            RecordStatus::Updated
        } else {
            RecordStatus::Active
        },
        version,
        previous_version: previous.map(RecordId),
        metadata_hash: MetadataHash::compute(&id.to_be_bytes()),
        recorded_at: test_epoch() + ChronoDuration::seconds(i64::try_from(id).unwrap_or(i64::MAX)),
    }
}

/// Linear lineage of `depth` versions with ids `1..=depth`; returns the records oldest first
pub fn lineage(depth: u64) -> Vec<FetchedRecord> {
    (1..=depth)
        .map(|id| {
            let version = u32::try_from(id).unwrap_or(u32::MAX);
            fetched_record(id, version, (id > 1).then(|| id - 1))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Blob store
// ---------------------------------------------------------------------------

type LatencyFn = Box<dyn Fn(&[u8]) -> Duration + Send + Sync>;

/// Content-addressed in-memory blob store
///
/// Identifiers are `b3:` followed by the BLAKE3 hex digest of the bytes.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<ContentId, Vec<u8>>>,
    failures: Mutex<HashMap<Vec<u8>, VecDeque<ClientError>>>,
    latency: Option<LatencyFn>,
    puts: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("blobs", &self.blobs.lock().len())
            .field("puts", &self.puts.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay each put by `latency(bytes)`
    #[must_use]
    pub fn with_latency(mut self, latency: impl Fn(&[u8]) -> Duration + Send + Sync + 'static) -> Self {
        self.latency = Some(Box::new(latency));
        self
    }

    /// Fail the next puts of `content` with `errors`, in order
    pub fn fail_content(&self, content: &[u8], errors: impl IntoIterator<Item = ClientError>) {
        self.failures
            .lock()
            .entry(content.to_vec())
            .or_default()
            .extend(errors);
    }

    /// Identifier this store assigns to `bytes`
    pub fn content_id(bytes: &[u8]) -> ContentId {
        ContentId::new(format!("b3:{}", blake3::hash(bytes).to_hex()))
    }

    pub fn get(&self, cid: &ContentId) -> Option<Vec<u8>> {
        self.blobs.lock().get(cid).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total put calls, including failed ones
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent puts observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, bytes: &[u8]) -> Result<ContentId, ClientError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(bytes)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self
            .failures
            .lock()
            .get_mut(bytes)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        let cid = Self::content_id(bytes);
        self.blobs.lock().insert(cid.clone(), bytes.to_vec());
        Ok(cid)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LedgerState {
    next_id: u64,
    records: HashMap<RecordId, FetchedRecord>,
    calls: Vec<LedgerCall>,
    failures: VecDeque<ClientError>,
    fail_always: Option<ClientError>,
}

/// In-memory ledger that stores accepted calls as records
///
/// Also serves as the [`RecordFetcher`] for what it stored. Identifiers
/// start at 1. An update stores a new record linked to its target.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next calls with `errors`, in order
    pub fn fail_next(&self, errors: impl IntoIterator<Item = ClientError>) {
        self.state.lock().failures.extend(errors);
    }

    /// Fail every call with `error`
    pub fn fail_always(&self, error: ClientError) {
        self.state.lock().fail_always = Some(error);
    }

    /// Every call received, including failed ones
    pub fn calls(&self) -> Vec<LedgerCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Stored record by id
    pub fn record(&self, id: RecordId) -> Option<FetchedRecord> {
        self.state.lock().records.get(&id).cloned()
    }

    /// Overwrite a stored record's hash, simulating tampering
    pub fn tamper(&self, id: RecordId, hash: MetadataHash) {
        if let Some(r) = self.state.lock().records.get_mut(&id) {
            r.metadata_hash = hash;
        }
    }

    fn store(state: &mut LedgerState, call: &LedgerCall) -> Result<RecordId, ClientError> {
        let (target, rest) = match (call.operation, call.arguments.as_slice()) {
            (LedgerOperation::UpdateRecord, [CallArg::Uint(t), rest @ ..]) => (Some(RecordId(*t)), rest),
            (LedgerOperation::AddRecord, rest) => (None, rest),
            _ => return Err(ClientError::permanent("malformed arguments")),
        };
        let [CallArg::Text(name), CallArg::Text(classification), CallArg::Text(location), CallArg::Hash(hash)] =
            rest
        else {
            return Err(ClientError::permanent("malformed arguments"));
        };

        let version = match target {
            Some(t) => {
                let prior = state
                    .records
                    .get(&t)
                    .ok_or_else(|| ClientError::permanent(format!("record {t} not found")))?;
                prior.version + 1
            }
            None => 1,
        };

        state.next_id += 1;
        let id = RecordId(state.next_id);
        let offset = i64::try_from(state.next_id).unwrap_or(i64::MAX);
        state.records.insert(
            id,
            FetchedRecord {
                id,
                name: name.clone(),
                classification: classification.clone(),
                location: location.clone(),
                metadata: MetadataValue::empty_object(),
                researcher: String::new(),
                institution: String::new(),
                status: if target.is_some() {
                    RecordStatus::Updated
                } else {
                    RecordStatus::Active
                },
                version,
                previous_version: target,
                metadata_hash: *hash,
                recorded_at: test_epoch() + ChronoDuration::seconds(offset),
            },
        );
        Ok(id)
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn call(&self, call: &LedgerCall) -> Result<RecordId, ClientError> {
        let mut state = self.state.lock();
        state.calls.push(call.clone());
        if let Some(err) = state.fail_always.clone() {
            return Err(err);
        }
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        Self::store(&mut state, call)
    }
}

#[async_trait]
impl RecordFetcher for InMemoryLedger {
    async fn get(&self, id: RecordId) -> Result<FetchedRecord, ClientError> {
        self.record(id)
            .ok_or_else(|| ClientError::permanent(format!("record {id} not found")))
    }
}

// ---------------------------------------------------------------------------
// Record store
// ---------------------------------------------------------------------------

/// Record fetcher over a fixed set of records, with fault injection
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<RecordId, FetchedRecord>>,
    failures: Mutex<HashMap<RecordId, VecDeque<ClientError>>>,
    fetches: AtomicUsize,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = FetchedRecord>) -> Self {
        let store = Self::new();
        for r in records {
            store.insert(r);
        }
        store
    }

    pub fn insert(&self, record: FetchedRecord) {
        self.records.lock().insert(record.id, record);
    }

    /// Fail the next fetches of `id` with `errors`, in order
    pub fn fail_fetch(&self, id: RecordId, errors: impl IntoIterator<Item = ClientError>) {
        self.failures.lock().entry(id).or_default().extend(errors);
    }

    /// Total fetch calls, including failed ones
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordFetcher for InMemoryRecordStore {
    async fn get(&self, id: RecordId) -> Result<FetchedRecord, ClientError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().get_mut(&id).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        self.records
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| ClientError::permanent(format!("record {id} not found")))
    }
}
