use preg_pipeline::{
    aggregate, CancellationToken, ClientError, HistoryResolver, PipelineConfig, PipelineError,
    RecordVerifier, RetryPolicy, SubmissionCoordinator, SubmitRequest,
};
use preg_record::{MetadataHash, ParasiteRecord, RecordId};
use preg_test_utils::{
    fetched_record, init_test_tracing, lineage, test_clock, InMemoryBlobStore, InMemoryLedger,
    InMemoryRecordStore,
};
use std::sync::Arc;
use std::time::Duration;

fn resolver(store: Arc<InMemoryRecordStore>, retry: RetryPolicy) -> HistoryResolver {
    init_test_tracing();
    HistoryResolver::new(store, retry)
}

#[tokio::test]
async fn test_depth_five_lineage_newest_first() {
    let store = Arc::new(InMemoryRecordStore::with_records(lineage(5)));
    let chain = resolver(store, RetryPolicy::default())
        .resolve(RecordId(5))
        .await
        .unwrap();

    assert_eq!(chain.len(), 5);
    assert_eq!(
        chain.ids(),
        vec![RecordId(5), RecordId(4), RecordId(3), RecordId(2), RecordId(1)]
    );
    assert_eq!(chain.head().unwrap().version, 5);
    assert!(chain.root().unwrap().previous_version.is_none());
    assert!(chain.is_linked());
}

#[tokio::test]
async fn test_resolve_from_middle_stops_at_root() {
    let store = Arc::new(InMemoryRecordStore::with_records(lineage(5)));
    let chain = resolver(store, RetryPolicy::default())
        .resolve(RecordId(3))
        .await
        .unwrap();
    assert_eq!(chain.ids(), vec![RecordId(3), RecordId(2), RecordId(1)]);
}

#[tokio::test]
async fn test_cyclic_lineage_is_corrupt() {
    // 3 -> 2 -> 1 -> 3
    let store = Arc::new(InMemoryRecordStore::with_records([
        fetched_record(3, 3, Some(2)),
        fetched_record(2, 2, Some(1)),
        fetched_record(1, 1, Some(3)),
    ]));
    let err = resolver(store.clone(), RetryPolicy::default())
        .resolve(RecordId(3))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::HistoryCorrupt(RecordId(3))));
    assert_eq!(store.fetch_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_transient_fetch_is_retried() {
    let store = Arc::new(InMemoryRecordStore::with_records(lineage(3)));
    store.fail_fetch(RecordId(2), [ClientError::transient("timeout")]);

    let chain = resolver(store.clone(), RetryPolicy::default())
        .resolve(RecordId(3))
        .await
        .unwrap();

    assert_eq!(chain.len(), 3);
    assert_eq!(store.fetch_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_fetch_reports_partial_chain() {
    let store = Arc::new(InMemoryRecordStore::with_records(lineage(4)));
    store.fail_fetch(RecordId(2), std::iter::repeat(ClientError::transient("timeout")).take(3));

    let err = resolver(store.clone(), RetryPolicy::new(3, Duration::from_secs(1)))
        .resolve(RecordId(4))
        .await
        .unwrap_err();

    match err {
        PipelineError::HistoryIncomplete { chain, failed, cause } => {
            assert_eq!(chain.ids(), vec![RecordId(4), RecordId(3)]);
            assert_eq!(failed, RecordId(2));
            assert!(cause.is_transient());
        }
        other => panic!("expected HistoryIncomplete, got {other:?}"),
    }
    // 2 successful fetches + 3 attempts on record 2
    assert_eq!(store.fetch_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_resolve_cancelled_while_waiting() {
    let store = Arc::new(InMemoryRecordStore::with_records(lineage(2)));
    store.fail_fetch(RecordId(1), std::iter::repeat(ClientError::transient("timeout")).take(10));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let err = resolver(store, RetryPolicy::new(10, Duration::from_secs(2)))
        .resolve_with_cancel(RecordId(2), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_submitted_updates_resolve_and_verify() {
    init_test_tracing();
    let ledger = Arc::new(InMemoryLedger::new());
    let coord = SubmissionCoordinator::new(
        PipelineConfig::new(),
        ledger.clone(),
        Arc::new(InMemoryBlobStore::new()),
    )
    .unwrap()
    .with_clock(test_clock());

    let v1 = ParasiteRecord::new("Giardia lamblia", "Diplomonad", "Andes");
    let first = coord.submit(SubmitRequest::new(v1.clone())).await.unwrap();

    let v2 = v1
        .next_version(first.record_id)
        .with_metadata_entry("cyst_count", 120_i64);
    let second = coord
        .submit(SubmitRequest::new(v2.clone()).updating(first.record_id))
        .await
        .unwrap();

    let v3 = v2.next_version(second.record_id);
    let third = coord
        .submit(SubmitRequest::new(v3).updating(second.record_id))
        .await
        .unwrap();

    let chain = HistoryResolver::new(ledger.clone(), RetryPolicy::default())
        .resolve(third.record_id)
        .await
        .unwrap();
    assert_eq!(
        chain.ids(),
        vec![third.record_id, second.record_id, first.record_id]
    );
    assert!(chain.is_linked());

    let verifier = RecordVerifier::new(ledger.clone(), RetryPolicy::default()).with_clock(test_clock());
    let ok = verifier.verify(&second).await.unwrap();
    assert!(ok.verified);
    assert_eq!(ok.stored_hash, second.hash);

    ledger.tamper(second.record_id, MetadataHash::compute(b"forged"));
    let bad = verifier.verify(&second).await.unwrap();
    assert!(!bad.verified);
    assert_eq!(bad.expected_hash, second.hash);
}

#[tokio::test]
async fn test_verify_missing_record_is_incomplete() {
    let verifier = RecordVerifier::new(Arc::new(InMemoryRecordStore::new()), RetryPolicy::no_retry());
    let err = verifier
        .verify_hash(RecordId(99), MetadataHash::compute(b"x"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::HistoryIncomplete { failed: RecordId(99), ref chain, .. } if chain.is_empty()
    ));
}

#[tokio::test]
async fn test_distribution_over_resolved_chain() {
    let store = Arc::new(InMemoryRecordStore::with_records(lineage(4)));
    let chain = resolver(store, RetryPolicy::default())
        .resolve(RecordId(4))
        .await
        .unwrap();

    let summary = aggregate(&chain);
    assert_eq!(summary.len(), 1);
    let z = &summary["Z"];
    assert_eq!(z.count, 4);
    assert_eq!(z.classifications.len(), 1);
    assert_eq!(z.most_recent, chain.head().unwrap().recorded_at);
}
