use chrono::{TimeZone, Utc};
use preg_record::{encode, CanonicalEnvelope, MetadataMap, MetadataValue, ParasiteRecord};
use proptest::prelude::*;

fn leaf() -> impl Strategy<Value = MetadataValue> {
    prop_oneof![
        Just(MetadataValue::Null),
        any::<bool>().prop_map(MetadataValue::Bool),
        any::<i64>().prop_map(MetadataValue::Integer),
        ((1u64 << 63)..=u64::MAX).prop_map(MetadataValue::UInteger),
        (-1.0e9..1.0e9f64).prop_map(MetadataValue::Float),
        "[a-z ]{0,12}".prop_map(MetadataValue::String),
    ]
}

fn value() -> impl Strategy<Value = MetadataValue> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(MetadataValue::Array),
            proptest::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(MetadataValue::Object),
        ]
    })
}

fn entries() -> impl Strategy<Value = Vec<(String, MetadataValue)>> {
    proptest::collection::btree_map("[a-z]{1,8}", value(), 1..6)
        .prop_map(|m| m.into_iter().collect())
}

fn envelope_for(entries: &[(String, MetadataValue)]) -> CanonicalEnvelope {
    let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut record = ParasiteRecord::new("X", "Y", "Z");
    for (k, v) in entries {
        record = record.with_metadata_entry(k.clone(), v.clone());
    }
    CanonicalEnvelope::build(&record, ts, Vec::new())
}

proptest! {
    #[test]
    fn prop_insertion_order_does_not_change_hash(entries in entries(), seed in any::<u64>()) {
        let forward = envelope_for(&entries);

        // Deterministic shuffle driven by the seed
        let mut shuffled = entries.clone();
        let len = shuffled.len();
        let mut s = seed;
        for i in (1..len).rev() {
            s = s.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let j = (s % (i as u64 + 1)) as usize;
            shuffled.swap(i, j);
        }
        let reordered = envelope_for(&shuffled);

        let a = encode(&forward).unwrap();
        let b = encode(&reordered).unwrap();
        prop_assert_eq!(a.bytes, b.bytes);
        prop_assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn prop_json_insertion_order_does_not_change_hash(a in any::<i64>(), b in "[a-z]{0,8}") {
        let first: MetadataValue = serde_json::from_str(
            &format!(r#"{{"alpha":{a},"beta":{}}}"#, serde_json::to_string(&b).unwrap())
        ).unwrap();
        let second: MetadataValue = serde_json::from_str(
            &format!(r#"{{"beta":{},"alpha":{a}}}"#, serde_json::to_string(&b).unwrap())
        ).unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let r1 = ParasiteRecord::new("X", "Y", "Z").with_metadata(first);
        let r2 = ParasiteRecord::new("X", "Y", "Z").with_metadata(second);
        prop_assert_eq!(
            encode(&CanonicalEnvelope::build(&r1, ts, vec![])).unwrap().hash,
            encode(&CanonicalEnvelope::build(&r2, ts, vec![])).unwrap().hash
        );
    }

    #[test]
    fn prop_nested_change_changes_hash(entries in entries(), replacement in any::<i64>()) {
        let original = envelope_for(&entries);

        // Wrap the first value one level deeper and alter it
        let mut changed = entries.clone();
        let mut inner = MetadataMap::new();
        inner.insert("v".into(), changed[0].1.clone());
        inner.insert("w".into(), MetadataValue::Integer(replacement));
        changed[0].1 = MetadataValue::Object(inner);
        let altered = envelope_for(&changed);

        prop_assert_ne!(encode(&original).unwrap().hash, encode(&altered).unwrap().hash);
    }

    #[test]
    fn prop_top_level_field_change_changes_hash(name in "[A-Za-z]{1,12}", suffix in "[a-z]{1,4}") {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let a = ParasiteRecord::new(name.clone(), "Y", "Z");
        let b = ParasiteRecord::new(format!("{name}{suffix}"), "Y", "Z");
        prop_assert_ne!(
            encode(&CanonicalEnvelope::build(&a, ts, vec![])).unwrap().hash,
            encode(&CanonicalEnvelope::build(&b, ts, vec![])).unwrap().hash
        );
    }
}

#[test]
fn timestamp_change_changes_hash() {
    let record = ParasiteRecord::new("X", "Y", "Z");
    let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let t2 = t1 + chrono::Duration::microseconds(1);
    assert_ne!(
        encode(&CanonicalEnvelope::build(&record, t1, vec![])).unwrap().hash,
        encode(&CanonicalEnvelope::build(&record, t2, vec![])).unwrap().hash
    );
}

#[test]
fn adjacent_large_unsigned_ids_hash_differently() {
    let max = envelope_for(&[("specimen_id".into(), u64::MAX.into())]);
    let below = envelope_for(&[("specimen_id".into(), (u64::MAX - 1).into())]);

    let max_bytes = encode(&max).unwrap();
    let below_bytes = encode(&below).unwrap();
    assert!(String::from_utf8(max_bytes.bytes)
        .unwrap()
        .contains(r#""metadata":{"specimen_id":18446744073709551615}"#));
    assert_ne!(max_bytes.hash, below_bytes.hash);
}
