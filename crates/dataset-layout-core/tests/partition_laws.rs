//! Property tests for partitioners, expressions and the path codec.
#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dataset_layout_core::{
    expression::{ExpressionEngine, PartitionExpression},
    partition::{FieldPartitioner, PartitionError, PartitionStrategy},
    path_codec::{PartitionPathCodec, encode},
    schema::FieldType,
    storage::LocalStorage,
    value::{FieldValue, Record},
};
use proptest::prelude::*;
use tempfile::TempDir;

fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}"
}

fn ascending_ints() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::btree_set(any::<i64>(), 1..6).prop_map(|s| s.into_iter().collect())
}

fn ascending_strings() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(r#"[a-z"\\ ]{1,6}"#, 1..5)
        .prop_map(|s: BTreeSet<String>| s.into_iter().collect())
}

fn field_type() -> impl Strategy<Value = FieldType> {
    prop_oneof![
        Just(FieldType::Bool),
        Just(FieldType::Int),
        Just(FieldType::Long),
        Just(FieldType::Double),
        Just(FieldType::String),
        Just(FieldType::Timestamp),
    ]
}

fn field_partitioner() -> impl Strategy<Value = FieldPartitioner> {
    prop_oneof![
        (ident(), 0u32..1000).prop_map(|(name, card)| FieldPartitioner::identity(name, card)),
        (ident(), field_type(), 0u32..1000)
            .prop_map(|(name, t, card)| FieldPartitioner::identity_typed(name, t, card)),
        (ident(), ident(), 1u32..10_000)
            .prop_map(|(src, name, n)| FieldPartitioner::hash_from(src, name, n).unwrap()),
        (ident(), ascending_ints())
            .prop_map(|(name, b)| FieldPartitioner::int_range(name, b).unwrap()),
        (ident(), ascending_strings())
            .prop_map(|(name, b)| FieldPartitioner::range(name, b).unwrap()),
        (ident(), ident()).prop_map(|(s, n)| FieldPartitioner::year(s, n)),
        (ident(), ident()).prop_map(|(s, n)| FieldPartitioner::month(s, n)),
        (ident(), ident()).prop_map(|(s, n)| FieldPartitioner::day(s, n)),
        (ident(), ident()).prop_map(|(s, n)| FieldPartitioner::hour(s, n)),
        (ident(), ident()).prop_map(|(s, n)| FieldPartitioner::minute(s, n)),
    ]
}

fn partition_strategy() -> impl Strategy<Value = PartitionStrategy> {
    prop::collection::vec(field_partitioner(), 1..5)
        .prop_map(|fps| PartitionStrategy::new(fps).unwrap())
}

/// Strategies over a fixed entity shape, paired with a matching entity.
fn layout_and_entity() -> impl Strategy<Value = (PartitionStrategy, Record)> {
    let layout = (
        1u32..64,
        prop::sample::subsequence((0..13).collect::<Vec<usize>>(), 1..=13),
    )
        .prop_map(|(buckets, picks)| {
            let all = [
                FieldPartitioner::hash_from("user", "user_part", buckets).unwrap(),
                FieldPartitioner::identity("word", 0),
                FieldPartitioner::int_range("n", vec![-100, 0, 100, i64::MAX]).unwrap(),
                FieldPartitioner::range(
                    "word",
                    vec!["g".into(), "n".into(), "zzzzzzzzz".into()],
                )
                .unwrap(),
                FieldPartitioner::year("ts", "year"),
                FieldPartitioner::month("ts", "month"),
                FieldPartitioner::day("ts", "day"),
                FieldPartitioner::hour("ts", "hour"),
                FieldPartitioner::minute("ts", "minute"),
                FieldPartitioner::identity_typed("n", FieldType::Long, 0),
                FieldPartitioner::identity_typed("ts", FieldType::Timestamp, 0),
                FieldPartitioner::identity_typed("flag", FieldType::Bool, 2),
                FieldPartitioner::identity_typed("score", FieldType::Double, 0),
            ];
            PartitionStrategy::new(picks.into_iter().map(|i| all[i].clone()).collect()).unwrap()
        });
    let entity = (
        "[a-z]{1,10}",
        "[a-z]{1,8}",
        any::<i64>(),
        0i64..4_102_444_800_000,
        any::<bool>(),
        -1.0e6f64..1.0e6,
    )
        .prop_map(|(user, word, n, millis, flag, score)| {
            let ts: DateTime<Utc> = DateTime::from_timestamp_millis(millis).unwrap();
            Record::new()
                .with("user", user)
                .with("word", word)
                .with("n", n)
                .with("ts", ts)
                .with("flag", flag)
                .with("score", score)
        });
    (layout, entity)
}

proptest! {
    #[test]
    fn expression_round_trip(strategy in partition_strategy()) {
        let text = strategy.to_expression();
        let parsed = PartitionExpression::parse(&text).unwrap().evaluate().unwrap();
        prop_assert_eq!(&parsed, &strategy);
        prop_assert_eq!(parsed.to_expression(), text.clone());

        let mut engine = ExpressionEngine::with_capacity(2);
        prop_assert_eq!(engine.evaluate(&text).unwrap(), strategy.clone());
        prop_assert_eq!(engine.evaluate(&text).unwrap(), strategy);
    }

    #[test]
    fn path_codec_inverts_encode((strategy, entity) in layout_and_entity()) {
        let tmp = TempDir::new().unwrap();
        let codec = PartitionPathCodec::new(Arc::new(LocalStorage::new()));
        let key = strategy.key_for(&entity).unwrap();
        let path = tmp.path().join(encode(&strategy, &key).unwrap());
        prop_assert_eq!(codec.decode(&strategy, tmp.path(), &path).unwrap(), key);
    }

    #[test]
    fn hash_is_deterministic_and_bounded(value in any::<i64>(), text in ".*", buckets in 1u32..100_000) {
        let fp = FieldPartitioner::hash("f", buckets).unwrap();
        for v in [FieldValue::Long(value), FieldValue::String(text)] {
            let a = fp.apply(&v).unwrap();
            prop_assert_eq!(&a, &fp.apply(&v).unwrap());
            match a {
                FieldValue::Int(b) => prop_assert!(b >= 0 && (b as u32) < buckets),
                other => prop_assert!(false, "unexpected bucket {:?}", other),
            }
        }
    }

    #[test]
    fn range_bounds_are_inclusive(bounds in ascending_ints()) {
        let fp = FieldPartitioner::int_range("r", bounds.clone()).unwrap();
        for (i, b) in bounds.iter().enumerate() {
            prop_assert_eq!(fp.apply(&FieldValue::Long(*b)).unwrap(), FieldValue::Int(i as i32));
        }
        let last = bounds[bounds.len() - 1];
        if let Some(above) = last.checked_add(1) {
            let err = fp.apply(&FieldValue::Long(above)).unwrap_err();
            let is_out_of_bounds = matches!(err, PartitionError::OutOfBounds { .. });
            prop_assert!(is_out_of_bounds);
        }
        // The failure does not poison the partitioner.
        prop_assert_eq!(fp.apply(&FieldValue::Long(bounds[0])).unwrap(), FieldValue::Int(0));
    }
}
