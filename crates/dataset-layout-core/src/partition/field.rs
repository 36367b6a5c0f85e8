//! Field partitioners: pure value-to-bucket functions.

use chrono::{DateTime, Datelike, Timelike, Utc};
use snafu::prelude::*;

use crate::partition::{
    InvalidBucketSnafu, InvalidPartitionerSnafu, OutOfBoundsSnafu, PartitionResult,
    UnsupportedValueSnafu,
};
use crate::schema::FieldType;
use crate::value::FieldValue;

/// Cardinality sentinel for partitioners with no fixed bucket count.
pub const UNBOUNDED: u32 = 0;

/// Largest bucket count a hash partitioner accepts; bucket ids are `Int`s.
pub const MAX_HASH_BUCKETS: u32 = i32::MAX as u32;

/// A named, deterministic mapping from one source field to a bucket value.
///
/// `name` is the output (directory) field; `source` is the entity field read
/// by [`FieldPartitioner::apply`]. Variants without an explicit source read
/// the field called `name`.
///
/// Equality and hashing are structural over the variant and all of its
/// fields, so two strategies built from the same expression compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPartitioner {
    /// Pass-through; the bucket is the source value itself.
    Identity {
        /// Output field name (also the source field).
        name: String,
        /// Type of the source values, and of the values [`FieldPartitioner::parse`] yields.
        value_type: FieldType,
        /// Advisory bucket count, `0` for unbounded.
        cardinality: u32,
    },
    /// `stable_hash(value) mod buckets`.
    Hash {
        /// Source field name.
        source: String,
        /// Output field name.
        name: String,
        /// Number of buckets, always positive.
        buckets: u32,
    },
    /// Index of the first integer upper bound `>=` the value.
    IntRange {
        /// Output field name (also the source field).
        name: String,
        /// Strictly ascending inclusive upper bounds.
        upper_bounds: Vec<i64>,
    },
    /// First string upper bound `>=` the value; the bucket is that bound.
    Range {
        /// Output field name (also the source field).
        name: String,
        /// Strictly ascending inclusive upper bounds.
        upper_bounds: Vec<String>,
    },
    /// Calendar year of a timestamp (UTC).
    Year {
        /// Source timestamp field.
        source: String,
        /// Output field name.
        name: String,
    },
    /// Calendar month (1-12) of a timestamp (UTC).
    Month {
        /// Source timestamp field.
        source: String,
        /// Output field name.
        name: String,
    },
    /// Day of month (1-31) of a timestamp (UTC).
    Day {
        /// Source timestamp field.
        source: String,
        /// Output field name.
        name: String,
    },
    /// Hour of day (0-23) of a timestamp (UTC).
    Hour {
        /// Source timestamp field.
        source: String,
        /// Output field name.
        name: String,
    },
    /// Minute of hour (0-59) of a timestamp (UTC).
    Minute {
        /// Source timestamp field.
        source: String,
        /// Output field name.
        name: String,
    },
}

impl FieldPartitioner {
    /// Identity partitioner over the string field `name`.
    pub fn identity(name: impl Into<String>, cardinality: u32) -> Self {
        Self::identity_typed(name, FieldType::String, cardinality)
    }

    /// Identity partitioner over `name` holding values of `value_type`.
    pub fn identity_typed(
        name: impl Into<String>,
        value_type: FieldType,
        cardinality: u32,
    ) -> Self {
        FieldPartitioner::Identity {
            name: name.into(),
            value_type,
            cardinality,
        }
    }

    /// Hash partitioner reading and writing `name`.
    pub fn hash(name: impl Into<String>, buckets: u32) -> PartitionResult<Self> {
        let name = name.into();
        Self::hash_from(name.clone(), name, buckets)
    }

    /// Hash partitioner reading `source` and writing `name`.
    pub fn hash_from(
        source: impl Into<String>,
        name: impl Into<String>,
        buckets: u32,
    ) -> PartitionResult<Self> {
        let name = name.into();
        ensure!(
            buckets > 0,
            InvalidPartitionerSnafu {
                kind: "hash",
                name,
                reason: "bucket count must be positive",
            }
        );
        ensure!(
            buckets <= MAX_HASH_BUCKETS,
            InvalidPartitionerSnafu {
                kind: "hash",
                name,
                reason: format!("bucket count must not exceed {MAX_HASH_BUCKETS}"),
            }
        );
        Ok(FieldPartitioner::Hash {
            source: source.into(),
            name,
            buckets,
        })
    }

    /// Integer range partitioner with ascending inclusive upper bounds.
    pub fn int_range(name: impl Into<String>, upper_bounds: Vec<i64>) -> PartitionResult<Self> {
        let name = name.into();
        check_bounds("range", &name, &upper_bounds)?;
        Ok(FieldPartitioner::IntRange { name, upper_bounds })
    }

    /// String range partitioner with ascending inclusive upper bounds.
    pub fn range(name: impl Into<String>, upper_bounds: Vec<String>) -> PartitionResult<Self> {
        let name = name.into();
        check_bounds("range", &name, &upper_bounds)?;
        Ok(FieldPartitioner::Range { name, upper_bounds })
    }

    /// Year-of-timestamp partitioner.
    pub fn year(source: impl Into<String>, name: impl Into<String>) -> Self {
        FieldPartitioner::Year {
            source: source.into(),
            name: name.into(),
        }
    }

    /// Month-of-timestamp partitioner.
    pub fn month(source: impl Into<String>, name: impl Into<String>) -> Self {
        FieldPartitioner::Month {
            source: source.into(),
            name: name.into(),
        }
    }

    /// Day-of-month partitioner.
    pub fn day(source: impl Into<String>, name: impl Into<String>) -> Self {
        FieldPartitioner::Day {
            source: source.into(),
            name: name.into(),
        }
    }

    /// Hour-of-day partitioner.
    pub fn hour(source: impl Into<String>, name: impl Into<String>) -> Self {
        FieldPartitioner::Hour {
            source: source.into(),
            name: name.into(),
        }
    }

    /// Minute-of-hour partitioner.
    pub fn minute(source: impl Into<String>, name: impl Into<String>) -> Self {
        FieldPartitioner::Minute {
            source: source.into(),
            name: name.into(),
        }
    }

    /// Function name of this partitioner in the expression language.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldPartitioner::Identity { .. } => "identity",
            FieldPartitioner::Hash { .. } => "hash",
            FieldPartitioner::IntRange { .. } | FieldPartitioner::Range { .. } => "range",
            FieldPartitioner::Year { .. } => "year",
            FieldPartitioner::Month { .. } => "month",
            FieldPartitioner::Day { .. } => "day",
            FieldPartitioner::Hour { .. } => "hour",
            FieldPartitioner::Minute { .. } => "minute",
        }
    }

    /// Output field name; used as the directory segment prefix.
    pub fn name(&self) -> &str {
        match self {
            FieldPartitioner::Identity { name, .. }
            | FieldPartitioner::Hash { name, .. }
            | FieldPartitioner::IntRange { name, .. }
            | FieldPartitioner::Range { name, .. }
            | FieldPartitioner::Year { name, .. }
            | FieldPartitioner::Month { name, .. }
            | FieldPartitioner::Day { name, .. }
            | FieldPartitioner::Hour { name, .. }
            | FieldPartitioner::Minute { name, .. } => name,
        }
    }

    /// Entity field read by [`FieldPartitioner::apply`].
    pub fn source_name(&self) -> &str {
        match self {
            FieldPartitioner::Identity { name, .. }
            | FieldPartitioner::IntRange { name, .. }
            | FieldPartitioner::Range { name, .. } => name,
            FieldPartitioner::Hash { source, .. }
            | FieldPartitioner::Year { source, .. }
            | FieldPartitioner::Month { source, .. }
            | FieldPartitioner::Day { source, .. }
            | FieldPartitioner::Hour { source, .. }
            | FieldPartitioner::Minute { source, .. } => source,
        }
    }

    /// Number of buckets this partitioner can produce, or [`UNBOUNDED`].
    pub fn cardinality(&self) -> u32 {
        match self {
            FieldPartitioner::Identity { cardinality, .. } => *cardinality,
            FieldPartitioner::Hash { buckets, .. } => *buckets,
            FieldPartitioner::IntRange { upper_bounds, .. } => bound_count(upper_bounds.len()),
            FieldPartitioner::Range { upper_bounds, .. } => bound_count(upper_bounds.len()),
            FieldPartitioner::Year { .. }
            | FieldPartitioner::Month { .. }
            | FieldPartitioner::Day { .. }
            | FieldPartitioner::Hour { .. }
            | FieldPartitioner::Minute { .. } => UNBOUNDED,
        }
    }

    /// Map a source value to its bucket.
    ///
    /// Range partitioners fail with [`crate::partition::PartitionError::OutOfBounds`]
    /// for values above the last bound instead of clamping. A failure only
    /// affects this call; the partitioner remains usable.
    pub fn apply(&self, value: &FieldValue) -> PartitionResult<FieldValue> {
        match self {
            FieldPartitioner::Identity {
                name, value_type, ..
            } => {
                let unsupported = || {
                    UnsupportedValueSnafu {
                        kind: "identity",
                        name: name.clone(),
                        value_type: value.type_name(),
                        value: value.to_string(),
                    }
                    .build()
                };
                // Null and NaN have no directory form that parses back to an equal value.
                match value_type.coerce(value) {
                    Some(FieldValue::Null) | None => Err(unsupported()),
                    Some(FieldValue::Double(d)) if d.is_nan() => Err(unsupported()),
                    Some(v) => Ok(v),
                }
            }
            FieldPartitioner::Hash { buckets, .. } => {
                // buckets <= MAX_HASH_BUCKETS, so the remainder fits in an i32.
                let bucket = value.stable_hash() % u64::from(*buckets);
                Ok(FieldValue::Int(bucket as i32))
            }
            FieldPartitioner::IntRange { name, upper_bounds } => {
                let v = value.as_i64().context(UnsupportedValueSnafu {
                    kind: "range",
                    name: name.clone(),
                    value_type: value.type_name(),
                    value: value.to_string(),
                })?;
                let index = upper_bounds
                    .iter()
                    .position(|bound| v <= *bound)
                    .context(OutOfBoundsSnafu {
                        name: name.clone(),
                        value: v.to_string(),
                    })?;
                Ok(FieldValue::Int(index as i32))
            }
            FieldPartitioner::Range { name, upper_bounds } => {
                let v = value.as_str().context(UnsupportedValueSnafu {
                    kind: "range",
                    name: name.clone(),
                    value_type: value.type_name(),
                    value: value.to_string(),
                })?;
                let bound = upper_bounds
                    .iter()
                    .find(|bound| v <= bound.as_str())
                    .context(OutOfBoundsSnafu {
                        name: name.clone(),
                        value: v.to_string(),
                    })?;
                Ok(FieldValue::String(bound.clone()))
            }
            FieldPartitioner::Year { .. } => self.calendar(value, |ts| ts.year()),
            FieldPartitioner::Month { .. } => self.calendar(value, |ts| ts.month() as i32),
            FieldPartitioner::Day { .. } => self.calendar(value, |ts| ts.day() as i32),
            FieldPartitioner::Hour { .. } => self.calendar(value, |ts| ts.hour() as i32),
            FieldPartitioner::Minute { .. } => self.calendar(value, |ts| ts.minute() as i32),
        }
    }

    /// Inverse used when decoding a directory segment value.
    ///
    /// Hash, integer range and calendar partitioners yield an `Int` bucket id;
    /// string range partitioners yield the raw string and identity partitioners
    /// a value of their declared type. For hash and range partitioners this is
    /// the bucket identifier, not the source value.
    pub fn parse(&self, input: &str) -> PartitionResult<FieldValue> {
        match self {
            FieldPartitioner::Range { .. } => Ok(FieldValue::String(input.to_string())),
            FieldPartitioner::Identity { value_type, .. } => {
                parse_typed(*value_type, input).map_err(|reason| {
                    InvalidBucketSnafu {
                        name: self.name(),
                        input,
                        reason,
                    }
                    .build()
                })
            }
            FieldPartitioner::Hash { .. }
            | FieldPartitioner::IntRange { .. }
            | FieldPartitioner::Year { .. }
            | FieldPartitioner::Month { .. }
            | FieldPartitioner::Day { .. }
            | FieldPartitioner::Hour { .. }
            | FieldPartitioner::Minute { .. } => input
                .parse::<i32>()
                .map(FieldValue::Int)
                .map_err(|e| {
                    InvalidBucketSnafu {
                        name: self.name(),
                        input,
                        reason: e.to_string(),
                    }
                    .build()
                }),
        }
    }

    fn calendar(
        &self,
        value: &FieldValue,
        component: impl Fn(&DateTime<Utc>) -> i32,
    ) -> PartitionResult<FieldValue> {
        let ts = match value {
            FieldValue::Timestamp(ts) => Some(*ts),
            FieldValue::Long(millis) => DateTime::from_timestamp_millis(*millis),
            _ => None,
        };
        let ts = ts.context(UnsupportedValueSnafu {
            kind: self.kind(),
            name: self.name(),
            value_type: value.type_name(),
            value: value.to_string(),
        })?;
        Ok(FieldValue::Int(component(&ts)))
    }
}

fn parse_typed(value_type: FieldType, input: &str) -> Result<FieldValue, String> {
    let value = match value_type {
        FieldType::String => FieldValue::String(input.to_string()),
        FieldType::Bool => FieldValue::Bool(input.parse().map_err(|e| format!("{e}"))?),
        FieldType::Int => FieldValue::Int(input.parse().map_err(|e| format!("{e}"))?),
        FieldType::Long => FieldValue::Long(input.parse().map_err(|e| format!("{e}"))?),
        FieldType::Double => FieldValue::Double(input.parse().map_err(|e| format!("{e}"))?),
        FieldType::Timestamp => FieldValue::Timestamp(
            DateTime::parse_from_rfc3339(input)
                .map_err(|e| format!("{e}"))?
                .with_timezone(&Utc),
        ),
    };
    Ok(value)
}

fn bound_count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn check_bounds<T: PartialOrd>(kind: &'static str, name: &str, bounds: &[T]) -> PartitionResult<()> {
    ensure!(
        !bounds.is_empty(),
        InvalidPartitionerSnafu {
            kind,
            name,
            reason: "at least one upper bound is required",
        }
    );
    ensure!(
        bounds.windows(2).all(|w| w[0] < w[1]),
        InvalidPartitionerSnafu {
            kind,
            name,
            reason: "upper bounds must be strictly ascending",
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::PartitionError;
    use chrono::TimeZone;

    #[test]
    fn hash_is_deterministic_and_in_range() {
        let fp = FieldPartitioner::hash_from("username", "username_part", 7).unwrap();
        for i in 0..500 {
            let value = FieldValue::String(format!("user-{i}"));
            let first = fp.apply(&value).unwrap();
            assert_eq!(first, fp.apply(&value).unwrap());
            match first {
                FieldValue::Int(b) => assert!((0..7).contains(&b), "bucket {b} out of range"),
                other => panic!("unexpected bucket {other:?}"),
            }
        }
    }

    #[test]
    fn hash_rejects_zero_buckets() {
        let err = FieldPartitioner::hash("email", 0).unwrap_err();
        assert!(matches!(err, PartitionError::InvalidPartitioner { .. }));
    }

    #[test]
    fn hash_parse_recovers_bucket_not_value() {
        let fp = FieldPartitioner::hash("email", 3).unwrap();
        let bucket = fp.apply(&FieldValue::from("a@b.c")).unwrap();
        let parsed = fp.parse(&bucket.to_string()).unwrap();
        assert_eq!(parsed, bucket);
        assert_ne!(parsed, FieldValue::from("a@b.c"));
    }

    #[test]
    fn hash_rejects_more_buckets_than_int_ids() {
        assert!(FieldPartitioner::hash("email", MAX_HASH_BUCKETS).is_ok());
        let err = FieldPartitioner::hash("email", MAX_HASH_BUCKETS + 1).unwrap_err();
        assert!(matches!(err, PartitionError::InvalidPartitioner { kind: "hash", .. }));
    }

    #[test]
    fn identity_parse_yields_declared_type() {
        let ts = Utc.with_ymd_and_hms(2013, 2, 28, 23, 59, 1).unwrap()
            + chrono::Duration::milliseconds(250);
        let cases = [
            (FieldType::Long, FieldValue::Long(5)),
            (FieldType::Int, FieldValue::Int(-7)),
            (FieldType::Bool, FieldValue::Bool(true)),
            (FieldType::Double, FieldValue::Double(0.1)),
            (FieldType::String, FieldValue::from("5")),
            (FieldType::Timestamp, FieldValue::Timestamp(ts)),
        ];
        for (value_type, value) in cases {
            let fp = FieldPartitioner::identity_typed("id", value_type, 0);
            let bucket = fp.apply(&value).unwrap();
            assert_eq!(bucket, value);
            assert_eq!(fp.parse(&bucket.to_string()).unwrap(), value, "{value_type}");
        }
    }

    #[test]
    fn identity_widens_and_rejects_mismatched_values() {
        let fp = FieldPartitioner::identity_typed("id", FieldType::Long, 0);
        assert_eq!(fp.apply(&FieldValue::Int(5)).unwrap(), FieldValue::Long(5));
        for value in [FieldValue::from("5"), FieldValue::Null] {
            assert!(matches!(
                fp.apply(&value).unwrap_err(),
                PartitionError::UnsupportedValue { kind: "identity", .. }
            ));
        }
        assert!(FieldPartitioner::identity("id", 0).apply(&FieldValue::Long(5)).is_err());
        assert!(
            FieldPartitioner::identity_typed("x", FieldType::Double, 0)
                .apply(&FieldValue::Double(f64::NAN))
                .is_err()
        );
        assert!(matches!(
            fp.parse("five").unwrap_err(),
            PartitionError::InvalidBucket { .. }
        ));
    }

    #[test]
    fn int_range_boundaries() {
        let fp = FieldPartitioner::int_range("age", vec![10, 20, 30]).unwrap();
        assert_eq!(fp.apply(&FieldValue::Int(-5)).unwrap(), FieldValue::Int(0));
        assert_eq!(fp.apply(&FieldValue::Int(10)).unwrap(), FieldValue::Int(0));
        assert_eq!(fp.apply(&FieldValue::Int(11)).unwrap(), FieldValue::Int(1));
        assert_eq!(fp.apply(&FieldValue::Long(20)).unwrap(), FieldValue::Int(1));
        assert_eq!(fp.apply(&FieldValue::Int(30)).unwrap(), FieldValue::Int(2));
        assert_eq!(fp.cardinality(), 3);
    }

    #[test]
    fn int_range_fails_closed_above_last_bound() {
        let fp = FieldPartitioner::int_range("age", vec![10, 20]).unwrap();
        let err = fp.apply(&FieldValue::Int(21)).unwrap_err();
        assert!(matches!(err, PartitionError::OutOfBounds { .. }));
        // The partitioner is still usable after a failed apply.
        assert_eq!(fp.apply(&FieldValue::Int(15)).unwrap(), FieldValue::Int(1));
    }

    #[test]
    fn range_requires_ascending_bounds() {
        assert!(FieldPartitioner::int_range("x", vec![]).is_err());
        assert!(FieldPartitioner::int_range("x", vec![5, 5]).is_err());
        assert!(FieldPartitioner::range("x", vec!["m".into(), "f".into()]).is_err());
    }

    #[test]
    fn string_range_bucket_is_the_bound() {
        let fp = FieldPartitioner::range("last", vec!["g".into(), "n".into(), "z".into()]).unwrap();
        assert_eq!(fp.apply(&FieldValue::from("adams")).unwrap(), FieldValue::from("g"));
        assert_eq!(fp.apply(&FieldValue::from("n")).unwrap(), FieldValue::from("n"));
        assert!(matches!(
            fp.apply(&FieldValue::from("zz")).unwrap_err(),
            PartitionError::OutOfBounds { .. }
        ));
        assert!(matches!(
            fp.apply(&FieldValue::Int(1)).unwrap_err(),
            PartitionError::UnsupportedValue { .. }
        ));
        // The inverse hands back the raw directory string.
        assert_eq!(fp.parse("n").unwrap(), FieldValue::from("n"));
    }

    #[test]
    fn int_range_parse_is_lossy() {
        let fp = FieldPartitioner::int_range("age", vec![10, 20]).unwrap();
        assert_eq!(fp.parse("1").unwrap(), FieldValue::Int(1));
        assert!(matches!(
            fp.parse("one").unwrap_err(),
            PartitionError::InvalidBucket { .. }
        ));
    }

    #[test]
    fn calendar_components_in_utc() {
        let ts = Utc.with_ymd_and_hms(2013, 2, 28, 23, 59, 1).unwrap();
        let value = FieldValue::Timestamp(ts);
        assert_eq!(FieldPartitioner::year("ts", "y").apply(&value).unwrap(), FieldValue::Int(2013));
        assert_eq!(FieldPartitioner::month("ts", "m").apply(&value).unwrap(), FieldValue::Int(2));
        assert_eq!(FieldPartitioner::day("ts", "d").apply(&value).unwrap(), FieldValue::Int(28));
        assert_eq!(FieldPartitioner::hour("ts", "h").apply(&value).unwrap(), FieldValue::Int(23));
        assert_eq!(FieldPartitioner::minute("ts", "mi").apply(&value).unwrap(), FieldValue::Int(59));

        let millis = FieldValue::Long(ts.timestamp_millis());
        assert_eq!(FieldPartitioner::month("ts", "m").apply(&millis).unwrap(), FieldValue::Int(2));
        assert_eq!(FieldPartitioner::year("ts", "y").cardinality(), UNBOUNDED);
    }

    #[test]
    fn calendar_rejects_non_timestamps() {
        let err = FieldPartitioner::year("ts", "y")
            .apply(&FieldValue::from("2013"))
            .unwrap_err();
        assert!(matches!(err, PartitionError::UnsupportedValue { kind: "year", .. }));
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(
            FieldPartitioner::hash("email", 3).unwrap(),
            FieldPartitioner::hash_from("email", "email", 3).unwrap()
        );
        assert_ne!(
            FieldPartitioner::hash("email", 3).unwrap(),
            FieldPartitioner::hash("email", 4).unwrap()
        );
        assert_ne!(
            FieldPartitioner::year("ts", "x"),
            FieldPartitioner::month("ts", "x")
        );
    }
}
