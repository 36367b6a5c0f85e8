//! Field values and the entities that carry them.
//!
//! Partitioners, the path codec, and the record format all operate on
//! [`FieldValue`]. An [`Entity`] is anything that can look up a value by
//! field name; [`Record`] is the ordered-map entity used by the bundled
//! JSON record format.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

/// A single typed value stored in a record field or produced as a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Absent value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer. Bucket identifiers use this variant.
    Int(i32),
    /// 64-bit signed integer.
    Long(i64),
    /// 64-bit floating point.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Short type label used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::Long(_) => "long",
            FieldValue::Double(_) => "double",
            FieldValue::String(_) => "string",
            FieldValue::Timestamp(_) => "timestamp",
        }
    }

    /// Returns the value as an `i64` if it is an integral variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(i64::from(*v)),
            FieldValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Stable 64-bit hash of the value.
    ///
    /// The hash is computed over a type tag plus a fixed byte encoding, so it
    /// is identical across processes and platforms. Hash partitioning relies
    /// on this to place the same value in the same bucket on every run.
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = Xxh3::new();
        match self {
            FieldValue::Null => hasher.update(&[0]),
            FieldValue::Bool(b) => {
                hasher.update(&[1]);
                hasher.update(&[u8::from(*b)]);
            }
            // Int and Long hash identically so a widened column keeps its buckets.
            FieldValue::Int(v) => {
                hasher.update(&[2]);
                hasher.update(&i64::from(*v).to_le_bytes());
            }
            FieldValue::Long(v) => {
                hasher.update(&[2]);
                hasher.update(&v.to_le_bytes());
            }
            FieldValue::Double(v) => {
                hasher.update(&[3]);
                hasher.update(&v.to_bits().to_le_bytes());
            }
            FieldValue::String(s) => {
                hasher.update(&[4]);
                hasher.update(s.as_bytes());
            }
            FieldValue::Timestamp(ts) => {
                hasher.update(&[5]);
                hasher.update(&ts.timestamp_millis().to_le_bytes());
            }
        }
        hasher.digest()
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Long(v) => write!(f, "{v}"),
            FieldValue::Double(v) => write!(f, "{v}"),
            FieldValue::String(s) => write!(f, "{s}"),
            FieldValue::Timestamp(ts) => {
                write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Long(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

/// Anything whose fields can be looked up by name.
///
/// Partition strategies read source fields through this trait, so callers can
/// partition their own record types without converting them to [`Record`].
pub trait Entity {
    /// Returns the value of `field`, or `None` when the entity has no such field.
    fn get(&self, field: &str) -> Option<&FieldValue>;
}

/// A generic record: field name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set `name` to `value`, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Number of fields present.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Entity for Record {
    fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}
