//! Ordered partitioner chains and the keys they produce.

use std::{fmt, str::FromStr};

use snafu::prelude::*;

use crate::expression::{self, ExpressionError};
use crate::partition::{
    EmptyStrategySnafu, FieldPartitioner, KeyLengthSnafu, MissingFieldSnafu, PartitionError,
    PartitionResult, UNBOUNDED,
};
use crate::schema::FieldType;
use crate::value::{Entity, FieldValue};

/// An ordered, immutable list of field partitioners.
///
/// Order is significant: it defines the directory nesting depth and must be
/// identical between writers and readers of a dataset. Names need not be
/// unique; path decoding is positional.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionStrategy {
    partitioners: Vec<FieldPartitioner>,
}

impl PartitionStrategy {
    /// Build a strategy from a non-empty list of partitioners.
    pub fn new(partitioners: Vec<FieldPartitioner>) -> PartitionResult<Self> {
        ensure!(!partitioners.is_empty(), EmptyStrategySnafu);
        Ok(Self { partitioners })
    }

    /// Start an accumulating builder.
    pub fn builder() -> PartitionStrategyBuilder {
        PartitionStrategyBuilder::default()
    }

    /// The partitioners, in strategy order.
    pub fn field_partitioners(&self) -> &[FieldPartitioner] {
        &self.partitioners
    }

    /// Number of partitioners (and therefore directory levels).
    pub fn len(&self) -> usize {
        self.partitioners.len()
    }

    /// Always false; strategies are non-empty by construction.
    pub fn is_empty(&self) -> bool {
        self.partitioners.is_empty()
    }

    /// Total number of distinct partitions, or `None` if any level is unbounded.
    pub fn cardinality(&self) -> Option<u64> {
        self.partitioners.iter().try_fold(1u64, |acc, fp| {
            match fp.cardinality() {
                UNBOUNDED => None,
                n => acc.checked_mul(u64::from(n)),
            }
        })
    }

    /// Apply every partitioner, in order, to the matching field of `entity`.
    pub fn key_for<E: Entity + ?Sized>(&self, entity: &E) -> PartitionResult<PartitionKey> {
        let values = self
            .partitioners
            .iter()
            .map(|fp| {
                let value = entity.get(fp.source_name()).context(MissingFieldSnafu {
                    source_name: fp.source_name(),
                    name: fp.name(),
                })?;
                fp.apply(value)
            })
            .collect::<PartitionResult<Vec<_>>>()?;
        Ok(PartitionKey { values })
    }

    /// Build a key from already-bucketed values, one per partitioner.
    pub fn partition_key(&self, values: Vec<FieldValue>) -> PartitionResult<PartitionKey> {
        ensure!(
            values.len() == self.partitioners.len(),
            KeyLengthSnafu {
                expected: self.partitioners.len(),
                actual: values.len(),
            }
        );
        Ok(PartitionKey { values })
    }

    /// Canonical expression text for this strategy.
    pub fn to_expression(&self) -> String {
        expression::to_expression(self)
    }
}

impl fmt::Display for PartitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_expression())
    }
}

impl FromStr for PartitionStrategy {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        expression::evaluate_shared(s)
    }
}

/// Accumulating builder for [`PartitionStrategy`].
///
/// The first invalid partitioner is remembered and reported by
/// [`PartitionStrategyBuilder::build`].
#[derive(Debug, Default)]
pub struct PartitionStrategyBuilder {
    partitioners: Vec<FieldPartitioner>,
    error: Option<PartitionError>,
}

impl PartitionStrategyBuilder {
    fn push(mut self, fp: PartitionResult<FieldPartitioner>) -> Self {
        match fp {
            Ok(fp) => self.partitioners.push(fp),
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e);
                }
            }
        }
        self
    }

    /// Append a hash partitioner over `name`.
    pub fn hash(self, name: &str, buckets: u32) -> Self {
        self.push(FieldPartitioner::hash(name, buckets))
    }

    /// Append a hash partitioner reading `source` into `name`.
    pub fn hash_from(self, source: &str, name: &str, buckets: u32) -> Self {
        self.push(FieldPartitioner::hash_from(source, name, buckets))
    }

    /// Append an identity partitioner over a string field.
    pub fn identity(self, name: &str, cardinality: u32) -> Self {
        self.push(Ok(FieldPartitioner::identity(name, cardinality)))
    }

    /// Append an identity partitioner over a field of `value_type`.
    pub fn identity_typed(self, name: &str, value_type: FieldType, cardinality: u32) -> Self {
        self.push(Ok(FieldPartitioner::identity_typed(name, value_type, cardinality)))
    }

    /// Append an integer range partitioner.
    pub fn range(self, name: &str, upper_bounds: &[i64]) -> Self {
        self.push(FieldPartitioner::int_range(name, upper_bounds.to_vec()))
    }

    /// Append a string range partitioner.
    pub fn range_str(self, name: &str, upper_bounds: &[&str]) -> Self {
        let bounds = upper_bounds.iter().map(|b| b.to_string()).collect();
        self.push(FieldPartitioner::range(name, bounds))
    }

    /// Append a year partitioner.
    pub fn year(self, source: &str, name: &str) -> Self {
        self.push(Ok(FieldPartitioner::year(source, name)))
    }

    /// Append a month partitioner.
    pub fn month(self, source: &str, name: &str) -> Self {
        self.push(Ok(FieldPartitioner::month(source, name)))
    }

    /// Append a day-of-month partitioner.
    pub fn day(self, source: &str, name: &str) -> Self {
        self.push(Ok(FieldPartitioner::day(source, name)))
    }

    /// Append an hour partitioner.
    pub fn hour(self, source: &str, name: &str) -> Self {
        self.push(Ok(FieldPartitioner::hour(source, name)))
    }

    /// Append a minute partitioner.
    pub fn minute(self, source: &str, name: &str) -> Self {
        self.push(Ok(FieldPartitioner::minute(source, name)))
    }

    /// Freeze the accumulated partitioners into a strategy.
    pub fn build(self) -> PartitionResult<PartitionStrategy> {
        if let Some(e) = self.error {
            return Err(e);
        }
        PartitionStrategy::new(self.partitioners)
    }
}

/// Ordered bucket values, one per partitioner of a strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionKey {
    values: Vec<FieldValue>,
}

impl PartitionKey {
    /// Bucket values in strategy order.
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// Bucket value at `index`.
    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index)
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the key has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume the key and return its values.
    pub fn into_values(self) -> Vec<FieldValue> {
        self.values
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}
