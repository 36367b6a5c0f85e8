//! Partitioning: mapping entity fields to directory buckets.
//!
//! A [`PartitionStrategy`] is an ordered list of [`FieldPartitioner`]s. Each
//! partitioner reads one source field from an entity and produces a bucket
//! value; applying every partitioner in order yields a [`PartitionKey`], and
//! the order fixes the directory nesting used by [`crate::path_codec`].
//!
//! Some partitioners are invertible (identity, calendar components) while
//! others are lossy (hash, range). For lossy partitioners [`FieldPartitioner::parse`]
//! recovers the bucket identifier, never the original source value.

pub mod field;
pub mod strategy;

pub use field::{FieldPartitioner, MAX_HASH_BUCKETS, UNBOUNDED};
pub use strategy::{PartitionKey, PartitionStrategy, PartitionStrategyBuilder};

use snafu::prelude::*;

/// Result alias for partitioning operations.
pub type PartitionResult<T> = Result<T, PartitionError>;

/// Errors raised while building strategies or computing bucket values.
#[derive(Debug, Snafu, Clone, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum PartitionError {
    /// A partitioner was constructed with invalid arguments.
    #[snafu(display("invalid {kind} partitioner '{name}': {reason}"))]
    InvalidPartitioner {
        /// Partitioner function name (`hash`, `range`, ...).
        kind: &'static str,
        /// Output field name of the partitioner.
        name: String,
        /// What was wrong with the arguments.
        reason: String,
    },

    /// A strategy must contain at least one partitioner.
    #[snafu(display("a partition strategy requires at least one field partitioner"))]
    EmptyStrategy,

    /// The value is above every declared upper bound of a range partitioner.
    #[snafu(display("value {value} is outside the bounds of range partitioner '{name}'"))]
    OutOfBounds {
        /// Output field name of the partitioner.
        name: String,
        /// The rejected value, rendered for display.
        value: String,
    },

    /// The partitioner cannot place a value of this type.
    #[snafu(display("{kind} partitioner '{name}' cannot partition {value_type} value {value}"))]
    UnsupportedValue {
        /// Partitioner function name.
        kind: &'static str,
        /// Output field name of the partitioner.
        name: String,
        /// Type label of the rejected value.
        value_type: &'static str,
        /// The rejected value, rendered for display.
        value: String,
    },

    /// The entity does not carry the source field a partitioner reads.
    #[snafu(display("entity has no field '{source_name}' required by partitioner '{name}'"))]
    MissingField {
        /// Source field that was looked up.
        source_name: String,
        /// Output field name of the partitioner.
        name: String,
    },

    /// A directory value could not be parsed back into a bucket value.
    #[snafu(display("cannot parse '{input}' as a bucket of partitioner '{name}': {reason}"))]
    InvalidBucket {
        /// Output field name of the partitioner.
        name: String,
        /// The raw string that failed to parse.
        input: String,
        /// Parser message.
        reason: String,
    },

    /// A key was built with a different number of values than the strategy has partitioners.
    #[snafu(display("partition key has {actual} values but the strategy has {expected} partitioners"))]
    KeyLength {
        /// Number of partitioners in the strategy.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
}
