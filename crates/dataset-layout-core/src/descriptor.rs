//! Dataset descriptors.
//!
//! A descriptor is the persisted definition of a dataset: its record schema,
//! an optional partition strategy and the compression new files are written
//! with. On disk it is JSON; the strategy is stored as its partition
//! expression text and parsed back on load.

use serde::{Deserialize, Serialize};

use crate::dataset::WriterOptions;
use crate::format::Compression;
use crate::partition::PartitionStrategy;
use crate::schema::Schema;

/// Schema, layout and write settings of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    schema: Schema,
    #[serde(
        rename = "partition_expression",
        default,
        skip_serializing_if = "Option::is_none",
        with = "strategy_expression"
    )]
    partition_strategy: Option<PartitionStrategy>,
    #[serde(default)]
    compression: Compression,
}

impl DatasetDescriptor {
    /// Start a descriptor for records of `schema`.
    pub fn builder(schema: Schema) -> DatasetDescriptorBuilder {
        DatasetDescriptorBuilder {
            descriptor: DatasetDescriptor {
                schema,
                partition_strategy: None,
                compression: Compression::default(),
            },
        }
    }

    /// Record schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Partition strategy, if the dataset is partitioned.
    pub fn partition_strategy(&self) -> Option<&PartitionStrategy> {
        self.partition_strategy.as_ref()
    }

    /// True if a partition strategy is set.
    pub fn is_partitioned(&self) -> bool {
        self.partition_strategy.is_some()
    }

    /// Compression for new data files.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Writer options derived from this descriptor.
    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions::default().with_compression(self.compression)
    }
}

/// Builder for [`DatasetDescriptor`].
#[derive(Debug, Clone)]
pub struct DatasetDescriptorBuilder {
    descriptor: DatasetDescriptor,
}

impl DatasetDescriptorBuilder {
    /// Partition the dataset with `strategy`.
    pub fn partition_strategy(mut self, strategy: PartitionStrategy) -> Self {
        self.descriptor.partition_strategy = Some(strategy);
        self
    }

    /// Compression for new data files.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.descriptor.compression = compression;
        self
    }

    /// Finish the descriptor.
    pub fn build(self) -> DatasetDescriptor {
        self.descriptor
    }
}

mod strategy_expression {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    use crate::partition::PartitionStrategy;

    pub(super) fn serialize<S: Serializer>(
        strategy: &Option<PartitionStrategy>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match strategy {
            Some(s) => serializer.serialize_some(&s.to_expression()),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<PartitionStrategy>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| text.parse::<PartitionStrategy>().map_err(D::Error::custom))
            .transpose()
    }
}
