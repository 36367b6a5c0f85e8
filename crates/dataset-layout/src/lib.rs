//! # dataset-layout
//!
//! Partitioned, directory-structured record datasets with atomic writers.
//!
//! This crate is the supported public entry point and provides a small, stable surface.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dataset_layout::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let strategy: PartitionStrategy = r#"[hash("username", "username_part", 2), hash("email", 3)]"#.parse()?;
//! let schema = Schema::new(
//!     "user",
//!     vec![
//!         SchemaField::required("username", FieldType::String),
//!         SchemaField::required("email", FieldType::String),
//!     ],
//! )?;
//! let descriptor = DatasetDescriptor::builder(schema)
//!     .partition_strategy(strategy.clone())
//!     .build();
//! let dataset = FileSystemDataset::<Record>::new(
//!     Arc::new(LocalStorage::new()),
//!     Arc::new(JsonRecordCodec),
//!     "users",
//!     "/data/users",
//!     descriptor,
//! );
//!
//! let user = Record::new().with("username", "alice").with("email", "alice@example.com");
//! let mut writer = dataset.partition_writer(&strategy.key_for(&user)?)?;
//! writer.open()?;
//! writer.write(&user)?;
//! writer.close()?;
//! # Ok(())
//! # }
//! ```

/// Convenience prelude with the stable, supported surface.
pub mod prelude;

/// Storage capability namespace.
pub mod storage {
    pub use dataset_layout_core::storage::{
        BackendError, FileStatus, LocalStorage, Storage, StorageError, StorageResult, SyncWrite,
        temp_path_for, write_atomic,
    };
}

/// Record format namespace.
pub mod format {
    pub use dataset_layout_core::format::{
        Compression, FORMAT_TAG, FORMAT_VERSION, FormatError, FormatResult, JsonRecordCodec,
        RecordCodec, RecordReader, RecordWriter,
    };
}

pub use dataset_layout_core::dataset::{
    DatasetReader, DatasetReaderError, DatasetWriter, DatasetWriterError, FileSystemDatasetReader,
    FileSystemDatasetWriter, ReaderWriterState, WriterOptions,
};
pub use dataset_layout_core::descriptor::{DatasetDescriptor, DatasetDescriptorBuilder};
pub use dataset_layout_core::expression::{
    ExpressionEngine, ExpressionError, PartitionExpression, evaluate_shared, to_expression,
};
pub use dataset_layout_core::filesystem::{DatasetError, FileSystemDataset};
pub use dataset_layout_core::metadata::{
    FileSystemMetadataProvider, MetadataError, MetadataProvider,
};
pub use dataset_layout_core::partition::{
    FieldPartitioner, PartitionError, PartitionKey, PartitionStrategy, PartitionStrategyBuilder,
};
pub use dataset_layout_core::path_codec::{PartitionPathCodec, PathCodecError};
pub use dataset_layout_core::schema::{
    FieldType, Schema, SchemaError, SchemaField, SchemaResolution,
};
pub use dataset_layout_core::value::{Entity, FieldValue, Record};
