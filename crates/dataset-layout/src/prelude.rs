//! Wrapper prelude.
//!
//! The `dataset-layout` crate is the supported public entry point.
//! Downstream code should prefer importing from this prelude instead of
//! depending on internal core module paths.

pub use crate::format::{Compression, JsonRecordCodec};
pub use crate::storage::{LocalStorage, Storage};
pub use crate::{
    DatasetDescriptor, DatasetError, DatasetReader, DatasetReaderError, DatasetWriter,
    DatasetWriterError, Entity, ExpressionEngine, FieldPartitioner, FieldType, FieldValue,
    FileSystemDataset, FileSystemDatasetReader, FileSystemDatasetWriter,
    FileSystemMetadataProvider, MetadataProvider, PartitionKey, PartitionPathCodec,
    PartitionStrategy, ReaderWriterState, Record, Schema, SchemaField, WriterOptions,
};
