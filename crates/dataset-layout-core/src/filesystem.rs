//! Filesystem-backed datasets.
//!
//! A dataset lives in one directory. Unpartitioned datasets keep their data
//! files directly in it; partitioned datasets nest them below one
//! `name=value` directory per partitioner. Entries whose names start with
//! `.` or `_` (metadata, staging files) are never treated as data.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::debug;
use snafu::prelude::*;
use uuid::Uuid;

use crate::dataset::{DatasetWriterError, FileSystemDatasetReader, FileSystemDatasetWriter};
use crate::descriptor::DatasetDescriptor;
use crate::format::RecordCodec;
use crate::metadata::{FileSystemMetadataProvider, MetadataError, MetadataProvider};
use crate::partition::{PartitionKey, PartitionStrategy};
use crate::path_codec::{self, PartitionPathCodec, PathCodecError};
use crate::schema::Schema;
use crate::storage::{FileStatus, Storage, StorageError};

/// Result alias for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Errors raised by [`FileSystemDataset`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DatasetError {
    /// The operation needs a partition strategy.
    #[snafu(display("dataset '{name}' is not partitioned"))]
    NotPartitioned {
        /// Dataset name.
        name: String,
    },

    /// The operation is only valid for unpartitioned datasets.
    #[snafu(display("dataset '{name}' is partitioned; write through a partition writer"))]
    Partitioned {
        /// Dataset name.
        name: String,
    },

    /// Listing or inspecting the dataset directory failed.
    #[snafu(display("storage error in dataset '{name}': {source}"))]
    Storage {
        /// Dataset name.
        name: String,
        /// Storage error.
        source: StorageError,
    },

    /// A partition key or directory could not be mapped.
    #[snafu(display("partition path error in dataset '{name}': {source}"))]
    PartitionPath {
        /// Dataset name.
        name: String,
        /// Codec error.
        source: PathCodecError,
    },

    /// A writer could not be constructed.
    #[snafu(display("cannot create writer for dataset '{name}': {source}"))]
    Writer {
        /// Dataset name.
        name: String,
        /// Writer error.
        source: DatasetWriterError,
    },

    /// The descriptor could not be loaded.
    #[snafu(display("cannot load dataset: {source}"))]
    Metadata {
        /// Metadata error.
        source: MetadataError,
    },
}

/// A named dataset stored under a directory.
pub struct FileSystemDataset<E> {
    storage: Arc<dyn Storage>,
    codec: Arc<dyn RecordCodec<E>>,
    path_codec: PartitionPathCodec,
    name: String,
    directory: PathBuf,
    descriptor: DatasetDescriptor,
}

impl<E> std::fmt::Debug for FileSystemDataset<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemDataset")
            .field("name", &self.name)
            .field("directory", &self.directory)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl<E> FileSystemDataset<E> {
    /// Dataset `name` stored in `directory`.
    pub fn new(
        storage: Arc<dyn Storage>,
        codec: Arc<dyn RecordCodec<E>>,
        name: impl Into<String>,
        directory: impl Into<PathBuf>,
        descriptor: DatasetDescriptor,
    ) -> Self {
        Self {
            path_codec: PartitionPathCodec::new(Arc::clone(&storage)),
            storage,
            codec,
            name: name.into(),
            directory: directory.into(),
            descriptor,
        }
    }

    /// Load dataset `name` through `provider`.
    pub fn load(
        provider: &FileSystemMetadataProvider,
        codec: Arc<dyn RecordCodec<E>>,
        name: &str,
    ) -> DatasetResult<Self> {
        let descriptor = provider.load(name).context(MetadataSnafu)?;
        let directory = provider.dataset_directory(name).context(MetadataSnafu)?;
        debug!("loaded dataset {name} at {}", directory.display());
        Ok(Self::new(
            Arc::clone(provider.storage()),
            codec,
            name,
            directory,
            descriptor,
        ))
    }

    /// Dataset name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root directory of the dataset.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Dataset descriptor.
    pub fn descriptor(&self) -> &DatasetDescriptor {
        &self.descriptor
    }

    fn strategy(&self) -> DatasetResult<&PartitionStrategy> {
        self.descriptor
            .partition_strategy()
            .context(NotPartitionedSnafu { name: &self.name })
    }

    fn writer_at(&self, dir: &Path) -> DatasetResult<FileSystemDatasetWriter<E>> {
        let file = format!("{}.{}", Uuid::new_v4(), self.codec.extension());
        FileSystemDatasetWriter::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.codec),
            dir.join(file),
            self.descriptor.schema().clone(),
            self.descriptor.writer_options(),
        )
        .context(WriterSnafu { name: &self.name })
    }

    /// Writer for a new data file of an unpartitioned dataset.
    pub fn new_writer(&self) -> DatasetResult<FileSystemDatasetWriter<E>> {
        ensure!(
            !self.descriptor.is_partitioned(),
            PartitionedSnafu { name: &self.name }
        );
        self.writer_at(&self.directory)
    }

    /// Writer for a new data file in the partition identified by `key`.
    pub fn partition_writer(&self, key: &PartitionKey) -> DatasetResult<FileSystemDatasetWriter<E>> {
        let relative =
            path_codec::encode(self.strategy()?, key).context(PartitionPathSnafu { name: &self.name })?;
        self.writer_at(&self.directory.join(relative))
    }

    /// Partition key of the partition directory `path`.
    pub fn partition_key_for_path(&self, path: &Path) -> DatasetResult<PartitionKey> {
        self.path_codec
            .decode(self.strategy()?, &self.directory, path)
            .context(PartitionPathSnafu { name: &self.name })
    }

    /// Keys of every partition directory that currently exists.
    pub fn partition_keys(&self) -> DatasetResult<Vec<PartitionKey>> {
        let strategy = self.strategy()?;
        let mut level = vec![self.directory.clone()];
        for _ in 0..strategy.len() {
            let mut next = Vec::new();
            for dir in &level {
                next.extend(
                    self.visible_entries(dir)?
                        .into_iter()
                        .filter(|s| s.is_dir)
                        .map(|s| s.path),
                );
            }
            level = next;
        }
        level
            .iter()
            .map(|dir| self.partition_key_for_path(dir))
            .collect()
    }

    /// Committed data files, sorted by path.
    pub fn data_files(&self) -> DatasetResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![self.directory.clone()];
        while let Some(dir) = pending.pop() {
            for status in self.visible_entries(&dir)? {
                if status.is_dir {
                    pending.push(status.path);
                } else {
                    files.push(status.path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// One reader per data file, producing records in the dataset schema.
    pub fn new_readers(&self) -> DatasetResult<Vec<FileSystemDatasetReader<E>>> {
        self.new_readers_with_schema(self.descriptor.schema().clone())
    }

    /// One reader per data file, projecting records onto `schema`.
    pub fn new_readers_with_schema(
        &self,
        schema: Schema,
    ) -> DatasetResult<Vec<FileSystemDatasetReader<E>>> {
        Ok(self
            .data_files()?
            .into_iter()
            .map(|path| {
                FileSystemDatasetReader::new(
                    Arc::clone(&self.storage),
                    Arc::clone(&self.codec),
                    path,
                    schema.clone(),
                )
            })
            .collect())
    }

    fn visible_entries(&self, dir: &Path) -> DatasetResult<Vec<FileStatus>> {
        let exists = self
            .storage
            .exists(dir)
            .context(StorageSnafu { name: &self.name })?;
        if !exists {
            return Ok(Vec::new());
        }
        let entries = self
            .storage
            .list(dir)
            .context(StorageSnafu { name: &self.name })?;
        Ok(entries
            .into_iter()
            .filter(|s| {
                s.path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with(['.', '_']))
            })
            .collect())
    }
}
