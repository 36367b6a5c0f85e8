//! Descriptor persistence.
//!
//! [`FileSystemMetadataProvider`] keeps each dataset's descriptor at
//! `<root>/<name>/.metadata/descriptor.json`. Saves go through
//! [`write_atomic`], so a concurrent load sees either the old or the new
//! descriptor, never a torn one.

use std::{
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
};

use snafu::prelude::*;

use crate::descriptor::DatasetDescriptor;
use crate::storage::{Storage, StorageError, write_atomic};

/// Directory holding a dataset's metadata, relative to the dataset directory.
pub const METADATA_DIR: &str = ".metadata";

/// Descriptor file name inside [`METADATA_DIR`].
pub const DESCRIPTOR_FILE: &str = "descriptor.json";

/// Result alias for metadata operations.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Errors raised while loading or storing descriptors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MetadataError {
    /// The dataset name cannot be used as a directory name.
    #[snafu(display("invalid dataset name '{name}'"))]
    InvalidName {
        /// Rejected name.
        name: String,
    },

    /// No descriptor is stored for the dataset.
    #[snafu(display("dataset '{name}' does not exist"))]
    NotFound {
        /// Dataset name.
        name: String,
    },

    /// A storage call failed.
    #[snafu(display("metadata storage error for dataset '{name}': {source}"))]
    Storage {
        /// Dataset name.
        name: String,
        /// Storage error.
        source: StorageError,
    },

    /// The descriptor file could not be read.
    #[snafu(display("failed to read descriptor of dataset '{name}': {source}"))]
    Read {
        /// Dataset name.
        name: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The descriptor could not be encoded or decoded.
    #[snafu(display("invalid descriptor for dataset '{name}': {source}"))]
    Serde {
        /// Dataset name.
        name: String,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Loads and stores dataset descriptors by name.
pub trait MetadataProvider {
    /// Descriptor of dataset `name`.
    fn load(&self, name: &str) -> MetadataResult<DatasetDescriptor>;

    /// Create or replace the descriptor of dataset `name`.
    fn save(&self, name: &str, descriptor: &DatasetDescriptor) -> MetadataResult<()>;

    /// Remove all metadata of dataset `name`. Returns `false` if there was none.
    fn delete(&self, name: &str) -> MetadataResult<bool>;

    /// True if a descriptor is stored for `name`.
    fn exists(&self, name: &str) -> MetadataResult<bool>;
}

/// Stores descriptors as JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct FileSystemMetadataProvider {
    storage: Arc<dyn Storage>,
    root: PathBuf,
}

impl FileSystemMetadataProvider {
    /// Provider rooted at `root`.
    pub fn new(storage: Arc<dyn Storage>, root: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            root: root.into(),
        }
    }

    /// Root directory holding one directory per dataset.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage handle used by this provider.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Data directory of dataset `name`.
    pub fn dataset_directory(&self, name: &str) -> MetadataResult<PathBuf> {
        ensure!(
            !name.is_empty()
                && !name.starts_with(['.', '_'])
                && !name.contains(['/', '\\']),
            InvalidNameSnafu { name }
        );
        Ok(self.root.join(name))
    }

    fn metadata_directory(&self, name: &str) -> MetadataResult<PathBuf> {
        Ok(self.dataset_directory(name)?.join(METADATA_DIR))
    }

    fn descriptor_path(&self, name: &str) -> MetadataResult<PathBuf> {
        Ok(self.metadata_directory(name)?.join(DESCRIPTOR_FILE))
    }
}

impl MetadataProvider for FileSystemMetadataProvider {
    fn load(&self, name: &str) -> MetadataResult<DatasetDescriptor> {
        let path = self.descriptor_path(name)?;
        let mut input = match self.storage.open(&path) {
            Ok(input) => input,
            Err(StorageError::NotFound { .. }) => return NotFoundSnafu { name }.fail(),
            Err(source) => return Err(source).context(StorageSnafu { name }),
        };
        let mut json = String::new();
        input.read_to_string(&mut json).context(ReadSnafu { name })?;
        serde_json::from_str(&json).context(SerdeSnafu { name })
    }

    fn save(&self, name: &str, descriptor: &DatasetDescriptor) -> MetadataResult<()> {
        let path = self.descriptor_path(name)?;
        let json = serde_json::to_vec_pretty(descriptor).context(SerdeSnafu { name })?;
        write_atomic(self.storage.as_ref(), &path, &json).context(StorageSnafu { name })
    }

    fn delete(&self, name: &str) -> MetadataResult<bool> {
        let dir = self.metadata_directory(name)?;
        self.storage
            .delete(&dir, true)
            .context(StorageSnafu { name })
    }

    fn exists(&self, name: &str) -> MetadataResult<bool> {
        let path = self.descriptor_path(name)?;
        self.storage.exists(&path).context(StorageSnafu { name })
    }
}
