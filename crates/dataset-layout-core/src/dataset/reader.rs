//! Use-once filesystem reader.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::debug;
use snafu::prelude::*;

use crate::dataset::{DatasetReader, ReaderWriterState};
use crate::format::{FormatError, RecordCodec, RecordReader};
use crate::schema::Schema;
use crate::storage::{Storage, StorageError};

/// Result alias for reader operations.
pub type DatasetReaderResult<T> = Result<T, DatasetReaderError>;

/// Errors raised by [`FileSystemDatasetReader`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DatasetReaderError {
    /// The operation is not legal in the current state.
    #[snafu(display("cannot {operation} a reader in state {state}"))]
    IllegalState {
        /// Operation attempted.
        operation: &'static str,
        /// State at the time of the call.
        state: ReaderWriterState,
    },

    /// An earlier failure left the reader usable only for `close`.
    #[snafu(display(
        "cannot {operation}: reader for {} failed earlier and must be closed",
        path.display()
    ))]
    Poisoned {
        /// Operation attempted.
        operation: &'static str,
        /// Data file path.
        path: PathBuf,
    },

    /// `read` was called without a preceding `has_next` that returned true.
    #[snafu(display("no record is buffered for {}; call has_next first", path.display()))]
    NoBufferedRecord {
        /// Data file path.
        path: PathBuf,
    },

    /// A storage call failed.
    #[snafu(display("failed to open {}: {source}", path.display()))]
    Storage {
        /// Data file path.
        path: PathBuf,
        /// Storage error.
        source: StorageError,
    },

    /// The data could not be decoded.
    #[snafu(display("failed to read records from {}: {source}", path.display()))]
    Format {
        /// Data file path.
        path: PathBuf,
        /// Format error.
        source: FormatError,
    },
}

/// Reads the records of one data file, projected onto a reader schema.
///
/// Any error poisons the reader; afterwards only [`close`](DatasetReader::close)
/// is legal. Once the data is exhausted `has_next` keeps returning `false`.
pub struct FileSystemDatasetReader<E> {
    storage: Arc<dyn Storage>,
    codec: Arc<dyn RecordCodec<E>>,
    path: PathBuf,
    schema: Schema,
    state: ReaderWriterState,
    poisoned: bool,
    records: Option<Box<dyn RecordReader<E>>>,
    buffered: Option<E>,
    exhausted: bool,
}

impl<E> std::fmt::Debug for FileSystemDatasetReader<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemDatasetReader")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("poisoned", &self.poisoned)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl<E> FileSystemDatasetReader<E> {
    /// Reader for the data file at `path`, producing records in `schema`.
    pub fn new(
        storage: Arc<dyn Storage>,
        codec: Arc<dyn RecordCodec<E>>,
        path: impl Into<PathBuf>,
        schema: Schema,
    ) -> Self {
        Self {
            storage,
            codec,
            path: path.into(),
            schema,
            state: ReaderWriterState::New,
            poisoned: false,
            records: None,
            buffered: None,
            exhausted: false,
        }
    }

    /// Data file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reader schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn check(&self, operation: &'static str, expected: ReaderWriterState) -> DatasetReaderResult<()> {
        ensure!(
            !self.poisoned,
            PoisonedSnafu {
                operation,
                path: &self.path,
            }
        );
        ensure!(
            self.state == expected,
            IllegalStateSnafu {
                operation,
                state: self.state,
            }
        );
        Ok(())
    }

    /// Run `f`, poisoning the reader if it fails.
    fn guarded<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> DatasetReaderResult<T>,
    ) -> DatasetReaderResult<T> {
        let result = f(self);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }
}

impl<E> DatasetReader<E> for FileSystemDatasetReader<E> {
    fn open(&mut self) -> DatasetReaderResult<()> {
        self.guarded(|r| {
            r.check("open", ReaderWriterState::New)?;
            let input = r.storage.open(&r.path).context(StorageSnafu { path: &r.path })?;
            let records = r
                .codec
                .reader(input, &r.schema)
                .context(FormatSnafu { path: &r.path })?;
            debug!("opened reader for {} as {}", r.path.display(), r.schema.name());
            r.records = Some(records);
            r.state = ReaderWriterState::Open;
            Ok(())
        })
    }

    fn has_next(&mut self) -> DatasetReaderResult<bool> {
        self.guarded(|r| {
            r.check("has_next", ReaderWriterState::Open)?;
            if r.buffered.is_some() {
                return Ok(true);
            }
            if r.exhausted {
                return Ok(false);
            }
            let state = r.state;
            let records = r.records.as_mut().context(IllegalStateSnafu {
                operation: "has_next",
                state,
            })?;
            match records.next_record().context(FormatSnafu { path: &r.path })? {
                Some(record) => {
                    r.buffered = Some(record);
                    Ok(true)
                }
                None => {
                    r.exhausted = true;
                    Ok(false)
                }
            }
        })
    }

    fn read(&mut self) -> DatasetReaderResult<E> {
        self.guarded(|r| {
            r.check("read", ReaderWriterState::Open)?;
            r.buffered
                .take()
                .context(NoBufferedRecordSnafu { path: &r.path })
        })
    }

    fn close(&mut self) {
        self.records = None;
        self.buffered = None;
        self.state = ReaderWriterState::Closed;
    }

    fn state(&self) -> ReaderWriterState {
        self.state
    }
}

impl<E> Iterator for FileSystemDatasetReader<E> {
    type Item = DatasetReaderResult<E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned {
            return None;
        }
        match self.has_next() {
            Ok(true) => Some(self.read()),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
