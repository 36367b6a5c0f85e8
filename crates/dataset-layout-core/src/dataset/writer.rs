//! Atomic filesystem writer.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, warn};
use snafu::prelude::*;

use crate::dataset::{DatasetWriter, ReaderWriterState, WriterOptions};
use crate::format::{FormatError, RecordCodec, RecordWriter};
use crate::schema::Schema;
use crate::storage::{Storage, StorageError, TempFileGuard, temp_path_for};

/// Result alias for writer operations.
pub type DatasetWriterResult<T> = Result<T, DatasetWriterError>;

/// Errors raised by [`FileSystemDatasetWriter`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DatasetWriterError {
    /// The writer cannot be built for this path.
    #[snafu(display("invalid writer configuration: {message}"))]
    InvalidConfiguration {
        /// What is wrong.
        message: String,
    },

    /// The operation is not legal in the current state.
    #[snafu(display("cannot {operation} a writer in state {state}"))]
    IllegalState {
        /// Operation attempted.
        operation: &'static str,
        /// State at the time of the call.
        state: ReaderWriterState,
    },

    /// An earlier failure left the writer usable only for `close`.
    #[snafu(display(
        "cannot {operation}: writer for {} failed earlier and must be closed",
        path.display()
    ))]
    Poisoned {
        /// Operation attempted.
        operation: &'static str,
        /// Final path of the writer.
        path: PathBuf,
    },

    /// A storage call failed.
    #[snafu(display("failed to {operation} {}: {source}", path.display()))]
    Storage {
        /// Operation in progress.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Storage error.
        source: StorageError,
    },

    /// The record format failed.
    #[snafu(display("failed to {operation} records for {}: {source}", path.display()))]
    Format {
        /// Operation in progress.
        operation: &'static str,
        /// Final path of the writer.
        path: PathBuf,
        /// Format error.
        source: FormatError,
    },

    /// Storage refused to move the finished temp file into place.
    #[snafu(display(
        "could not commit {} to {}: rename was refused",
        temp.display(),
        path.display()
    ))]
    CommitRejected {
        /// Temporary path.
        temp: PathBuf,
        /// Final path.
        path: PathBuf,
    },
}

/// Writes records to a hidden temp file and renames it into place on close.
///
/// ```text
/// NEW --open()--> OPEN --write()*, flush()*--> OPEN --close()--> CLOSED
/// ```
///
/// A failed `write` or `flush` poisons the writer: further writes fail with
/// [`DatasetWriterError::Poisoned`] and `close` discards the temp file
/// instead of committing it. Dropping an open writer leaves the temp file in
/// place and never creates the final path.
pub struct FileSystemDatasetWriter<E> {
    storage: Arc<dyn Storage>,
    codec: Arc<dyn RecordCodec<E>>,
    path: PathBuf,
    temp_path: PathBuf,
    schema: Schema,
    options: WriterOptions,
    state: ReaderWriterState,
    poisoned: bool,
    appender: Option<Box<dyn RecordWriter<E>>>,
    records: u64,
}

impl<E> std::fmt::Debug for FileSystemDatasetWriter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemDatasetWriter")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("poisoned", &self.poisoned)
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl<E> FileSystemDatasetWriter<E> {
    /// Writer that will commit to `path`.
    pub fn new(
        storage: Arc<dyn Storage>,
        codec: Arc<dyn RecordCodec<E>>,
        path: impl Into<PathBuf>,
        schema: Schema,
        options: WriterOptions,
    ) -> DatasetWriterResult<Self> {
        let path = path.into();
        let temp_path = temp_path_for(&path).context(InvalidConfigurationSnafu {
            message: format!("{} has no file name", path.display()),
        })?;
        Ok(Self {
            storage,
            codec,
            path,
            temp_path,
            schema,
            options,
            state: ReaderWriterState::New,
            poisoned: false,
            appender: None,
            records: 0,
        })
    }

    /// Final path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path records are staged in until commit.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Records written so far.
    pub fn records_written(&self) -> u64 {
        self.records
    }

    fn check(&self, operation: &'static str, expected: ReaderWriterState) -> DatasetWriterResult<()> {
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

    fn start(&self) -> DatasetWriterResult<Box<dyn RecordWriter<E>>> {
        let mut guard = TempFileGuard::new(self.storage.as_ref(), self.temp_path.clone());
        let out = self
            .storage
            .create(&self.temp_path, true)
            .context(StorageSnafu {
                operation: "create",
                path: &self.temp_path,
            })?;
        let appender = self
            .codec
            .writer(out, &self.schema, self.options.compression)
            .context(FormatSnafu {
                operation: "start",
                path: &self.path,
            })?;
        guard.disarm();
        Ok(appender)
    }

    fn appender(&mut self, operation: &'static str) -> DatasetWriterResult<&mut Box<dyn RecordWriter<E>>> {
        let state = self.state;
        self.appender
            .as_mut()
            .context(IllegalStateSnafu { operation, state })
    }

    fn commit(&self, appender: Box<dyn RecordWriter<E>>) -> DatasetWriterResult<()> {
        let mut guard = TempFileGuard::new(self.storage.as_ref(), self.temp_path.clone());

        appender.close().context(FormatSnafu {
            operation: "close",
            path: &self.path,
        })?;

        let renamed = self
            .storage
            .rename(&self.temp_path, &self.path)
            .context(StorageSnafu {
                operation: "commit",
                path: &self.path,
            })?;
        ensure!(
            renamed,
            CommitRejectedSnafu {
                temp: &self.temp_path,
                path: &self.path,
            }
        );

        guard.disarm();
        Ok(())
    }

    fn discard(&mut self) {
        self.appender = None;
        if let Err(e) = self.storage.delete(&self.temp_path, false) {
            warn!(
                "failed to remove temp file {} of failed writer: {e}",
                self.temp_path.display()
            );
        }
        warn!(
            "discarded uncommitted output for {} after an earlier failure",
            self.path.display()
        );
    }
}

impl<E> DatasetWriter<E> for FileSystemDatasetWriter<E> {
    fn open(&mut self) -> DatasetWriterResult<()> {
        self.check("open", ReaderWriterState::New)?;
        match self.start() {
            Ok(appender) => {
                debug!(
                    "opened writer for {} (staging in {}, compression {})",
                    self.path.display(),
                    self.temp_path.display(),
                    self.options.compression
                );
                self.appender = Some(appender);
                self.state = ReaderWriterState::Open;
                Ok(())
            }
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    fn write(&mut self, entity: &E) -> DatasetWriterResult<()> {
        self.check("write", ReaderWriterState::Open)?;
        let path = self.path.clone();
        let result = self
            .appender("write")?
            .append(entity)
            .context(FormatSnafu {
                operation: "append",
                path,
            });
        match result {
            Ok(()) => {
                self.records += 1;
                Ok(())
            }
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> DatasetWriterResult<()> {
        self.check("flush", ReaderWriterState::Open)?;
        let path = self.path.clone();
        let result = self.appender("flush")?.flush().context(FormatSnafu {
            operation: "flush",
            path,
        });
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn close(&mut self) -> DatasetWriterResult<()> {
        if self.state != ReaderWriterState::Open {
            self.state = ReaderWriterState::Closed;
            return Ok(());
        }
        self.state = ReaderWriterState::Closed;

        if self.poisoned {
            self.discard();
            return Ok(());
        }

        let Some(appender) = self.appender.take() else {
            return Ok(());
        };
        match self.commit(appender) {
            Ok(()) => {
                debug!(
                    "committed {} records to {}",
                    self.records,
                    self.path.display()
                );
                Ok(())
            }
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    fn state(&self) -> ReaderWriterState {
        self.state
    }
}

impl<E> Drop for FileSystemDatasetWriter<E> {
    fn drop(&mut self) {
        if self.state == ReaderWriterState::Open {
            warn!(
                "writer for {} dropped while open; uncommitted data left in {}",
                self.path.display(),
                self.temp_path.display()
            );
        }
    }
}
