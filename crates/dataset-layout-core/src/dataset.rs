//! Dataset writers and readers.
//!
//! Both follow a `NEW -> OPEN -> CLOSED` lifecycle tracked by
//! [`ReaderWriterState`]. Writers stage records in a hidden sibling temp
//! file and promote it with one atomic rename on `close`, so a data file at
//! its final path is always complete. Readers are use-once streams that may
//! project the stored records onto a different, compatible schema.
//!
//! Neither type synchronizes internally. Use one instance per thread.

mod reader;
mod writer;

pub use reader::{DatasetReaderError, DatasetReaderResult, FileSystemDatasetReader};
pub use writer::{DatasetWriterError, DatasetWriterResult, FileSystemDatasetWriter};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::format::Compression;

/// Lifecycle state of a writer or reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReaderWriterState {
    /// Constructed, not yet opened.
    New,
    /// Opened and usable.
    Open,
    /// Closed; no further I/O.
    Closed,
}

impl fmt::Display for ReaderWriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReaderWriterState::New => "NEW",
            ReaderWriterState::Open => "OPEN",
            ReaderWriterState::Closed => "CLOSED",
        })
    }
}

/// Options applied when a writer opens its output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterOptions {
    /// Body compression. zstd unless disabled.
    #[serde(default)]
    pub compression: Compression,
}

impl WriterOptions {
    /// Replace the compression setting.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

/// Sink that commits records atomically.
pub trait DatasetWriter<E> {
    /// Open the temporary output. Legal only in `NEW`.
    fn open(&mut self) -> DatasetWriterResult<()>;

    /// Append one record. Legal only in `OPEN`.
    fn write(&mut self, entity: &E) -> DatasetWriterResult<()>;

    /// Push buffered records to the temporary file. Legal only in `OPEN`.
    fn flush(&mut self) -> DatasetWriterResult<()>;

    /// Commit the output and move to `CLOSED`. Repeated calls do nothing.
    fn close(&mut self) -> DatasetWriterResult<()>;

    /// Current lifecycle state.
    fn state(&self) -> ReaderWriterState;
}

/// Use-once record stream.
///
/// Iterating yields the remaining records; the first error ends the iteration.
pub trait DatasetReader<E>: Iterator<Item = DatasetReaderResult<E>> {
    /// Open the underlying data. Legal only in `NEW`.
    fn open(&mut self) -> DatasetReaderResult<()>;

    /// True if another record is available. Buffers that record for [`read`](Self::read).
    fn has_next(&mut self) -> DatasetReaderResult<bool>;

    /// The record buffered by the preceding `has_next() == true`.
    fn read(&mut self) -> DatasetReaderResult<E>;

    /// Release the underlying stream. Legal in every state; idempotent.
    fn close(&mut self);

    /// Current lifecycle state.
    fn state(&self) -> ReaderWriterState;
}
