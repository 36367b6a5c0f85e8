//! Record serialization capability.
//!
//! Writers and readers do not know how records are laid out on disk; they
//! ask a [`RecordCodec`] for a [`RecordWriter`] over an output stream or a
//! [`RecordReader`] over an input stream. The bundled [`JsonRecordCodec`]
//! stores a self-describing header followed by one JSON object per record.

mod json;

pub use json::{FORMAT_TAG, FORMAT_VERSION, JsonRecordCodec};

use std::{fmt, io::Read};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::schema::{FieldType, Schema, SchemaError};
use crate::storage::SyncWrite;

/// Result alias for record format operations.
pub type FormatResult<T> = Result<T, FormatError>;

/// Errors raised while encoding or decoding records.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FormatError {
    /// Underlying stream failure.
    #[snafu(display("I/O error while {operation}: {source}"))]
    Io {
        /// What the codec was doing.
        operation: &'static str,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A header or record line is not valid JSON of the expected shape.
    #[snafu(display("Malformed JSON at line {line}: {source}"))]
    Json {
        /// 1-based line number in the decompressed stream.
        line: usize,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A header or record could not be encoded.
    #[snafu(display("Failed to encode JSON: {source}"))]
    Encode {
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The stream does not start with a recognised header.
    #[snafu(display("Invalid header: {message}"))]
    Header {
        /// Description of the problem.
        message: String,
    },

    /// The writer schema cannot be read with the requested reader schema.
    #[snafu(display("Incompatible schemas: {source}"))]
    Resolution {
        /// Underlying schema error.
        source: SchemaError,
    },

    /// A non-nullable field has no value.
    #[snafu(display("Field '{field}' is required but missing or null"))]
    MissingValue {
        /// Field name.
        field: String,
    },

    /// A value does not match the declared field type.
    #[snafu(display("Field '{field}' expects {expected}, found {found}"))]
    ValueType {
        /// Field name.
        field: String,
        /// Declared type.
        expected: FieldType,
        /// Description of what was found.
        found: String,
    },
}

/// Block compression applied to the record body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "codec", rename_all = "snake_case")]
pub enum Compression {
    /// Records are stored as plain text.
    None,
    /// Records are compressed with zstd at `level`.
    Zstd {
        /// zstd compression level.
        level: i32,
    },
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Zstd {
            level: zstd::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => f.write_str("none"),
            Compression::Zstd { level } => write!(f, "zstd({level})"),
        }
    }
}

/// Appends records of type `E` to an open stream.
pub trait RecordWriter<E>: Send {
    /// Serialize one record.
    fn append(&mut self, entity: &E) -> FormatResult<()>;

    /// Push buffered records to the underlying stream.
    fn flush(&mut self) -> FormatResult<()>;

    /// Finish the stream and sync it to storage. Errors are not suppressed.
    fn close(self: Box<Self>) -> FormatResult<()>;
}

/// Forward-only iteration over records of type `E`.
pub trait RecordReader<E>: Send {
    /// The next record, or `None` at end of stream.
    fn next_record(&mut self) -> FormatResult<Option<E>>;
}

/// Factory for record writers and readers of one on-disk format.
pub trait RecordCodec<E>: fmt::Debug + Send + Sync {
    /// File extension (without dot) for data files in this format.
    fn extension(&self) -> &str;

    /// Start writing records conforming to `schema` to `out`.
    fn writer(
        &self,
        out: Box<dyn SyncWrite>,
        schema: &Schema,
        compression: Compression,
    ) -> FormatResult<Box<dyn RecordWriter<E>>>;

    /// Start reading records from `input`, projected onto `schema`.
    ///
    /// The data may have been written with a different but compatible schema.
    fn reader(
        &self,
        input: Box<dyn Read + Send>,
        schema: &Schema,
    ) -> FormatResult<Box<dyn RecordReader<E>>>;
}
