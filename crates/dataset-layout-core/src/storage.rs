//! Storage capability used by writers, readers and the path codec.
//!
//! This module defines the narrow interface the rest of the crate needs from
//! a hierarchical store: open/create streams, atomic rename, existence
//! checks, deletion, directory creation and a same-volume test. Writers rely
//! on [`Storage::rename`] being atomic with respect to readers; that is what
//! makes the temp-then-rename commit safe.
//!
//! [`LocalStorage`] implements the capability on the local filesystem. Other
//! backends plug in by implementing [`Storage`] and are passed to
//! constructors explicitly; nothing in the crate looks a backend up globally.

mod local;

pub use local::LocalStorage;

use std::{
    error::Error,
    fmt,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use snafu::{Backtrace, IntoError, prelude::*};

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors produced by a storage backend implementation.
///
/// Backend-specific failures are wrapped here so [`StorageError`] can add the
/// path and a backtrace without knowing the backend.
#[derive(Debug)]
pub enum BackendError {
    /// A local filesystem I/O error.
    Local(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The specified path was not found.
    #[snafu(display("Path not found: {path}"))]
    NotFound {
        /// The path that was not found.
        path: String,
        /// Underlying backend error that caused the failure.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The path already exists and overwrite was not requested.
    #[snafu(display("Path already exists: {path}"))]
    AlreadyExists {
        /// The path that was found to already exist.
        path: String,
        /// Underlying backend error that indicates the existing resource.
        source: BackendError,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// Any other I/O failure.
    #[snafu(display("Local I/O error at {path}: {source}"))]
    OtherIo {
        /// The path where the I/O error occurred.
        path: String,
        /// Underlying backend I/O error with platform-specific details.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}

/// A writable stream that can be forced to durable storage.
pub trait SyncWrite: Write + Send {
    /// Flush buffers and sync file contents to the device.
    fn sync_all(&mut self) -> io::Result<()>;
}

/// Entry returned by [`Storage::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    /// Full path of the entry.
    pub path: PathBuf,
    /// True for directories.
    pub is_dir: bool,
}

/// Hierarchical storage capability.
///
/// Implementations must be safe for concurrent operations on independent
/// paths. No method retries; transient failures surface to the caller.
pub trait Storage: fmt::Debug + Send + Sync {
    /// Open an existing file for reading.
    fn open(&self, path: &Path) -> StorageResult<Box<dyn Read + Send>>;

    /// Create a file for writing, creating missing parent directories.
    ///
    /// With `overwrite == false` an existing file is an
    /// [`StorageError::AlreadyExists`] error; otherwise it is truncated.
    fn create(&self, path: &Path, overwrite: bool) -> StorageResult<Box<dyn SyncWrite>>;

    /// Atomically move `src` to `dst`.
    ///
    /// Returns `Ok(false)` when the rename was refused (missing source or
    /// existing destination) without an underlying I/O failure.
    fn rename(&self, src: &Path, dst: &Path) -> StorageResult<bool>;

    /// Move `src` to `dst`, replacing any existing file at `dst`.
    fn replace(&self, src: &Path, dst: &Path) -> StorageResult<()>;

    /// True if a file or directory exists at `path`.
    fn exists(&self, path: &Path) -> StorageResult<bool>;

    /// Remove `path`. Directories require `recursive` unless empty.
    ///
    /// Returns `Ok(false)` if nothing existed at `path`.
    fn delete(&self, path: &Path, recursive: bool) -> StorageResult<bool>;

    /// Create `path` and all missing parents. Returns `Ok(true)` if it exists afterwards.
    fn mkdirs(&self, path: &Path) -> StorageResult<bool>;

    /// List the direct children of directory `path`, sorted by path.
    fn list(&self, path: &Path) -> StorageResult<Vec<FileStatus>>;

    /// True if `a` and `b` live on the same volume, so a rename between
    /// them can be atomic.
    fn same_volume(&self, a: &Path, b: &Path) -> bool;
}

/// Map an `io::Error` on `path` into the matching [`StorageError`] variant.
pub(crate) fn classify_io(path: &Path, e: io::Error) -> StorageError {
    let path = path.display().to_string();
    match e.kind() {
        io::ErrorKind::NotFound => {
            NotFoundSnafu { path }.into_error(BackendError::Local(e))
        }
        io::ErrorKind::AlreadyExists => {
            AlreadyExistsSnafu { path }.into_error(BackendError::Local(e))
        }
        _ => OtherIoSnafu { path }.into_error(BackendError::Local(e)),
    }
}

/// Sibling temp path used for the temp-then-rename commit: `<dir>/.<name>.tmp`.
///
/// Returns `None` when `path` has no file name.
pub fn temp_path_for(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(".tmp");
    Some(path.with_file_name(tmp_name))
}

/// Removes a temporary file on drop unless disarmed.
pub(crate) struct TempFileGuard<'a> {
    storage: &'a dyn Storage,
    path: PathBuf,
    armed: bool,
}

impl<'a> TempFileGuard<'a> {
    pub(crate) fn new(storage: &'a dyn Storage, path: PathBuf) -> Self {
        Self {
            storage,
            path,
            armed: true,
        }
    }

    /// Call after a successful rename.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            // Best-effort; the caller is already reporting another error.
            let _ = self.storage.delete(&self.path, false);
        }
    }
}

/// Write `contents` to `path` through a synced sibling temp file and a rename.
///
/// An existing file at `path` is replaced. The temp file is removed if any
/// step fails.
pub fn write_atomic(storage: &dyn Storage, path: &Path, contents: &[u8]) -> StorageResult<()> {
    let Some(tmp_path) = temp_path_for(path) else {
        return Err(classify_io(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
        ));
    };
    let mut guard = TempFileGuard::new(storage, tmp_path.clone());

    {
        let mut out = storage.create(&tmp_path, true)?;
        out.write_all(contents)
            .and_then(|()| out.sync_all())
            .map_err(|e| classify_io(&tmp_path, e))?;
    }

    storage.replace(&tmp_path, path)?;

    // Renamed into place; nothing left to clean up.
    guard.disarm();

    Ok(())
}
