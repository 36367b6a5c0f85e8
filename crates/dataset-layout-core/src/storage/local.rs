//! Local filesystem backend.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufReader, Read, Write},
    path::{Path, PathBuf},
};

use log::warn;

use crate::storage::{FileStatus, Storage, StorageResult, SyncWrite, classify_io};

/// [`Storage`] over `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl LocalStorage {
    /// Create a local storage handle.
    pub fn new() -> Self {
        LocalStorage
    }
}

struct LocalFile {
    file: File,
}

impl Write for LocalFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl SyncWrite for LocalFile {
    fn sync_all(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }
}

fn create_parent_dir(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| classify_io(parent, e))?;
        }
    }
    Ok(())
}

/// URI-style paths with a scheme other than `file` belong to another backend.
fn foreign_scheme(path: &Path) -> bool {
    let Some(s) = path.to_str() else {
        return false;
    };
    match s.split_once("://") {
        Some((scheme, _)) => {
            !scheme.eq_ignore_ascii_case("file")
                && !scheme.is_empty()
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
        }
        None => false,
    }
}

fn strip_file_scheme(path: &Path) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_prefix("file://")) {
        Some(rest) => PathBuf::from(rest),
        None => path.to_path_buf(),
    }
}

/// Closest ancestor of `path` (inclusive) that exists on disk.
fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    let abs = std::path::absolute(strip_file_scheme(path)).ok()?;
    abs.ancestors().find(|p| p.exists()).map(Path::to_path_buf)
}

#[cfg(unix)]
fn volume_id(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).ok().map(|m| m.dev())
}

#[cfg(not(unix))]
fn volume_id(path: &Path) -> Option<u64> {
    use std::hash::{DefaultHasher, Hash, Hasher};
    let root = path.components().next()?;
    let mut h = DefaultHasher::new();
    root.hash(&mut h);
    Some(h.finish())
}

impl Storage for LocalStorage {
    fn open(&self, path: &Path) -> StorageResult<Box<dyn Read + Send>> {
        let file = File::open(path).map_err(|e| classify_io(path, e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn create(&self, path: &Path, overwrite: bool) -> StorageResult<Box<dyn SyncWrite>> {
        create_parent_dir(path)?;
        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options.open(path).map_err(|e| classify_io(path, e))?;
        Ok(Box::new(LocalFile { file }))
    }

    /// Link `src` at `dst`, then unlink `src`.
    ///
    /// Linking fails with `AlreadyExists` when `dst` is taken, so a concurrent
    /// writer can never be clobbered. Only regular files can be renamed.
    fn rename(&self, src: &Path, dst: &Path) -> StorageResult<bool> {
        create_parent_dir(dst)?;
        match fs::hard_link(src, dst) {
            Ok(()) => {}
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::AlreadyExists | io::ErrorKind::NotFound
                ) =>
            {
                return Ok(false);
            }
            Err(e) => return Err(classify_io(dst, e)),
        }
        // dst is committed at this point; a leftover src is only a stray temp file.
        if let Err(e) = fs::remove_file(src) {
            warn!(
                "renamed {} to {} but could not unlink the source: {e}",
                src.display(),
                dst.display()
            );
        }
        Ok(true)
    }

    fn replace(&self, src: &Path, dst: &Path) -> StorageResult<()> {
        create_parent_dir(dst)?;
        fs::rename(src, dst).map_err(|e| classify_io(dst, e))
    }

    fn exists(&self, path: &Path) -> StorageResult<bool> {
        path.try_exists().map_err(|e| classify_io(path, e))
    }

    fn delete(&self, path: &Path, recursive: bool) -> StorageResult<bool> {
        let meta = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(classify_io(path, e)),
        };
        let result = if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(path)
            } else {
                fs::remove_dir(path)
            }
        } else {
            fs::remove_file(path)
        };
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(classify_io(path, e)),
        }
    }

    fn mkdirs(&self, path: &Path) -> StorageResult<bool> {
        fs::create_dir_all(path).map_err(|e| classify_io(path, e))?;
        Ok(path.is_dir())
    }

    fn list(&self, path: &Path) -> StorageResult<Vec<FileStatus>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(path).map_err(|e| classify_io(path, e))? {
            let entry = entry.map_err(|e| classify_io(path, e))?;
            let is_dir = entry
                .file_type()
                .map_err(|e| classify_io(&entry.path(), e))?
                .is_dir();
            out.push(FileStatus {
                path: entry.path(),
                is_dir,
            });
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    fn same_volume(&self, a: &Path, b: &Path) -> bool {
        if foreign_scheme(a) || foreign_scheme(b) {
            return false;
        }
        let (Some(a), Some(b)) = (existing_ancestor(a), existing_ancestor(b)) else {
            return false;
        };
        match (volume_id(&a), volume_id(&b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }
}
