//! File-based document backend for persistent storage.

use crate::backend::DocumentBackend;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Suffix of the advisory lock file next to the document.
const LOCK_SUFFIX: &str = "lock";
/// Suffix of the temporary file used for atomic replacement.
const TEMP_SUFFIX: &str = "tmp";

/// A single-file document backend.
///
/// The document lives at `path`. Two sidecar files sit next to it:
///
/// ```text
/// <dir>/
/// ├─ store.json        # The document
/// ├─ store.json.lock   # Advisory lock for single-owner access
/// └─ store.json.tmp    # Transient, only during a write
/// ```
///
/// # Durability
///
/// Every write goes to the temp file, is synced, renamed over the
/// document, and the parent directory is synced. A crash mid-write leaves
/// the previous document intact.
///
/// # Example
///
/// ```no_run
/// use shelfdb_storage::{DocumentBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("store.json")).unwrap();
/// backend.write_document(b"{}").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    temp_path: PathBuf,
    /// Held for exclusive access; released on drop.
    _lock_file: File,
}

impl FileBackend {
    /// Opens a file backend at `path`, acquiring its lock.
    ///
    /// The document itself is not created until the first write.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another handle owns the store,
    /// or an I/O error if the lock file cannot be created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if path.file_name().is_none() {
            return Err(StorageError::InvalidPath(path.display().to_string()));
        }

        let lock_path = sidecar(path, LOCK_SUFFIX);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: lock_path.display().to_string(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            temp_path: sidecar(path, TEMP_SUFFIX),
            _lock_file: lock_file,
        })
    }

    /// Opens a file backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the lock
    /// cannot be acquired.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Self::open(path)
    }

    /// Returns the path to the document file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn sync_parent(&self) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_parent(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl DocumentBackend for FileBackend {
    fn read_document(&self) -> StorageResult<Option<Vec<u8>>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(Some(data))
    }

    fn write_document(&mut self, data: &[u8]) -> StorageResult<()> {
        let mut temp = File::create(&self.temp_path)?;
        temp.write_all(data)?;
        temp.sync_all()?;
        drop(temp);

        fs::rename(&self.temp_path, &self.path)?;
        self.sync_parent()
    }

    fn size(&self) -> StorageResult<u64> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

/// Builds `<path>.<suffix>` without replacing the existing extension.
fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_document_reads_none() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("store.json")).unwrap();

        assert!(backend.read_document().unwrap().is_none());
        assert_eq!(backend.size().unwrap(), 0);
    }

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("store.json")).unwrap();

        backend.write_document(b"{\"g1\":{}}").unwrap();
        assert_eq!(backend.read_document().unwrap(), Some(b"{\"g1\":{}}".to_vec()));
        assert_eq!(backend.size().unwrap(), 9);
    }

    #[test]
    fn write_replaces_whole_document() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("store.json")).unwrap();

        backend.write_document(b"a much longer first document").unwrap();
        backend.write_document(b"short").unwrap();

        assert_eq!(backend.read_document().unwrap(), Some(b"short".to_vec()));
        assert!(!dir.path().join("store.json.tmp").exists());
    }

    #[test]
    fn document_persists_across_handles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.write_document(b"persistent").unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_document().unwrap(), Some(b"persistent".to_vec()));
    }

    #[test]
    fn second_handle_is_locked_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let _first = FileBackend::open(&path).unwrap();
        let second = FileBackend::open(&path);

        assert!(matches!(second, Err(StorageError::Locked { .. })));
    }

    #[test]
    fn create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("store.json");

        let mut backend = FileBackend::open_with_create_dirs(&path).unwrap();
        backend.write_document(b"{}").unwrap();

        assert!(path.exists());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn sidecar_keeps_extension() {
        let path = Path::new("/data/store.json");
        assert_eq!(sidecar(path, "lock"), PathBuf::from("/data/store.json.lock"));
    }
}
