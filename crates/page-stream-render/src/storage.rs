//! Storage medium behind a page cache file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const DEFAULT_MAX_CACHE_FILE_BYTES: u64 = 64 * 1024 * 1024;

/// File-level operations a [`crate::PageStore`] needs from its medium.
///
/// A storage value is bound to one cache path. Every handle it returns is
/// owned by a single store call and dropped (closed) before that call returns.
pub trait CacheStorage {
    type File: Read + Write + Seek;

    /// Create or truncate the cache file for reading and writing.
    fn create(&self) -> io::Result<Self::File>;

    /// Open the existing cache file read-only.
    fn open_read(&self) -> io::Result<Self::File>;

    /// Open the existing cache file for reading and in-place writing.
    fn open_write(&self) -> io::Result<Self::File>;

    fn exists(&self) -> bool;

    /// Remove the cache file. A missing file is not an error.
    fn remove(&self) -> io::Result<()>;
}

/// Filesystem-backed cache storage.
///
/// Writes that would grow the file past `max_file_bytes` fail with
/// `InvalidData`, which the build treats as an I/O failure.
#[derive(Clone, Debug)]
pub struct FsStorage {
    path: PathBuf,
    max_file_bytes: u64,
}

impl FsStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_file_bytes: DEFAULT_MAX_CACHE_FILE_BYTES,
        }
    }

    /// Set the maximum allowed cache file size in bytes.
    ///
    /// Values of `0` are treated as `1` to keep the cap explicit.
    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    fn capped(&self, file: File) -> CappedFile {
        CappedFile {
            inner: file,
            max_bytes: self.max_file_bytes,
            position: 0,
        }
    }
}

impl CacheStorage for FsStorage {
    type File = CappedFile;

    fn create(&self) -> io::Result<CappedFile> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        Ok(self.capped(file))
    }

    fn open_read(&self) -> io::Result<CappedFile> {
        File::open(&self.path).map(|file| self.capped(file))
    }

    fn open_write(&self) -> io::Result<CappedFile> {
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        Ok(self.capped(file))
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// File handle that refuses writes past a byte cap.
#[derive(Debug)]
pub struct CappedFile {
    inner: File,
    max_bytes: u64,
    position: u64,
}

impl Read for CappedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.position = self.position.saturating_add(read as u64);
        Ok(read)
    }
}

impl Write for CappedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let end = self.position.saturating_add(buf.len() as u64);
        if end > self.max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "cache file exceeds max_file_bytes",
            ));
        }
        let written = self.inner.write(buf)?;
        self.position = self.position.saturating_add(written as u64);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for CappedFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.inner.seek(pos)?;
        Ok(self.position)
    }
}

/// Remove a file, ignoring failures.
pub(crate) fn remove_quiet<S: CacheStorage + ?Sized>(storage: &S) {
    if let Err(err) = storage.remove() {
        log::warn!("failed to remove cache file: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NONCE: AtomicUsize = AtomicUsize::new(0);

    fn temp_path(label: &str) -> PathBuf {
        let nonce = NONCE.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir()
            .join(format!(
                "page-stream-{}-{}-{}",
                label,
                std::process::id(),
                nonce
            ))
            .join("cache.bin")
    }

    #[test]
    fn create_makes_parent_dirs_and_remove_tolerates_missing() {
        let path = temp_path("storage-create");
        let storage = FsStorage::new(&path);
        assert!(!storage.exists());
        storage.remove().expect("missing file removal should succeed");
        let mut file = storage.create().expect("create should succeed");
        file.write_all(b"abc").expect("write should succeed");
        drop(file);
        assert!(storage.exists());
        storage.remove().expect("remove should succeed");
        assert!(!storage.exists());
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn writes_past_cap_fail_after_seek() {
        let path = temp_path("storage-cap");
        let storage = FsStorage::new(&path).with_max_file_bytes(8);
        let mut file = storage.create().expect("create should succeed");
        file.write_all(b"12345678").expect("write up to cap should succeed");
        let err = file
            .write_all(b"9")
            .expect_err("write past cap should fail");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        file.seek(SeekFrom::Start(2)).expect("seek should succeed");
        file.write_all(b"xy").expect("in-place patch should succeed");
        drop(file);
        let bytes = fs::read(&path).expect("read back should succeed");
        assert_eq!(bytes, b"12xy5678");
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }
}
