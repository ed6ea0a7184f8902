//! Cross-process lock around interface slot allocation
//!
//! Scanning for a free slot and writing its name mapping is a
//! read-modify-write over state shared by every wirelift process. The
//! allocation lock serializes that sequence.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// An exclusive advisory lock held until dropped
pub struct AllocationLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

impl AllocationLock {
    /// Acquire the lock, waiting for other holders to release it
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let (path, file) = Self::open(path.as_ref())?;
        file.lock_exclusive()
            .map_err(|e| Error::Lock(format!("failed to lock {}: {}", path.display(), e)))?;
        Self::locked(path, file)
    }

    /// Acquire the lock only if nobody else holds it
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Self> {
        let (path, file) = Self::open(path.as_ref())?;
        file.try_lock_exclusive().map_err(|_| {
            Error::Lock(format!("{} is held by another process", path.display()))
        })?;
        Self::locked(path, file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> Result<(PathBuf, File)> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Do not truncate before the lock is held
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok((path.to_path_buf(), file))
    }

    fn locked(path: PathBuf, mut file: File) -> Result<Self> {
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", std::process::id())?;

        log::debug!("Acquired allocation lock: {}", path.display());
        Ok(Self { path, file })
    }
}

impl Drop for AllocationLock {
    fn drop(&mut self) {
        // Closing the file releases the lock. The file itself stays so that
        // no other process can lock an about-to-be-unlinked inode.
        log::debug!("Released allocation lock: {}", self.path.display());
    }
}
