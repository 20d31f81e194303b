//! File locking and atomic replacement for checkpoint files
//!
//! Uses `fs2` advisory locks on a sidecar `.lock` file so that two
//! orchestrator processes (or threads) cannot advance the same task at once.
//! Advisory locks are cooperative: every writer goes through [`TaskLock`].

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::BridgeError;

/// Exclusive hold on one task's lock file. Released on drop.
#[derive(Debug)]
pub struct TaskLock {
    file: File,
    path: PathBuf,
}

impl TaskLock {
    /// Try to take the lock without waiting. A lock already held elsewhere
    /// yields [`BridgeError::TaskLocked`].
    pub fn try_acquire(path: &Path, task_id: &str) -> Result<Self, BridgeError> {
        #[allow(clippy::suspicious_open_options)]
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| BridgeError::storage(path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                file,
                path: path.to_path_buf(),
            }),
            Err(e) if e.kind() == ErrorKind::WouldBlock || is_contended(&e) => {
                Err(BridgeError::TaskLocked(task_id.to_string()))
            }
            Err(e) => Err(BridgeError::storage(path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TaskLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock as well
        let _ = FileExt::unlock(&self.file);
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Replace `path` with `content` atomically: write a temporary file in the
/// same directory, flush it to disk, then rename it over the target.
pub fn atomic_write(path: &Path, content: &str) -> Result<(), BridgeError> {
    let mut temp = temp_beside(path)?;
    write_synced(&mut temp, path, content)?;
    temp.persist(path)
        .map_err(|e| BridgeError::storage(path, e.error))?;
    Ok(())
}

/// Like [`atomic_write`] but fails if `path` already exists.
pub fn atomic_create(path: &Path, content: &str) -> Result<(), BridgeError> {
    let mut temp = temp_beside(path)?;
    write_synced(&mut temp, path, content)?;
    temp.persist_noclobber(path)
        .map_err(|e| BridgeError::storage(path, e.error))?;
    Ok(())
}

fn temp_beside(path: &Path) -> Result<NamedTempFile, BridgeError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    NamedTempFile::new_in(dir).map_err(|e| BridgeError::storage(dir, e))
}

fn write_synced(temp: &mut NamedTempFile, path: &Path, content: &str) -> Result<(), BridgeError> {
    temp.write_all(content.as_bytes())
        .and_then(|_| temp.flush())
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| BridgeError::storage(path, e))
}
