use crate::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// How a tree lock is held. Syncs write and take it exclusively; any number
/// of verifications may read a tree at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Exclusive,
    Shared,
}

/// Advisory file lock over one mirror tree, released on drop.
#[derive(Debug)]
pub struct TreeLock {
    lock_file: File,
    mode: LockMode,
}

fn open_lock_file(lock_path: &Path) -> Result<File, StoreError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?)
}

impl TreeLock {
    /// Block until the lock is held in `mode`.
    pub fn acquire(lock_path: &Path, mode: LockMode) -> Result<Self, StoreError> {
        let file = open_lock_file(lock_path)?;
        let res = match mode {
            LockMode::Exclusive => FileExt::lock_exclusive(&file),
            LockMode::Shared => FileExt::lock_shared(&file),
        };
        res.map_err(|e| StoreError::LockFailed(format!("{}: {e}", lock_path.display())))?;
        Ok(Self {
            lock_file: file,
            mode,
        })
    }

    /// Take the lock if nobody holds a conflicting one, otherwise `None`.
    pub fn try_acquire(lock_path: &Path, mode: LockMode) -> Result<Option<Self>, StoreError> {
        let file = open_lock_file(lock_path)?;
        let res = match mode {
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            LockMode::Shared => FileExt::try_lock_shared(&file),
        };
        match res {
            Ok(()) => Ok(Some(Self {
                lock_file: file,
                mode,
            })),
            Err(_) => Ok(None),
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for TreeLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock_file);
    }
}
