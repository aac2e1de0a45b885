//! Exclusive lock files for serializing sessions that share a cache directory.
//!
//! The lock is taken by creating the lock file exclusively. If the file is already
//! present the attempt fails immediately instead of waiting.

use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use crate::error::{LockError, LockResult};

/// A held lock file. The file is removed on [`FileLock::release`] or on drop.
#[derive(Debug)]
pub struct FileLock {
    file: Option<File>,
    path: PathBuf,
}

impl FileLock {
    /// Creates `path` exclusively.
    ///
    /// # Errors
    ///
    /// * [`LockError::AlreadyLocked`] if the lock file exists.
    /// * [`LockError::AcquireFailed`] if the file cannot be created.
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> LockResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(LockError::AlreadyLocked { path });
            }
            Err(err) => {
                return Err(LockError::AcquireFailed { path, source: err });
            }
        };

        // The pid is informational only.
        let _ = writeln!(file, "{}", std::process::id());

        Ok(FileLock {
            file: Some(file),
            path,
        })
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes and removes the lock file.
    pub fn release(mut self) -> LockResult<()> {
        self.file.take();
        fs::remove_file(&self.path).map_err(|err| {
            LockError::ReleaseFailed {
                path: self.path.clone(),
                source: err,
            }
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_second_acquire_fails_immediately() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("session.lock");

        let lock1 = FileLock::try_acquire(&lock_path).unwrap();
        let lock2 = FileLock::try_acquire(&lock_path);
        assert!(matches!(lock2, Err(LockError::AlreadyLocked { .. })));

        drop(lock1);
        assert!(!lock_path.exists());
        assert!(FileLock::try_acquire(&lock_path).is_ok());
    }

    #[test]
    fn test_release_removes_file() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("session.lock");

        let lock = FileLock::try_acquire(&lock_path).unwrap();
        assert_eq!(lock.path(), lock_path);
        assert!(lock_path.exists());

        lock.release().unwrap();
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_acquire_in_missing_directory() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("missing").join("session.lock");
        assert!(matches!(
            FileLock::try_acquire(&lock_path),
            Err(LockError::AcquireFailed { .. })
        ));
    }

    #[test]
    fn test_locks_on_different_paths() {
        let dir = tempdir().unwrap();
        let lock1 = FileLock::try_acquire(dir.path().join("a.lock")).unwrap();
        let lock2 = FileLock::try_acquire(dir.path().join("b.lock")).unwrap();
        assert_ne!(lock1.path(), lock2.path());
    }
}
