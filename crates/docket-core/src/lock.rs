//! Advisory file locking for the engine's critical sections.
//!
//! One exclusive lock guards identifier allocation and the two-phase commit;
//! nothing else needs to be atomic. Acquisition polls with a short timeout
//! and fails fast rather than deadlocking.

use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// Errors from lock acquisition.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock was held by another process for the whole timeout window.
    #[error("lock timed out after {waited:?} at {}", .path.display())]
    Timeout { path: PathBuf, waited: Duration },

    /// Creating or opening the lock file failed.
    #[error("lock I/O error: {0}")]
    Io(#[from] io::Error),
}

/// RAII guard for the engine-wide exclusive lock. Released on drop.
#[derive(Debug)]
pub struct EngineLock {
    file: File,
    path: PathBuf,
}

impl EngineLock {
    /// Acquire the exclusive advisory lock at `path`, polling every 10ms
    /// until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`LockError::Timeout`] if another holder outlasts the window,
    /// [`LockError::Io`] if the lock file cannot be opened.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "lock path has no parent")
        })?;
        fs::create_dir_all(parent)?;

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)?;

            if file.try_lock_exclusive().is_ok() {
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Explicitly release the lock. Release also happens automatically on
    /// drop.
    pub fn release(self) {
        let _ = self.file.unlock();
    }

    /// Return the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EngineLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineLock, LockError};
    use std::{
        sync::{Arc, Barrier},
        thread,
        time::Duration,
    };
    use tempfile::TempDir;

    #[test]
    fn acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock");
        let lock = EngineLock::acquire(&path, Duration::from_millis(50)).unwrap();
        assert_eq!(lock.path(), path.as_path());
        lock.release();
    }

    #[test]
    fn times_out_when_held() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock");
        let _guard = EngineLock::acquire(&path, Duration::from_millis(50)).unwrap();

        let err = EngineLock::acquire(&path, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, LockError::Timeout { path: p, .. } if p == path));
    }

    #[test]
    fn drop_releases_for_follow_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock");
        {
            let _first = EngineLock::acquire(&path, Duration::from_millis(50)).unwrap();
        }
        let _second = EngineLock::acquire(&path, Duration::from_millis(50)).unwrap();
    }

    #[test]
    fn contention_resolves_after_holder_releases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock");

        let held = Arc::new(Barrier::new(2));
        let done = Arc::new(Barrier::new(2));

        let held_in_thread = Arc::clone(&held);
        let done_in_thread = Arc::clone(&done);
        let path_in_thread = path.clone();
        let handle = thread::spawn(move || {
            let _writer =
                EngineLock::acquire(&path_in_thread, Duration::from_millis(200)).unwrap();
            held_in_thread.wait();
            done_in_thread.wait();
        });

        held.wait();
        assert!(matches!(
            EngineLock::acquire(&path, Duration::from_millis(20)),
            Err(LockError::Timeout { .. })
        ));
        done.wait();
        handle.join().unwrap();

        let follow_up = EngineLock::acquire(&path, Duration::from_millis(100)).unwrap();
        follow_up.release();
    }
}
