use crate::error::ErrorCode;
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// Advisory lock errors for the data folder.
#[derive(Debug)]
pub enum LockError {
    Timeout { path: PathBuf, waited: Duration },
    IoError(io::Error),
}

impl From<io::Error> for LockError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::IoError(_) => ErrorCode::StorageIo,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { path, waited } => {
                write!(
                    f,
                    "{}: lock timed out after {:?} at {}",
                    self.code().code(),
                    waited,
                    path.display()
                )
            }
            Self::IoError(err) => write!(f, "{}: {}", self.code().code(), err),
        }
    }
}

impl std::error::Error for LockError {}

/// RAII guard serializing reconciliation passes across processes.
///
/// The in-process side of the same rule is the store's import mutex; this
/// lock covers a cron import racing a manual `tstats import`.
#[derive(Debug)]
pub struct ImportLock {
    file: File,
    path: PathBuf,
}

impl ImportLock {
    /// Acquire an exclusive advisory lock on `path`, polling until `timeout`.
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

            if FileExt::try_lock_exclusive(&file).is_ok() {
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

    /// Explicitly release the lock. Release also happens automatically on drop.
    pub fn release(self) {
        drop(self);
    }

    /// Return the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ImportLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::{ImportLock, LockError};
    use crate::error::ErrorCode;
    use std::{
        sync::{Arc, Barrier},
        thread,
        time::Duration,
    };
    use tempfile::TempDir;

    #[test]
    fn import_lock_allows_acquire_and_release() -> Result<(), LockError> {
        let dir = TempDir::new()?;
        let path = dir.path().join(".import.lock");
        let lock = ImportLock::acquire(&path, Duration::from_millis(50))?;
        assert_eq!(lock.path(), path.as_path());
        lock.release();
        Ok(())
    }

    #[test]
    fn import_lock_times_out_when_held() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join(".import.lock");
        let _guard = ImportLock::acquire(&path, Duration::from_millis(50)).expect("first lock");
        let err = ImportLock::acquire(&path, Duration::from_millis(20)).expect_err("held");

        assert!(matches!(err, LockError::Timeout { path: p, .. } if p == path));
    }

    #[test]
    fn lock_error_maps_to_machine_code() {
        let timeout = LockError::Timeout {
            path: "data/.import.lock".into(),
            waited: Duration::from_millis(10),
        };
        assert_eq!(timeout.code(), ErrorCode::LockContention);
        assert!(timeout.hint().is_some());
    }

    #[test]
    fn contention_is_resolved_after_holder_releases() -> Result<(), LockError> {
        let dir = TempDir::new()?;
        let path = dir.path().join(".import.lock");

        let held = Arc::new(Barrier::new(2));
        let done = Arc::new(Barrier::new(2));

        let held_thread = Arc::clone(&held);
        let done_thread = Arc::clone(&done);
        let path_in_thread = path.clone();
        let handle = thread::spawn(move || {
            let _writer = ImportLock::acquire(&path_in_thread, Duration::from_millis(200))
                .expect("thread lock");
            held_thread.wait();
            done_thread.wait();
        });

        held.wait();
        assert!(matches!(
            ImportLock::acquire(&path, Duration::from_millis(20)),
            Err(LockError::Timeout { .. })
        ));
        done.wait();
        handle.join().expect("lock thread");

        let follow_up = ImportLock::acquire(&path, Duration::from_millis(50))?;
        follow_up.release();
        Ok(())
    }
}
