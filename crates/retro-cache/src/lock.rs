use crate::error::CacheError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    /// Many readers may hold the lock at once.
    Shared,
    /// A single writer holds the lock.
    Exclusive,
}

/// Retry policy used while a lock is contended.
#[derive(Clone, Debug)]
pub struct LockPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Log a warning once this many retries have happened.
    pub warn_after: u32,
    /// Give up after waiting this long. `None` retries forever.
    pub timeout: Option<Duration>,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            warn_after: 5,
            timeout: None,
        }
    }
}

/// An advisory lock on a file that is safe to share across multiple processes.
///
/// Each guard opens its own handle to the lock file, so threads in one process
/// contend with each other exactly like separate processes do. The lock is
/// released when the guard is dropped.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl CacheLock {
    /// Acquire a shared lock on `path`, creating the lockfile if needed.
    pub fn lock_shared(path: &Path) -> Result<Self, CacheError> {
        Self::acquire(path, LockMode::Shared, &LockPolicy::default())
    }

    /// Acquire an exclusive lock on `path`, creating the lockfile if needed.
    pub fn lock_exclusive(path: &Path) -> Result<Self, CacheError> {
        Self::acquire(path, LockMode::Exclusive, &LockPolicy::default())
    }

    /// Acquire the lock, retrying with exponential backoff while it is held
    /// elsewhere.
    pub fn acquire(path: &Path, mode: LockMode, policy: &LockPolicy) -> Result<Self, CacheError> {
        let start = Instant::now();
        let mut delay = policy.initial_delay;
        let mut retries = 0u32;

        loop {
            if let Some(lock) = Self::try_acquire(path, mode)? {
                if retries > 0 {
                    tracing::debug!(
                        target = "retro.cache",
                        path = %path.display(),
                        ?mode,
                        retries,
                        waited_ms = start.elapsed().as_millis() as u64,
                        "acquired contended cache lock"
                    );
                }
                return Ok(lock);
            }

            let waited = start.elapsed();
            if let Some(timeout) = policy.timeout {
                if waited >= timeout {
                    return Err(CacheError::LockTimeout {
                        path: path.to_path_buf(),
                        waited,
                    });
                }
            }

            retries += 1;
            if retries == policy.warn_after {
                tracing::warn!(
                    target = "retro.cache",
                    path = %path.display(),
                    ?mode,
                    waited_ms = waited.as_millis() as u64,
                    "still waiting for cache lock; another build may be using the cache"
                );
            }

            std::thread::sleep(delay);
            if delay < policy.max_delay {
                delay = (delay * 2).min(policy.max_delay);
            }
        }
    }

    /// Try to take the lock once. Returns `Ok(None)` if it is held elsewhere.
    pub fn try_acquire(path: &Path, mode: LockMode) -> Result<Option<Self>, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        let result = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
        };

        match result {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
                mode,
            })),
            Err(err) if is_contended(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
