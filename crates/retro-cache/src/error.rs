use std::path::PathBuf;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced by hashing, locking and cache population.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to determine home directory for default cache path")]
    MissingHomeDir,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// A declared hash input does not exist or cannot be read.
    #[error("failed to read hash input {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {waited:?} waiting for cache lock {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("invalid cache entry name {name:?}")]
    InvalidEntryName { name: String },

    #[error("failed to extract {path}: {message}")]
    Archive { path: PathBuf, message: String },
}
