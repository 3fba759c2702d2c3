//! Content hashing and the shared on-disk cache.
//!
//! - [`ContentHasher`] / [`digest`] fingerprint a stage's declared inputs,
//!   memoizing per-file digests in an explicit [`FileHashCache`].
//! - [`CacheService`] owns the cache root and hands out entry directories under
//!   a cross-process [`CacheLock`].
//! - [`atomic_write`] publishes small files (such as chain digests) without
//!   exposing partial writes.

mod cache_dir;
mod error;
mod fingerprint;
mod hasher;
mod lock;
mod service;
mod util;

pub use cache_dir::{CacheConfig, CACHE_DIR_ENV_VAR};
pub use error::{CacheError, Result};
pub use fingerprint::Fingerprint;
pub use hasher::{digest, ContentHasher, FileHashCache, HashInput, ABSENT_SENTINEL};
pub use lock::{CacheLock, LockMode, LockPolicy};
pub use service::{CacheService, LOCK_FILE_NAME};
pub use util::{atomic_write, remove_file_best_effort, rename_replacing};
