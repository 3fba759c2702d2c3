use crate::cache_dir::CacheConfig;
use crate::error::CacheError;
use crate::lock::{CacheLock, LockMode, LockPolicy};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Name of the advisory lock file at the cache root.
pub const LOCK_FILE_NAME: &str = "retro.lock";

/// Process-shared cache of extracted tool and mapping data.
///
/// Entries live at `<root>/<namespace>/<key>/` and are immutable once
/// published. All writes happen under the exclusive lock and become visible
/// through a single directory rename.
#[derive(Clone, Debug)]
pub struct CacheService {
    root: PathBuf,
    policy: LockPolicy,
}

impl CacheService {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            policy: LockPolicy::default(),
        })
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::new(config.resolve_root()?)
    }

    #[must_use]
    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    /// Acquire the cache-wide lock in `mode`, waiting with backoff.
    pub fn lock(&self, mode: LockMode) -> Result<CacheLock, CacheError> {
        CacheLock::acquire(&self.lock_path(), mode, &self.policy)
    }

    /// Location of an entry, whether or not it has been populated.
    pub fn entry_path(&self, namespace: &str, key: &str) -> Result<PathBuf, CacheError> {
        validate_name(namespace)?;
        validate_name(key)?;
        Ok(self.root.join(namespace).join(key))
    }

    /// Return the entry directory, populating it first if needed.
    ///
    /// `populate` receives an empty temporary directory next to the final
    /// location. It runs at most once across all processes sharing this cache
    /// root; if it fails, the temporary directory is discarded and nothing is
    /// published.
    pub fn access_entry<E>(
        &self,
        namespace: &str,
        key: &str,
        populate: impl FnOnce(&Path) -> Result<(), E>,
    ) -> Result<PathBuf, E>
    where
        E: From<CacheError>,
    {
        let target = self.entry_path(namespace, key)?;

        {
            let _shared = self.lock(LockMode::Shared)?;
            if target.is_dir() {
                return Ok(target);
            }
        }

        let _exclusive = self.lock(LockMode::Exclusive)?;
        if target.is_dir() {
            tracing::debug!(
                target = "retro.cache",
                entry = %target.display(),
                "cache entry was populated by another process"
            );
            return Ok(target);
        }

        let parent = self.root.join(namespace);
        std::fs::create_dir_all(&parent).map_err(CacheError::from)?;
        let staging = tempfile::Builder::new()
            .prefix(".retro-dl-")
            .tempdir_in(&parent)
            .map_err(CacheError::from)?;

        let start = Instant::now();
        populate(staging.path())?;

        std::fs::rename(staging.path(), &target).map_err(CacheError::from)?;
        // `staging` now points at a path that no longer exists; dropping it is a no-op.
        drop(staging);

        tracing::info!(
            target = "retro.cache",
            entry = %target.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "populated cache entry"
        );
        Ok(target)
    }

    /// Return a directory holding the extracted contents of `archives`.
    ///
    /// Archives are extracted in order (later entries overwrite earlier ones),
    /// then `prepare` may post-process the extracted tree before it is published.
    pub fn access_extracted_archive(
        &self,
        namespace: &str,
        key: &str,
        archives: &[PathBuf],
        prepare: impl FnOnce(&Path) -> Result<(), CacheError>,
    ) -> Result<PathBuf, CacheError> {
        self.access_entry(namespace, key, |dir| {
            for archive in archives {
                retro_archive::Archive::new(archive)
                    .extract_to(dir)
                    .map_err(|err| CacheError::Archive {
                        path: archive.clone(),
                        message: format!("{err:#}"),
                    })?;
            }
            prepare(dir)
        })
    }
}

fn validate_name(name: &str) -> Result<(), CacheError> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', ':'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(CacheError::InvalidEntryName {
            name: name.to_owned(),
        });
    }
    Ok(())
}
