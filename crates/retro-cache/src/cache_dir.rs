use crate::error::CacheError;
use std::path::PathBuf;

/// Environment variable that overrides the shared cache root.
pub const CACHE_DIR_ENV_VAR: &str = "RETRO_CACHE_DIR";

/// Configuration for selecting the on-disk cache root.
#[derive(Clone, Debug, Default)]
pub struct CacheConfig {
    /// Override the global cache directory.
    pub cache_root_override: Option<PathBuf>,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            cache_root_override: std::env::var_os(CACHE_DIR_ENV_VAR)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Resolve the effective root: the override if set, else `~/.retro/cache`.
    pub fn resolve_root(&self) -> Result<PathBuf, CacheError> {
        match &self.cache_root_override {
            Some(root) => Ok(root.clone()),
            None => default_cache_root(),
        }
    }
}

pub(crate) fn default_cache_root() -> Result<PathBuf, CacheError> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or(CacheError::MissingHomeDir)?;

    Ok(home.join(".retro").join("cache"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins() {
        let config = CacheConfig {
            cache_root_override: Some(PathBuf::from("/tmp/retro-cache")),
        };
        assert_eq!(
            config.resolve_root().unwrap(),
            PathBuf::from("/tmp/retro-cache")
        );
    }
}
