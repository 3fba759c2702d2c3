use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Cache(#[from] retro_cache::CacheError),

    #[error(transparent)]
    Config(#[from] retro_config::ConfigError),

    #[error(transparent)]
    Mapping(#[from] retro_mappings::MappingError),

    #[error(transparent)]
    Patch(#[from] retro_patch::PatchError),

    #[error(transparent)]
    Remap(#[from] retro_remap::RemapError),

    /// The tool could not be started, exited non-zero or timed out. Carries
    /// the command line and its captured output.
    #[error(transparent)]
    Tool(#[from] retro_process::RunToolError),

    #[error("failed to process artifact {path}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stage `{stage}` finished without writing {path}")]
    MissingOutput { stage: String, path: PathBuf },

    #[error("missing configuration value `{0}`")]
    MissingConfig(&'static str),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap an artifact error, keeping its whole context chain.
    pub(crate) fn archive(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::Archive {
            path: path.to_path_buf(),
            message: format!("{err:#}"),
        }
    }
}
