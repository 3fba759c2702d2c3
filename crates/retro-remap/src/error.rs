use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RemapError {
    #[error(transparent)]
    Mapping(#[from] retro_mappings::MappingError),

    #[error("{path}:{line}: {message}")]
    Table {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A generic suffix had nowhere to go on its declaration line.
    #[error("{file}:{line}: cannot apply generic `{suffix}` to parameter {param}: |{text}|")]
    GenericBoundary {
        file: String,
        line: usize,
        param: String,
        suffix: String,
        text: String,
    },
}
