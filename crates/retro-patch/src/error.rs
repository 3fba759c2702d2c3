use std::path::PathBuf;

use crate::report::PatchReport;

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read patch bundle {path}: {message}")]
    Bundle { path: PathBuf, message: String },

    #[error("{name}:{line}: {message}")]
    Parse {
        name: String,
        line: usize,
        message: String,
    },

    /// At least one target could not be patched. Every report of the failed
    /// invocation is kept so callers can write a log before bailing out.
    #[error("patch for {target} rejected: {message}")]
    Rejected {
        target: String,
        message: String,
        reports: Vec<PatchReport>,
    },
}

impl PatchError {
    /// Reports carried by a [`PatchError::Rejected`].
    pub fn reports(&self) -> &[PatchReport] {
        match self {
            PatchError::Rejected { reports, .. } => reports,
            _ => &[],
        }
    }
}
