use std::path::Path;

use retro_archive::Artifact;
use retro_cache::ContentHasher;

use crate::error::PipelineError;

/// Paths handed to a stage for one run.
#[derive(Clone, Copy, Debug)]
pub struct StageContext<'a> {
    /// Previous stage's output, or the chain input for the first stage.
    pub input: Option<&'a Path>,
    /// Where the stage must write its artifact. Moved into place by the chain
    /// once the stage returns successfully.
    pub output: &'a Path,
    /// Scratch directory kept after the run, for logs and tool temp files.
    pub temp_dir: &'a Path,
}

impl StageContext<'_> {
    pub fn require_input(&self) -> Result<&Path, PipelineError> {
        self.input.ok_or(PipelineError::MissingConfig("chain.input"))
    }

    /// Load the input artifact.
    pub fn load_input(&self) -> Result<Artifact, PipelineError> {
        let input = self.require_input()?;
        Artifact::load(input).map_err(|err| PipelineError::archive(input, err))
    }

    pub fn save_output(&self, artifact: &Artifact) -> Result<(), PipelineError> {
        artifact
            .save(self.output)
            .map_err(|err| PipelineError::archive(self.output, err))
    }
}

/// One jar-in, jar-out transformation.
pub trait Stage: Send {
    /// Stable identifier, also folded into the chain digest.
    fn name(&self) -> &str;

    /// Feed every non-artifact input that affects the output.
    fn hash_inputs(&self, hasher: &mut ContentHasher) -> Result<(), PipelineError>;

    fn run(&self, ctx: &StageContext<'_>) -> Result<(), PipelineError>;
}
