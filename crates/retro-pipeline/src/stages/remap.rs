use retro_cache::ContentHasher;
use retro_remap::{JavadocMode, RemapInputs, RemapOptions, RemapTables, Remapper};

use crate::error::PipelineError;
use crate::stage::{Stage, StageContext};

/// Renames intermediate identifiers in every source to human names.
#[derive(Clone, Debug)]
pub struct RemapStage {
    inputs: RemapInputs,
    options: RemapOptions,
}

impl RemapStage {
    pub fn new(inputs: RemapInputs, options: RemapOptions) -> Self {
        Self { inputs, options }
    }
}

impl Stage for RemapStage {
    fn name(&self) -> &str {
        "remap"
    }

    fn hash_inputs(&self, hasher: &mut ContentHasher) -> Result<(), PipelineError> {
        let mode = match self.options.javadoc {
            JavadocMode::Full => "full",
            JavadocMode::Dummy => "dummy",
            JavadocMode::Skip => "skip",
        };
        hasher
            .file(&self.inputs.fields_csv)?
            .file(&self.inputs.methods_csv)?
            .file_opt(self.inputs.params_csv.as_deref())?
            .file_opt(self.inputs.generics_csv.as_deref())?
            .file_opt(self.inputs.generic_patches_csv.as_deref())?
            .str(mode);
        Ok(())
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<(), PipelineError> {
        let mut artifact = ctx.load_input()?;
        let tables = RemapTables::load(&self.inputs)?;
        let summary = Remapper::new(tables, self.options.clone()).remap_all(artifact.sources_mut())?;
        tracing::info!(
            target = "retro.pipeline",
            stage = "remap",
            files = summary.files,
            generics = summary.generics_applied,
            "remapped sources"
        );
        ctx.save_output(&artifact)
    }
}
