use retro_cache::{CacheService, LockMode};
use retro_mappings::{generate_files, GeneratedMappings, MappingInputs, MappingOutputs};

use crate::error::PipelineError;

/// Generate every mapping table while holding the exclusive cache lock.
///
/// Other processes reading the mapping directory take the shared lock, so
/// they never observe a half-written set of tables.
pub fn generate_mappings(
    cache: &CacheService,
    inputs: &MappingInputs,
    outputs: &MappingOutputs,
) -> Result<GeneratedMappings, PipelineError> {
    let _lock = cache.lock(LockMode::Exclusive)?;
    tracing::debug!(
        target = "retro.pipeline",
        lock = %cache.lock_path().display(),
        "holding exclusive cache lock for mapping generation"
    );
    Ok(generate_files(inputs, outputs)?)
}
