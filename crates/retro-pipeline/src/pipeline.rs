use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use retro_cache::{CacheConfig, CacheService, FileHashCache, LockPolicy};
use retro_config::PipelineConfig;
use retro_mappings::{GeneratedMappings, MappingInputs, MappingOutputs};
use retro_remap::{JavadocMode, RemapInputs, RemapOptions};

use crate::chain::{ChainAction, ChainReport, JarChain};
use crate::error::PipelineError;
use crate::mappings::generate_mappings;
use crate::stages::{CleanupStage, PatchStage, RemapStage, ToolStage};

/// Tool roles in chain order.
pub const TOOL_STAGES: [&str; 4] = ["merge", "deobfuscate", "decompile", "access_transform"];

const TEMP_DIR_NAME: &str = "tmp";

/// Result of [`Pipeline::run`].
#[derive(Debug)]
pub struct PipelineReport {
    /// `None` when no mapping inputs are configured.
    pub mappings: Option<GeneratedMappings>,
    pub chain: ChainReport,
}

/// The standard decompile chain plus mapping generation.
pub struct Pipeline {
    cache: CacheService,
    chain: JarChain,
    mappings: Option<(MappingInputs, MappingOutputs)>,
}

impl Pipeline {
    /// Wire merge, deobfuscate, decompile, access transform, cleanup, patch and
    /// remap. Tool stages without a `[tools.<name>]` entry are left out.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let cache = cache_service(config)?;
        let work_dir = config.chain.work_dir.clone();
        let files = FileHashCache::shared();

        let mut chain = JarChain::new(
            config.chain.input.clone(),
            work_dir.join(TEMP_DIR_NAME),
            Arc::clone(&files),
        )
        .keep_intermediates(config.chain.keep_intermediates)
        .debounce(config.chain.debounce());

        for role in TOOL_STAGES {
            let Some(tool) = config.tools.get(role) else {
                tracing::debug!(target = "retro.pipeline", stage = role, "tool not configured");
                continue;
            };
            let stage = ToolStage::new(role, tool.clone()).copy_if_no_inputs(role == "access_transform");
            chain.push(stage, stage_output(&work_dir, role), ChainAction::Cleanup);
        }

        chain.push(
            CleanupStage::new(&config.cleanup),
            stage_output(&work_dir, "cleanup"),
            ChainAction::Cleanup,
        );

        let patch = &config.patch;
        if !patch.bundles.is_empty() || !patch.injection_dirs.is_empty() {
            chain.push(
                PatchStage::new(patch),
                stage_output(&work_dir, "patch"),
                ChainAction::Cleanup,
            );
        }

        if !config.remap.disabled {
            chain.push(
                RemapStage::new(remap_inputs(config)?, remap_options(config)),
                stage_output(&work_dir, "remap"),
                ChainAction::Cleanup,
            );
        }

        let mappings = mapping_inputs(config).map(|inputs| {
            let dir = config
                .mappings
                .output_dir
                .clone()
                .unwrap_or_else(|| work_dir.join("mappings"));
            (inputs, MappingOutputs::in_dir(&dir))
        });

        tracing::debug!(
            target = "retro.pipeline",
            stages = ?chain.stage_names().collect::<Vec<_>>(),
            cache = %cache.root().display(),
            "pipeline configured"
        );
        Ok(Self {
            cache,
            chain,
            mappings,
        })
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    pub fn chain(&self) -> &JarChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut JarChain {
        &mut self.chain
    }

    pub fn is_up_to_date(&mut self) -> Result<bool, PipelineError> {
        self.chain.is_up_to_date()
    }

    /// Regenerate the mapping tables, if mapping inputs are configured.
    pub fn generate_mappings(&self) -> Result<Option<GeneratedMappings>, PipelineError> {
        match &self.mappings {
            Some((inputs, outputs)) => generate_mappings(&self.cache, inputs, outputs).map(Some),
            None => Ok(None),
        }
    }

    pub fn run(&mut self) -> Result<PipelineReport, PipelineError> {
        let mappings = self.generate_mappings()?;
        let chain = self.chain.run()?;
        Ok(PipelineReport { mappings, chain })
    }
}

fn cache_service(config: &PipelineConfig) -> Result<CacheService, PipelineError> {
    let mut cache_config = CacheConfig::from_env();
    if cache_config.cache_root_override.is_none() {
        cache_config.cache_root_override = config.cache.root.clone();
    }
    let policy = LockPolicy {
        timeout: config.cache.lock_timeout_ms.map(Duration::from_millis),
        ..LockPolicy::default()
    };
    Ok(CacheService::from_config(&cache_config)?.with_lock_policy(policy))
}

fn stage_output(work_dir: &Path, stage: &str) -> PathBuf {
    work_dir.join(format!("{stage}.jar"))
}

fn mapping_inputs(config: &PipelineConfig) -> Option<MappingInputs> {
    let section = &config.mappings;
    Some(MappingInputs {
        srg: section.srg.clone()?,
        fields_csv: section.fields_csv.clone()?,
        methods_csv: section.methods_csv.clone()?,
        exc: section.exc.clone(),
        extra_exc: section.extra_exc.clone(),
    })
}

fn remap_inputs(config: &PipelineConfig) -> Result<RemapInputs, PipelineError> {
    let mappings = &config.mappings;
    Ok(RemapInputs {
        fields_csv: mappings
            .fields_csv
            .clone()
            .ok_or(PipelineError::MissingConfig("mappings.fields_csv"))?,
        methods_csv: mappings
            .methods_csv
            .clone()
            .ok_or(PipelineError::MissingConfig("mappings.methods_csv"))?,
        params_csv: mappings.params_csv.clone(),
        generics_csv: config.remap.generics_csv.clone(),
        generic_patches_csv: config.remap.generic_patches_csv.clone(),
    })
}

fn remap_options(config: &PipelineConfig) -> RemapOptions {
    let javadoc = if config.remap.skip_javadoc {
        JavadocMode::Skip
    } else if config.remap.dummy_javadoc {
        JavadocMode::Dummy
    } else {
        JavadocMode::Full
    };
    RemapOptions { javadoc }
}
