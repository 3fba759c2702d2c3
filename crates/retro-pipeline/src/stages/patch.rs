use std::path::{Path, PathBuf};

use retro_archive::Artifact;
use retro_cache::ContentHasher;
use retro_config::PatchSection;
use retro_patch::{
    load_bundle, ApplyOptions, PatchError, PatchLog, PatchReport, PatchStatus, WorkingSet,
};
use walkdir::WalkDir;

use crate::error::PipelineError;
use crate::stage::{Stage, StageContext};

pub const PATCH_LOG_FILE: &str = "patching.log";

/// Injects extra files and applies patch bundles to the decompiled sources.
#[derive(Clone, Debug)]
pub struct PatchStage {
    bundles: Vec<PathBuf>,
    injection_dirs: Vec<PathBuf>,
    options: ApplyOptions,
}

impl PatchStage {
    pub fn new(section: &PatchSection) -> Self {
        Self {
            bundles: section.bundles.clone(),
            injection_dirs: section.injection_dirs.clone(),
            options: ApplyOptions {
                max_fuzz: section.max_fuzz,
                strip_components: section.strip,
                allow_failure: section.allow_failure,
                canonicalize_access: section.canonicalize_access,
            },
        }
    }

    fn inject(&self, artifact: &mut Artifact) -> Result<usize, PipelineError> {
        let mut injected = 0;
        for dir in &self.injection_dirs {
            for entry in WalkDir::new(dir).sort_by_file_name() {
                let entry = entry.map_err(|err| {
                    let path = err.path().unwrap_or(dir).to_path_buf();
                    PipelineError::io(path, err.into())
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry_name(dir, entry.path());
                let bytes = std::fs::read(entry.path())
                    .map_err(|err| PipelineError::io(entry.path(), err))?;
                artifact
                    .insert(name, bytes)
                    .map_err(|err| PipelineError::archive(entry.path(), err))?;
                injected += 1;
            }
        }
        Ok(injected)
    }

    /// Apply every bundle, recording each patch file in `log`.
    ///
    /// Failed reports are collected rather than returned early so the log is
    /// complete.
    fn apply_bundles(
        &self,
        sources: &mut WorkingSet,
        log: &mut PatchLog,
    ) -> Result<Vec<PatchReport>, PipelineError> {
        let options = ApplyOptions {
            allow_failure: true,
            ..self.options.clone()
        };
        let mut failed = Vec::new();
        for bundle in &self.bundles {
            let bundle_name = bundle.display().to_string();
            for file in load_bundle(bundle)? {
                log.applying(&file.name, &bundle_name);
                let reports = sources.apply(&file.specs()?, &options)?;
                for report in reports.iter().filter(|r| r.status == PatchStatus::Failure) {
                    tracing::error!(
                        target = "retro.pipeline",
                        patch = %file.name,
                        file = %report.target,
                        reason = report.failure.as_deref().unwrap_or("unknown"),
                        "patch failed"
                    );
                }
                log.record(&reports);
                failed.extend(reports.into_iter().filter(|r| r.status == PatchStatus::Failure));
            }
        }
        Ok(failed)
    }
}

impl Stage for PatchStage {
    fn name(&self) -> &str {
        "patch"
    }

    fn hash_inputs(&self, hasher: &mut ContentHasher) -> Result<(), PipelineError> {
        for bundle in &self.bundles {
            if bundle.is_dir() {
                hasher.dir(bundle)?;
            } else {
                hasher.file(bundle)?;
            }
        }
        for dir in &self.injection_dirs {
            hasher.dir(dir)?;
        }
        hasher
            .i64(self.options.max_fuzz as i64)
            .i64(self.options.strip_components as i64)
            .bool(self.options.allow_failure)
            .bool(self.options.canonicalize_access);
        Ok(())
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<(), PipelineError> {
        let mut artifact = ctx.load_input()?;
        let injected = self.inject(&mut artifact)?;

        let mut sources = WorkingSet::from_buffers(std::mem::take(artifact.sources_mut()));
        let mut log = PatchLog::new();
        let result = self.apply_bundles(&mut sources, &mut log);

        let log_path = ctx.temp_dir.join(PATCH_LOG_FILE);
        retro_cache::atomic_write(&log_path, log.as_str().as_bytes())?;
        let failed = result?;

        if !failed.is_empty() && !self.options.allow_failure {
            let target = failed[0].target.clone();
            return Err(PatchError::Rejected {
                target,
                message: format!("{} patch(es) failed, see {}", failed.len(), log_path.display()),
                reports: failed,
            }
            .into());
        }

        *artifact.sources_mut() = sources.into_buffers();
        tracing::info!(
            target = "retro.pipeline",
            stage = "patch",
            injected,
            patches = log.applied(),
            failed = log.failed(),
            log = %log_path.display(),
            "applied patches"
        );
        ctx.save_output(&artifact)
    }
}

/// Archive entry name for a file below `root`, always `/`-separated.
fn entry_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
