//! Ordered stages with whole-chain up-to-date checking.
//!
//! Every hashed stage contributes its inputs to one combined digest, stored
//! next to the final output as `<output>.inputs.sha256`. When the stored digest
//! matches and the final output exists, nothing runs. Any difference reruns
//! the whole chain.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use retro_cache::{ContentHasher, FileHashCache, Fingerprint};

use crate::error::PipelineError;
use crate::stage::{Stage, StageContext};

/// Suffix of the digest file written beside the final output.
pub const DIGEST_SUFFIX: &str = ".inputs.sha256";

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainAction {
    /// Hashed; output removed after the run unless it is the final one.
    Cleanup,
    /// Hashed; output always kept.
    NoCleanup,
    /// Not hashed; output removed after the run.
    OnlyCleanup,
}

struct ChainLink {
    stage: Box<dyn Stage>,
    output: PathBuf,
    action: ChainAction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageRun {
    pub name: String,
    pub duration: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainReport {
    /// The stored digest matched and nothing ran.
    pub up_to_date: bool,
    pub executed: Vec<StageRun>,
    pub digest: Fingerprint,
    pub output: PathBuf,
}

impl ChainReport {
    pub fn invocations(&self) -> usize {
        self.executed.len()
    }
}

pub struct JarChain {
    input: Option<PathBuf>,
    links: Vec<ChainLink>,
    files: Arc<FileHashCache>,
    temp_root: PathBuf,
    keep_intermediates: bool,
    debounce: Duration,
    last_check: Option<(Instant, bool)>,
}

impl JarChain {
    /// `temp_root` holds one scratch directory per stage.
    pub fn new(input: Option<PathBuf>, temp_root: impl Into<PathBuf>, files: Arc<FileHashCache>) -> Self {
        Self {
            input,
            links: Vec::new(),
            files,
            temp_root: temp_root.into(),
            keep_intermediates: false,
            debounce: DEFAULT_DEBOUNCE,
            last_check: None,
        }
    }

    #[must_use]
    pub fn keep_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediates = keep;
        self
    }

    #[must_use]
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Append a stage writing `output`.
    pub fn push(&mut self, stage: impl Stage + 'static, output: impl Into<PathBuf>, action: ChainAction) {
        self.links.push(ChainLink {
            stage: Box::new(stage),
            output: output.into(),
            action,
        });
        self.last_check = None;
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.links.iter().map(|link| link.stage.name())
    }

    pub fn final_output(&self) -> Option<&Path> {
        self.links.last().map(|link| link.output.as_path())
    }

    pub fn digest_path(&self) -> Option<PathBuf> {
        self.final_output().map(digest_path_for)
    }

    /// Combined digest of the chain input and every hashed stage.
    pub fn compute_digest(&self) -> Result<Fingerprint, PipelineError> {
        let mut hasher = ContentHasher::new(Arc::clone(&self.files));
        hasher.str("retro-chain/1");
        hasher.file_opt(self.input.as_deref())?;
        for link in &self.links {
            if link.action == ChainAction::OnlyCleanup {
                continue;
            }
            hasher.str(link.stage.name());
            link.stage.hash_inputs(&mut hasher)?;
        }
        Ok(hasher.finish())
    }

    /// Whether running would be a no-op.
    ///
    /// The answer is reused for the debounce interval.
    pub fn is_up_to_date(&mut self) -> Result<bool, PipelineError> {
        if let Some((at, answer)) = self.last_check {
            if at.elapsed() < self.debounce {
                return Ok(answer);
            }
        }
        let digest = self.compute_digest()?;
        let answer = self.stored_digest_matches(&digest);
        self.last_check = Some((Instant::now(), answer));
        Ok(answer)
    }

    fn stored_digest_matches(&self, digest: &Fingerprint) -> bool {
        let Some(output) = self.final_output() else {
            return false;
        };
        if !output.is_file() {
            return false;
        }
        let stored = match std::fs::read_to_string(digest_path_for(output)) {
            Ok(text) => Fingerprint::parse(text.trim()),
            Err(_) => None,
        };
        stored.as_ref() == Some(digest)
    }

    /// Run every stage unless the chain is up to date.
    pub fn run(&mut self) -> Result<ChainReport, PipelineError> {
        let Some(final_output) = self.final_output().map(Path::to_path_buf) else {
            return Err(PipelineError::MissingConfig("chain stages"));
        };
        let digest = self.compute_digest()?;
        if self.stored_digest_matches(&digest) {
            tracing::info!(
                target = "retro.pipeline",
                output = %final_output.display(),
                digest = %digest,
                "chain is up to date"
            );
            self.last_check = Some((Instant::now(), true));
            return Ok(ChainReport {
                up_to_date: true,
                executed: Vec::new(),
                digest,
                output: final_output,
            });
        }
        self.last_check = None;

        let mut executed = Vec::with_capacity(self.links.len());
        let mut input = self.input.clone();
        for link in &self.links {
            let name = link.stage.name().to_owned();
            let start = Instant::now();
            self.run_link(link, input.as_deref())?;
            let duration = start.elapsed();
            tracing::info!(
                target = "retro.pipeline",
                stage = %name,
                output = %link.output.display(),
                elapsed_ms = duration.as_millis() as u64,
                "stage finished"
            );
            executed.push(StageRun { name, duration });
            input = Some(link.output.clone());
        }

        let record = format!("{digest}\n");
        retro_cache::atomic_write(&digest_path_for(&final_output), record.as_bytes())?;

        if !self.keep_intermediates {
            let last = self.links.len() - 1;
            for link in &self.links[..last] {
                if link.action != ChainAction::NoCleanup {
                    retro_cache::remove_file_best_effort(&link.output, "intermediate chain output");
                }
            }
        }
        self.last_check = Some((Instant::now(), true));

        Ok(ChainReport {
            up_to_date: false,
            executed,
            digest,
            output: final_output,
        })
    }

    fn run_link(&self, link: &ChainLink, input: Option<&Path>) -> Result<(), PipelineError> {
        let name = link.stage.name();
        let parent = match link.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|err| PipelineError::io(&parent, err))?;

        let temp_dir = self.temp_root.join(name);
        if temp_dir.exists() {
            std::fs::remove_dir_all(&temp_dir).map_err(|err| PipelineError::io(&temp_dir, err))?;
        }
        std::fs::create_dir_all(&temp_dir).map_err(|err| PipelineError::io(&temp_dir, err))?;

        // Dropped (and deleted) on every early return, so a failed stage
        // never leaves anything at the output path.
        let staging = tempfile::Builder::new()
            .prefix(".retro-stage-")
            .tempdir_in(&parent)
            .map_err(|err| PipelineError::io(&parent, err))?;
        let file_name = link
            .output
            .file_name()
            .map_or_else(|| OsString::from("output"), |n| n.to_owned());
        let staged = staging.path().join(file_name);

        tracing::debug!(
            target = "retro.pipeline",
            stage = %name,
            input = ?input.map(Path::display),
            "running stage"
        );
        link.stage.run(&StageContext {
            input,
            output: &staged,
            temp_dir: &temp_dir,
        })?;

        if !staged.is_file() {
            return Err(PipelineError::MissingOutput {
                stage: name.to_owned(),
                path: link.output.clone(),
            });
        }
        retro_cache::rename_replacing(&staged, &link.output)
            .map_err(|err| PipelineError::io(&link.output, err))?;
        Ok(())
    }
}

fn digest_path_for(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(DIGEST_SUFFIX);
    PathBuf::from(name)
}
