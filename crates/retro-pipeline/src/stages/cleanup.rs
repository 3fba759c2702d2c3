use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use retro_cache::ContentHasher;
use retro_config::CleanupSection;
use retro_patch::{group_by_base_name, load_bundle, ApplyOptions, PatchError, PatchReport, PatchStatus, WorkingSet};

use crate::error::PipelineError;
use crate::stage::{Stage, StageContext};

/// Post-decompile fixups.
///
/// Patches in `patches_dir` are grouped by base name (`Foo.java.patch`,
/// `Foo.java.patch2`, ...) and each group competes for its target. Blank lines
/// around `case` and `default` labels are removed afterwards.
#[derive(Clone, Debug)]
pub struct CleanupStage {
    patches_dir: Option<PathBuf>,
    strip: usize,
    max_fuzz: usize,
    normalize_switch_labels: bool,
}

impl CleanupStage {
    pub fn new(section: &CleanupSection) -> Self {
        Self {
            patches_dir: section.patches_dir.clone(),
            strip: section.strip,
            max_fuzz: section.max_fuzz,
            normalize_switch_labels: section.normalize_switch_labels,
        }
    }

    fn apply_fixes(&self, sources: &mut WorkingSet) -> Result<usize, PipelineError> {
        let Some(dir) = &self.patches_dir else {
            return Ok(0);
        };
        let options = ApplyOptions {
            max_fuzz: self.max_fuzz,
            strip_components: self.strip,
            allow_failure: false,
            canonicalize_access: false,
        };

        let mut applied = 0;
        for (base, files) in group_by_base_name(load_bundle(dir)?) {
            let mut specs = Vec::new();
            for file in &files {
                specs.extend(file.specs()?);
            }
            match sources.apply(&specs, &options) {
                Ok(reports) => applied += reports.len(),
                Err(err) => {
                    if let PatchError::Rejected { reports, .. } = &err {
                        log_failed_hunks(&base, reports);
                    }
                    return Err(err.into());
                }
            }
        }
        Ok(applied)
    }
}

impl Stage for CleanupStage {
    fn name(&self) -> &str {
        "cleanup"
    }

    fn hash_inputs(&self, hasher: &mut ContentHasher) -> Result<(), PipelineError> {
        hasher
            .dir_opt(self.patches_dir.as_deref())?
            .i64(self.strip as i64)
            .i64(self.max_fuzz as i64)
            .bool(self.normalize_switch_labels);
        Ok(())
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<(), PipelineError> {
        let mut artifact = ctx.load_input()?;
        let mut sources = WorkingSet::from_buffers(std::mem::take(artifact.sources_mut()));
        let applied = self.apply_fixes(&mut sources)?;

        let mut buffers = sources.into_buffers();
        if self.normalize_switch_labels {
            for text in buffers.values_mut() {
                if let Some(normalized) = normalize_switch_labels(text) {
                    *text = normalized;
                }
            }
        }
        *artifact.sources_mut() = buffers;

        tracing::info!(
            target = "retro.pipeline",
            stage = "cleanup",
            patched_files = applied,
            "applied decompiler fixes"
        );
        ctx.save_output(&artifact)
    }
}

fn log_failed_hunks(group: &str, reports: &[PatchReport]) {
    for report in reports.iter().filter(|r| r.status == PatchStatus::Failure) {
        if report.hunks.is_empty() {
            tracing::error!(
                target = "retro.pipeline",
                group,
                file = %report.target,
                reason = report.failure.as_deref().unwrap_or("unknown"),
                "fix-up patch failed"
            );
        }
        for hunk in report.hunks.iter().filter(|h| h.status == PatchStatus::Failure) {
            tracing::error!(
                target = "retro.pipeline",
                group,
                file = %report.target,
                hunk = hunk.index,
                header = %hunk.hunk.header(),
                "fix-up hunk failed:\n{}",
                hunk.hunk.body().join("\n")
            );
        }
    }
}

fn label_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:case|default).").expect("valid regex"))
}

fn indented_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[ \t]+(?:case|default)").expect("valid regex"))
}

/// Split `text` into `(content, terminator)` pairs. `\r\n`, `\r` and `\n` each
/// count as one terminator; the last line may have none.
fn split_lines(text: &str) -> Vec<(&str, &str)> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let width = match bytes[i] {
            b'\r' if bytes.get(i + 1) == Some(&b'\n') => 2,
            b'\r' | b'\n' => 1,
            _ => {
                i += 1;
                continue;
            }
        };
        lines.push((&text[start..i], &text[i..i + width]));
        i += width;
        start = i;
    }
    if start < text.len() {
        lines.push((&text[start..], ""));
    }
    lines
}

/// Remove the empty line directly after a `case`/`default` label and the one
/// directly before an indented label. Line terminators are kept as they are.
///
/// Returns `None` when the text is unchanged.
fn normalize_switch_labels(text: &str) -> Option<String> {
    let lines = split_lines(text);
    let is_blank = |i: usize| lines[i].0.is_empty() && !lines[i].1.is_empty();

    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    for (i, (content, terminator)) in lines.iter().enumerate() {
        if is_blank(i) && i > 0 {
            let after_label = label_line().is_match(lines[i - 1].0);
            let before_label = lines
                .get(i + 1)
                .is_some_and(|(next, _)| indented_label().is_match(next));
            if after_label || before_label {
                changed = true;
                continue;
            }
        }
        out.push_str(content);
        out.push_str(terminator);
    }
    changed.then_some(out)
}
