use std::fmt::Write as _;
use std::ops::RangeInclusive;

use crate::diff::Hunk;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchStatus {
    Success,
    Fuzzed,
    Failure,
}

impl PatchStatus {
    pub fn is_success(self) -> bool {
        matches!(self, PatchStatus::Success | PatchStatus::Fuzzed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HunkReport {
    /// 1-based position of the hunk in its spec.
    pub index: usize,
    pub status: PatchStatus,
    /// Context mismatches tolerated where the hunk landed.
    pub fuzz: usize,
    /// Fuzz levels tried before giving up or succeeding.
    pub attempted: RangeInclusive<usize>,
    /// Distance in lines from the expected position; 0 for failed hunks.
    pub offset: isize,
    pub hunk: Hunk,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchReport {
    pub target: String,
    pub status: PatchStatus,
    pub hunks: Vec<HunkReport>,
    /// Why the file failed, if it did.
    pub failure: Option<String>,
}

impl PatchReport {
    pub(crate) fn from_hunks(target: String, hunks: Vec<HunkReport>) -> Self {
        let failed = hunks
            .iter()
            .filter(|h| h.status == PatchStatus::Failure)
            .count();
        let (status, failure) = if failed > 0 {
            (
                PatchStatus::Failure,
                Some(format!("{failed} of {} hunks failed", hunks.len())),
            )
        } else if hunks.iter().any(|h| h.status == PatchStatus::Fuzzed) {
            (PatchStatus::Fuzzed, None)
        } else {
            (PatchStatus::Success, None)
        };
        Self {
            target,
            status,
            hunks,
            failure,
        }
    }

    pub(crate) fn failed(target: String, message: impl Into<String>) -> Self {
        Self {
            target,
            status: PatchStatus::Failure,
            hunks: Vec::new(),
            failure: Some(message.into()),
        }
    }
}

/// Plain-text patching log.
///
/// Lists failed targets with every failing hunk (header, fuzz range tried and
/// body) and fuzzed targets with the fuzz each hunk needed. Successful targets
/// are not mentioned.
#[derive(Debug, Default)]
pub struct PatchLog {
    text: String,
    applied: usize,
    failed: usize,
}

impl PatchLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that patch file `name` from `bundle` is about to be applied.
    pub fn applying(&mut self, name: &str, bundle: &str) {
        self.applied += 1;
        let _ = writeln!(self.text, "Applying patch {name} from bundle {bundle}");
    }

    pub fn record(&mut self, reports: &[PatchReport]) {
        for report in reports {
            match report.status {
                PatchStatus::Failure => {
                    self.failed += 1;
                    let _ = writeln!(
                        self.text,
                        "Patch {} failed: {}",
                        report.target,
                        report.failure.as_deref().unwrap_or("unknown error")
                    );
                    for hunk in &report.hunks {
                        match hunk.status {
                            PatchStatus::Fuzzed => self.fuzzed_hunk(hunk),
                            PatchStatus::Failure => {
                                let h = &hunk.hunk;
                                let _ = writeln!(
                                    self.text,
                                    " - Hunk {} failed ({}+{} -> {}+{}), fuzz {}..={}:",
                                    hunk.index,
                                    h.old_start,
                                    h.old_count,
                                    h.new_start,
                                    h.new_count,
                                    hunk.attempted.start(),
                                    hunk.attempted.end(),
                                );
                                for line in h.body() {
                                    let _ = writeln!(self.text, "{line}");
                                }
                            }
                            PatchStatus::Success => {}
                        }
                    }
                }
                PatchStatus::Fuzzed => {
                    let _ = writeln!(self.text, "Patch fuzzed: {}", report.target);
                    for hunk in &report.hunks {
                        if hunk.status == PatchStatus::Fuzzed {
                            self.fuzzed_hunk(hunk);
                        }
                    }
                }
                PatchStatus::Success => {}
            }
        }
    }

    fn fuzzed_hunk(&mut self, hunk: &HunkReport) {
        let _ = writeln!(self.text, " - Hunk {} fuzzed {}", hunk.index, hunk.fuzz);
    }

    /// Patch files announced through [`PatchLog::applying`].
    pub fn applied(&self) -> usize {
        self.applied
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}
