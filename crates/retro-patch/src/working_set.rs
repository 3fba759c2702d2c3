use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use regex::Regex;

use crate::diff::{split_lines, Hunk, HunkLine, PatchSpec};
use crate::error::PatchError;
use crate::report::{HunkReport, PatchReport, PatchStatus};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Context lines a hunk may fail to match and still apply.
    pub max_fuzz: usize,
    pub strip_components: usize,
    /// Report failed targets instead of returning [`PatchError::Rejected`].
    pub allow_failure: bool,
    /// Ignore `public`/`protected`/`private` when comparing lines.
    pub canonicalize_access: bool,
}

/// In-memory text buffers keyed by `/`-separated path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkingSet {
    buffers: BTreeMap<String, String>,
}

enum Outcome {
    Write(String),
    Delete,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_buffers(buffers: BTreeMap<String, String>) -> Self {
        Self { buffers }
    }

    pub fn into_buffers(self) -> BTreeMap<String, String> {
        self.buffers
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.buffers.get(path).map(String::as_str)
    }

    pub fn insert(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.buffers.insert(path.into(), text.into());
    }

    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.buffers.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.buffers.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.buffers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Apply `specs`, one report per distinct target in first-seen order.
    ///
    /// Specs sharing a target compete: each is tried on a scratch copy in
    /// declaration order and the first that succeeds (possibly fuzzed) is
    /// committed. If none does, the last attempt is reported and the buffer is
    /// left alone. A target is only ever written as a whole.
    ///
    /// Unless `allow_failure` is set, any failed target turns the result into
    /// [`PatchError::Rejected`]. Targets that did apply stay applied.
    pub fn apply(
        &mut self,
        specs: &[PatchSpec],
        options: &ApplyOptions,
    ) -> Result<Vec<PatchReport>, PatchError> {
        let mut order = Vec::new();
        let mut candidates: HashMap<String, Vec<&PatchSpec>> = HashMap::new();
        for spec in specs {
            let target = spec.target(options.strip_components);
            candidates
                .entry(target.clone())
                .or_insert_with(|| {
                    order.push(target);
                    Vec::new()
                })
                .push(spec);
        }

        let mut reports = Vec::with_capacity(order.len());
        for target in order {
            let specs = &candidates[&target];
            let mut chosen = None;
            for (idx, spec) in specs.iter().enumerate() {
                let (report, outcome) = self.dry_run(&target, spec, options);
                if report.status.is_success() || idx + 1 == specs.len() {
                    chosen = Some((report, outcome));
                    break;
                }
                tracing::debug!(
                    target = "retro.patch",
                    file = %target,
                    candidate = idx + 1,
                    "competing patch did not apply, trying the next one"
                );
            }
            let Some((report, outcome)) = chosen else {
                continue;
            };

            match outcome {
                Some(Outcome::Write(text)) => {
                    self.buffers.insert(target.clone(), text);
                }
                Some(Outcome::Delete) => {
                    self.buffers.remove(&target);
                }
                None => {}
            }
            tracing::debug!(
                target = "retro.patch",
                file = %target,
                status = ?report.status,
                "patched"
            );
            reports.push(report);
        }

        if !options.allow_failure {
            if let Some(failed) = reports.iter().find(|r| r.status == PatchStatus::Failure) {
                return Err(PatchError::Rejected {
                    target: failed.target.clone(),
                    message: failed
                        .failure
                        .clone()
                        .unwrap_or_else(|| "patch failed".to_owned()),
                    reports,
                });
            }
        }
        Ok(reports)
    }

    fn dry_run(
        &self,
        target: &str,
        spec: &PatchSpec,
        options: &ApplyOptions,
    ) -> (PatchReport, Option<Outcome>) {
        let base = match (self.buffers.get(target), spec.is_creation()) {
            (Some(_), true) => {
                return (PatchReport::failed(target.to_owned(), "target already exists"), None)
            }
            (None, false) => {
                return (PatchReport::failed(target.to_owned(), "target not found"), None)
            }
            (None, true) => "",
            (Some(text), false) => text.as_str(),
        };

        let mut file = TextFile::parse(base);
        let hunks = apply_hunks(&mut file.lines, &spec.hunks, options);
        let report = PatchReport::from_hunks(target.to_owned(), hunks);
        if !report.status.is_success() {
            return (report, None);
        }
        if spec.is_deletion() {
            return (report, Some(Outcome::Delete));
        }

        if spec.hunks.iter().any(|h| h.new_no_newline) {
            file.trailing_newline = false;
        } else if spec.hunks.iter().any(|h| h.old_no_newline) {
            file.trailing_newline = true;
        }
        (report, Some(Outcome::Write(file.render())))
    }
}

struct TextFile {
    lines: Vec<String>,
    eol: &'static str,
    trailing_newline: bool,
}

impl TextFile {
    fn parse(text: &str) -> Self {
        let eol = match text.find(['\n', '\r']) {
            Some(idx) if text[idx..].starts_with("\r\n") => "\r\n",
            Some(idx) if text[idx..].starts_with('\r') => "\r",
            _ => "\n",
        };
        Self {
            lines: split_lines(text).map(str::to_owned).collect(),
            eol,
            trailing_newline: text.is_empty() || text.ends_with(['\n', '\r']),
        }
    }

    fn render(&self) -> String {
        let mut out = self.lines.join(self.eol);
        if self.trailing_newline && !self.lines.is_empty() {
            out.push_str(self.eol);
        }
        out
    }
}

fn apply_hunks(lines: &mut Vec<String>, hunks: &[Hunk], options: &ApplyOptions) -> Vec<HunkReport> {
    let mut reports = Vec::with_capacity(hunks.len());
    let mut delta: isize = 0;
    let mut floor = 0usize;

    for (idx, hunk) in hunks.iter().enumerate() {
        let old: Vec<&HunkLine> = hunk.old_lines().collect();
        let recorded = if old.is_empty() {
            hunk.old_start
        } else {
            hunk.old_start.saturating_sub(1)
        } as isize;
        let expected = recorded + delta;

        let found = if old.is_empty() {
            Some((expected.clamp(floor as isize, lines.len() as isize) as usize, 0))
        } else {
            find_window(lines, &old, expected, floor, options)
        };

        let Some((pos, fuzz)) = found else {
            reports.push(HunkReport {
                index: idx + 1,
                status: PatchStatus::Failure,
                fuzz: options.max_fuzz,
                attempted: 0..=options.max_fuzz,
                offset: 0,
                hunk: hunk.clone(),
            });
            continue;
        };

        let window = &lines[pos..pos + old.len()];
        let mut replacement = Vec::with_capacity(hunk.new_count);
        let mut cursor = 0;
        for line in &hunk.lines {
            match line {
                HunkLine::Context(_) => {
                    replacement.push(window[cursor].clone());
                    cursor += 1;
                }
                HunkLine::Remove(_) => cursor += 1,
                HunkLine::Add(text) => replacement.push(text.clone()),
            }
        }
        let new_len = replacement.len();
        lines.splice(pos..pos + old.len(), replacement);

        delta = pos as isize + new_len as isize - old.len() as isize - recorded;
        floor = pos + new_len;
        reports.push(HunkReport {
            index: idx + 1,
            status: if fuzz == 0 {
                PatchStatus::Success
            } else {
                PatchStatus::Fuzzed
            },
            fuzz,
            attempted: 0..=fuzz,
            offset: pos as isize - expected,
            hunk: hunk.clone(),
        });
    }
    reports
}

/// Lowest fuzz first, then nearest to `expected`, later positions before
/// earlier ones at equal distance.
fn find_window(
    lines: &[String],
    old: &[&HunkLine],
    expected: isize,
    floor: usize,
    options: &ApplyOptions,
) -> Option<(usize, usize)> {
    if lines.len() < old.len() || floor > lines.len() - old.len() {
        return None;
    }
    let (lo, hi) = (floor as isize, (lines.len() - old.len()) as isize);
    let reach = (expected - lo).abs().max((hi - expected).abs());

    for fuzz in 0..=options.max_fuzz {
        for distance in 0..=reach {
            for pos in [expected + distance, expected - distance] {
                if pos < lo || pos > hi {
                    continue;
                }
                let pos = pos as usize;
                if window_matches(&lines[pos..pos + old.len()], old, fuzz, options.canonicalize_access) {
                    return Some((pos, fuzz));
                }
            }
        }
    }
    None
}

fn window_matches(window: &[String], old: &[&HunkLine], fuzz: usize, canonicalize: bool) -> bool {
    let mut mismatches = 0;
    for (actual, expected) in window.iter().zip(old) {
        if lines_equal(actual, expected.text(), canonicalize) {
            continue;
        }
        match expected {
            HunkLine::Context(_) => {
                mismatches += 1;
                if mismatches > fuzz {
                    return false;
                }
            }
            _ => return false,
        }
    }
    // A window where nothing matched is not a match at any fuzz.
    mismatches < old.len()
}

fn lines_equal(actual: &str, expected: &str, canonicalize: bool) -> bool {
    actual == expected || (canonicalize && strip_access(actual) == strip_access(expected))
}

fn strip_access(line: &str) -> std::borrow::Cow<'_, str> {
    static ACCESS: OnceLock<Regex> = OnceLock::new();
    let re = ACCESS
        .get_or_init(|| Regex::new(r"\b(?:public|protected|private)\s+").expect("valid regex"));
    re.replace_all(line, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::parse_patch;
    use pretty_assertions::assert_eq;

    fn spec(diff: &str) -> PatchSpec {
        parse_patch(diff, "test.patch").unwrap().remove(0)
    }

    fn set(text: &str) -> WorkingSet {
        let mut set = WorkingSet::new();
        set.insert("Foo.java", text);
        set
    }

    #[test]
    fn applies_with_offset_but_no_fuzz() {
        let mut ws = set("extra\nextra\na\nb\nc\n");
        let reports = ws
            .apply(
                &[spec("--- Foo.java\n+++ Foo.java\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n")],
                &ApplyOptions::default(),
            )
            .unwrap();
        assert_eq!(reports[0].status, PatchStatus::Success);
        assert_eq!(reports[0].hunks[0].offset, 2);
        assert_eq!(ws.get("Foo.java"), Some("extra\nextra\na\nB\nc\n"));
    }

    #[test]
    fn fuzz_keeps_buffer_context() {
        let mut ws = set("a\nb\nchanged\n");
        let options = ApplyOptions {
            max_fuzz: 1,
            ..ApplyOptions::default()
        };
        let reports = ws
            .apply(
                &[spec("--- Foo.java\n+++ Foo.java\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n")],
                &options,
            )
            .unwrap();
        assert_eq!(reports[0].status, PatchStatus::Fuzzed);
        assert_eq!(reports[0].hunks[0].fuzz, 1);
        assert_eq!(ws.get("Foo.java"), Some("a\nB\nchanged\n"));
    }

    #[test]
    fn removed_lines_must_match() {
        let mut ws = set("a\nx\nc\n");
        let options = ApplyOptions {
            max_fuzz: 2,
            allow_failure: true,
            ..ApplyOptions::default()
        };
        let reports = ws
            .apply(
                &[spec("--- Foo.java\n+++ Foo.java\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n")],
                &options,
            )
            .unwrap();
        assert_eq!(reports[0].status, PatchStatus::Failure);
        assert_eq!(reports[0].hunks[0].attempted, 0..=2);
        assert_eq!(ws.get("Foo.java"), Some("a\nx\nc\n"));
    }

    #[test]
    fn access_modifiers_are_ignored_when_canonicalizing() {
        let diff = "--- Foo.java\n+++ Foo.java\n@@ -1,2 +1,2 @@\n private int x;\n-void f() {}\n+void g() {}\n";
        let mut ws = set("public int x;\nvoid f() {}\n");
        let options = ApplyOptions {
            canonicalize_access: true,
            ..ApplyOptions::default()
        };
        let reports = ws.apply(&[spec(diff)], &options).unwrap();
        assert_eq!(reports[0].status, PatchStatus::Success);
        assert_eq!(ws.get("Foo.java"), Some("public int x;\nvoid g() {}\n"));

        let mut strict = set("public int x;\nvoid f() {}\n");
        assert!(strict.apply(&[spec(diff)], &ApplyOptions::default()).is_err());
    }

    #[test]
    fn preserves_crlf_and_missing_final_newline() {
        let mut ws = set("a\r\nb\r\nc");
        ws.apply(
            &[spec("--- Foo.java\n+++ Foo.java\n@@ -2,2 +2,2 @@\n-b\n+B\n c\n\\ No newline at end of file\n")],
            &ApplyOptions::default(),
        )
        .unwrap();
        assert_eq!(ws.get("Foo.java"), Some("a\r\nB\r\nc"));
    }

    #[test]
    fn creates_and_deletes_files() {
        let mut ws = set("gone\n");
        let specs = parse_patch(
            "--- /dev/null\n+++ b/New.java\n@@ -0,0 +1,2 @@\n+class New {\n+}\n\
             --- a/Foo.java\n+++ /dev/null\n@@ -1 +0,0 @@\n-gone\n",
            "two.patch",
        )
        .unwrap();
        let options = ApplyOptions {
            strip_components: 1,
            ..ApplyOptions::default()
        };
        ws.apply(&specs, &options).unwrap();
        assert_eq!(ws.get("New.java"), Some("class New {\n}\n"));
        assert!(!ws.contains("Foo.java"));
    }

    #[test]
    fn missing_target_is_rejected() {
        let mut ws = WorkingSet::new();
        let err = ws
            .apply(
                &[spec("--- Bar.java\n+++ Bar.java\n@@ -1 +1 @@\n-a\n+b\n")],
                &ApplyOptions::default(),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "patch for Bar.java rejected: target not found");
        assert_eq!(err.reports().len(), 1);
    }
}
