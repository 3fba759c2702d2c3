//! Unified diff parsing.

use crate::error::PatchError;

/// Path used by unified diffs for the missing side of a creation or deletion.
pub const DEV_NULL: &str = "/dev/null";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

impl HunkLine {
    pub fn text(&self) -> &str {
        match self {
            HunkLine::Context(text) | HunkLine::Remove(text) | HunkLine::Add(text) => text,
        }
    }

    fn marker(&self) -> char {
        match self {
            HunkLine::Context(_) => ' ',
            HunkLine::Remove(_) => '-',
            HunkLine::Add(_) => '+',
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hunk {
    /// 1-based first line on the old side (0 for an empty old side).
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<HunkLine>,
    /// The old side ends without a trailing newline.
    pub old_no_newline: bool,
    pub new_no_newline: bool,
}

impl Hunk {
    /// Lines the hunk expects to find: context and removals.
    pub fn old_lines(&self) -> impl Iterator<Item = &HunkLine> {
        self.lines
            .iter()
            .filter(|line| !matches!(line, HunkLine::Add(_)))
    }

    pub fn new_lines(&self) -> impl Iterator<Item = &HunkLine> {
        self.lines
            .iter()
            .filter(|line| !matches!(line, HunkLine::Remove(_)))
    }

    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        )
    }

    /// Hunk body in diff notation, one line per entry.
    pub fn body(&self) -> Vec<String> {
        self.lines
            .iter()
            .map(|line| format!("{}{}", line.marker(), line.text()))
            .collect()
    }

    fn reversed(&self) -> Self {
        Self {
            old_start: self.new_start,
            old_count: self.new_count,
            new_start: self.old_start,
            new_count: self.old_count,
            lines: self
                .lines
                .iter()
                .map(|line| match line {
                    HunkLine::Context(text) => HunkLine::Context(text.clone()),
                    HunkLine::Remove(text) => HunkLine::Add(text.clone()),
                    HunkLine::Add(text) => HunkLine::Remove(text.clone()),
                })
                .collect(),
            old_no_newline: self.new_no_newline,
            new_no_newline: self.old_no_newline,
        }
    }
}

/// All hunks a diff carries for one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchSpec {
    pub old_path: String,
    pub new_path: String,
    pub hunks: Vec<Hunk>,
}

impl PatchSpec {
    pub fn is_creation(&self) -> bool {
        self.old_path == DEV_NULL
    }

    pub fn is_deletion(&self) -> bool {
        self.new_path == DEV_NULL
    }

    /// The buffer this spec edits, with `strip` leading path components removed.
    pub fn target(&self, strip: usize) -> String {
        let path = if self.is_creation() {
            &self.new_path
        } else {
            &self.old_path
        };
        strip_components(path, strip).to_owned()
    }

    /// The inverse edit: applying it undoes this spec.
    pub fn reversed(&self) -> Self {
        Self {
            old_path: self.new_path.clone(),
            new_path: self.old_path.clone(),
            hunks: self.hunks.iter().map(Hunk::reversed).collect(),
        }
    }
}

/// Drop `n` leading `/`-separated components.
///
/// Paths with no more than `n` components keep their last component.
pub fn strip_components(path: &str, n: usize) -> &str {
    let mut rest = path.trim_start_matches("./");
    for _ in 0..n {
        match rest.find('/') {
            Some(idx) => rest = &rest[idx + 1..],
            None => break,
        }
    }
    rest
}

/// Parse every file section of a unified diff.
///
/// `name` only appears in error messages. Text before the first `---` header
/// of each section (`diff --git`, `Index:` and similar) is ignored.
pub fn parse_patch(text: &str, name: &str) -> Result<Vec<PatchSpec>, PatchError> {
    let lines: Vec<&str> = split_lines(text).collect();
    let err = |line: usize, message: String| PatchError::Parse {
        name: name.to_owned(),
        line: line + 1,
        message,
    };

    let mut specs = Vec::new();
    let mut idx = 0;
    while idx < lines.len() {
        let Some(old) = lines[idx].strip_prefix("--- ") else {
            idx += 1;
            continue;
        };
        let Some(new) = lines.get(idx + 1).and_then(|l| l.strip_prefix("+++ ")) else {
            return Err(err(idx + 1, "expected `+++` header after `---`".to_owned()));
        };
        let mut spec = PatchSpec {
            old_path: header_path(old),
            new_path: header_path(new),
            hunks: Vec::new(),
        };
        idx += 2;

        while idx < lines.len() && lines[idx].starts_with("@@") {
            let (old_start, old_count, new_start, new_count) =
                parse_hunk_header(lines[idx]).ok_or_else(|| {
                    err(idx, format!("malformed hunk header {:?}", lines[idx]))
                })?;
            idx += 1;

            let mut hunk = Hunk {
                old_start,
                old_count,
                new_start,
                new_count,
                lines: Vec::new(),
                old_no_newline: false,
                new_no_newline: false,
            };
            let (mut old_seen, mut new_seen) = (0, 0);
            while old_seen < old_count || new_seen < new_count {
                let Some(&line) = lines.get(idx) else {
                    return Err(err(idx, "unexpected end of hunk".to_owned()));
                };
                let (marker, body) = match line.chars().next() {
                    Some(c) => (c, &line[c.len_utf8()..]),
                    // Blank context lines lose their leading space in some tools.
                    None => (' ', ""),
                };
                let entry = match marker {
                    ' ' => {
                        old_seen += 1;
                        new_seen += 1;
                        HunkLine::Context(body.to_owned())
                    }
                    '-' => {
                        old_seen += 1;
                        HunkLine::Remove(body.to_owned())
                    }
                    '+' => {
                        new_seen += 1;
                        HunkLine::Add(body.to_owned())
                    }
                    '\\' => {
                        mark_no_newline(&mut hunk);
                        idx += 1;
                        continue;
                    }
                    other => {
                        return Err(err(idx, format!("unexpected hunk line marker {other:?}")));
                    }
                };
                if old_seen > old_count || new_seen > new_count {
                    return Err(err(idx, "hunk is longer than its header says".to_owned()));
                }
                hunk.lines.push(entry);
                idx += 1;
            }
            if lines.get(idx).is_some_and(|l| l.starts_with('\\')) {
                mark_no_newline(&mut hunk);
                idx += 1;
            }
            spec.hunks.push(hunk);
        }

        specs.push(spec);
    }
    Ok(specs)
}

fn mark_no_newline(hunk: &mut Hunk) {
    match hunk.lines.last() {
        Some(HunkLine::Remove(_)) => hunk.old_no_newline = true,
        Some(HunkLine::Add(_)) => hunk.new_no_newline = true,
        Some(HunkLine::Context(_)) => {
            hunk.old_no_newline = true;
            hunk.new_no_newline = true;
        }
        None => {}
    }
}

fn header_path(raw: &str) -> String {
    let path = raw.split('\t').next().unwrap_or(raw).trim_end();
    path.to_owned()
}

fn parse_hunk_header(line: &str) -> Option<(usize, usize, usize, usize)> {
    let rest = line.strip_prefix("@@ -")?;
    let end = rest.find(" @@")?;
    let (old, new) = rest[..end].split_once(" +")?;
    let (old_start, old_count) = parse_range(old)?;
    let (new_start, new_count) = parse_range(new)?;
    Some((old_start, old_count, new_start, new_count))
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

/// Split on `\r\n`, `\n` or `\r`, without terminators. A trailing terminator
/// does not produce an empty final line.
pub(crate) fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        match rest.find(['\n', '\r']) {
            Some(idx) => {
                let line = &rest[..idx];
                let skip = if rest[idx..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[idx + skip..];
                Some(line)
            }
            None => {
                let line = rest;
                rest = "";
                Some(line)
            }
        }
    })
}
