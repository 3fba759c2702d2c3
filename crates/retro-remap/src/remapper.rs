use std::collections::BTreeMap;
use std::sync::OnceLock;

use rayon::prelude::*;
use regex::{Captures, Regex};

use crate::error::RemapError;
use crate::javadoc::build_javadoc;
use crate::tables::{GenericEntry, GenericSlot, RemapTables};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JavadocMode {
    /// Insert formatted javadoc comments.
    #[default]
    Full,
    /// Insert `// DOCSTUB` markers naming the documented symbol.
    Dummy,
    Skip,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemapOptions {
    pub javadoc: JavadocMode,
}

/// What one [`Remapper::remap_all`] run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemapSummary {
    pub files: usize,
    pub generics_applied: usize,
    pub unused_generics: Vec<GenericEntry>,
}

#[derive(Debug)]
pub struct RemappedFile {
    pub text: String,
    /// Index into the generic table for every suffix inserted.
    pub generic_uses: Vec<usize>,
}

fn srg_finder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(func_\d+_[a-zA-Z_]+|field_\d+_[a-zA-Z_]+|p_\w+_\d+_)([^\w$]|$)")
            .expect("valid regex")
    })
}

fn method_definition() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^((?: {4})+|\t+)(?:[\w$.\[\]]+ )+([0-9a-zA-Z_]+)\(").expect("valid regex")
    })
}

fn constructor_definition() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^((?: {4})+|\t+)(?:[\w$.\[\]]+ )*([a-zA-Z0-9_]+)\(").expect("valid regex")
    })
}

fn field_definition() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^((?: {4})+|\t+)(?:[\w$.\[\]]+ )+(field_[0-9]+_[a-zA-Z_]+) *(?:=|;)")
            .expect("valid regex")
    })
}

const DOC_MARKERS: [&str; 2] = ["// DOCSTUB", "// JAVADOC"];

/// Rewrites intermediate names in source text to human names.
pub struct Remapper {
    tables: RemapTables,
    options: RemapOptions,
}

impl Remapper {
    pub fn new(tables: RemapTables, options: RemapOptions) -> Self {
        Self { tables, options }
    }

    pub fn tables(&self) -> &RemapTables {
        &self.tables
    }

    /// Remap every `.java` buffer in place, files in parallel.
    ///
    /// Either every file is rewritten or, on error, none is.
    pub fn remap_all(
        &self,
        sources: &mut BTreeMap<String, String>,
    ) -> Result<RemapSummary, RemapError> {
        let remapped: Vec<(String, RemappedFile)> = sources
            .par_iter()
            .map(|(path, text)| self.remap_file(path, text).map(|file| (path.clone(), file)))
            .collect::<Result<_, RemapError>>()?;

        let mut uses = vec![0usize; self.tables.generics.entries().len()];
        let files = remapped.len();
        for (path, file) in remapped {
            for idx in file.generic_uses {
                uses[idx] += 1;
            }
            sources.insert(path, file.text);
        }

        let mut unused = Vec::new();
        for (entry, &count) in self.tables.generics.entries().iter().zip(&uses) {
            if count == 0 {
                tracing::error!(
                    target = "retro.remap",
                    file = %entry.file,
                    key = %entry.key,
                    slot = %entry.slot,
                    suffix = %entry.suffix,
                    "generic entry was never applied"
                );
                unused.push(entry.clone());
            }
        }
        let generics_applied = uses.iter().sum();
        if !self.tables.generics.is_empty() {
            tracing::info!(
                target = "retro.remap",
                applied = generics_applied,
                "applied {generics_applied} missing generics"
            );
        }

        Ok(RemapSummary {
            files,
            generics_applied,
            unused_generics: unused,
        })
    }

    /// Remap one file. `file` is its path inside the artifact.
    pub fn remap_file(&self, file: &str, text: &str) -> Result<RemappedFile, RemapError> {
        let eol = first_terminator(text);
        let mut out: Vec<(String, &str)> = Vec::new();
        let mut generic_uses = Vec::new();
        let docs = self.options.javadoc != JavadocMode::Skip;

        for (idx, (line, terminator)) in split_terminated(text).enumerate() {
            let line_no = idx + 1;
            let mut new_line = line.to_owned();
            let trimmed = line.trim_start();

            if !trimmed.starts_with("return ") {
                if let Some(caps) = method_definition()
                    .captures(line)
                    .filter(|c| !c[2].starts_with(|ch: char| ch.is_uppercase()))
                {
                    let (indent, name) = (&caps[1], &caps[2]);
                    if docs {
                        if let Some(doc) = self.tables.methods.doc(name) {
                            let lines = self.doc_lines(indent, "METHOD", name, doc, true);
                            insert_before_annotations(&mut out, lines, eol);
                        }
                    }
                    for (entry_idx, entry) in self.tables.generics.lookup(name) {
                        if self.generic_applies(file, entry, &new_line) {
                            new_line = inject_generic(file, line_no, &new_line, entry)?;
                            generic_uses.push(entry_idx);
                        }
                    }
                } else if docs && DOC_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
                    if let Some(lines) = self.resolve_marker(line) {
                        let mut lines = lines.into_iter();
                        if let Some(first) = lines.next() {
                            new_line = first;
                        }
                        for extra in lines {
                            out.push((std::mem::replace(&mut new_line, extra), eol));
                        }
                    }
                } else if let Some(caps) = field_definition().captures(line) {
                    let (indent, name) = (&caps[1], &caps[2]);
                    if docs {
                        if let Some(doc) = self.tables.fields.doc(name) {
                            let lines = self.doc_lines(indent, "FIELD", name, doc, false);
                            insert_before_annotations(&mut out, lines, eol);
                        }
                    }
                    for (entry_idx, entry) in self.tables.generics.lookup(name) {
                        if self.generic_applies(file, entry, &new_line) {
                            new_line = inject_generic(file, line_no, &new_line, entry)?;
                            generic_uses.push(entry_idx);
                        }
                    }
                } else if constructor_definition().is_match(line) && !self.tables.generics.is_empty() {
                    if let Some(sig) = constructor_signature(line) {
                        let key = format!("{file}@init:{sig}");
                        for (entry_idx, entry) in self.tables.generics.lookup(&key) {
                            if self.generic_applies(file, entry, &new_line) {
                                new_line = inject_generic(file, line_no, &new_line, entry)?;
                                generic_uses.push(entry_idx);
                            }
                        }
                    }
                }
            }

            if !self.tables.generics.is_empty() {
                new_line = new_line.replace("(Object)null", "null");
            }
            new_line = self.rename(&new_line);
            for patch in self.tables.patches.for_file(file) {
                if new_line.contains(&patch.contains) {
                    new_line = new_line.replace(&patch.replace, &patch.with);
                }
            }
            out.push((new_line, terminator));
        }

        let mut text = String::with_capacity(text.len());
        for (line, terminator) in out {
            text.push_str(&line);
            text.push_str(terminator);
        }
        Ok(RemappedFile { text, generic_uses })
    }

    /// Substitute every intermediate name on `line` that has a human name.
    pub fn rename(&self, line: &str) -> String {
        srg_finder()
            .replace_all(line, |caps: &Captures<'_>| {
                let found = &caps[1];
                let mapped = if found.starts_with("p_") {
                    self.tables.params.name(found)
                } else if found.starts_with("func_") {
                    self.tables.methods.name(found)
                } else {
                    self.tables.fields.name(found)
                };
                format!("{}{}", mapped.unwrap_or(found), &caps[2])
            })
            .into_owned()
    }

    fn doc_lines(&self, indent: &str, kind: &str, name: &str, doc: &str, is_method: bool) -> Vec<String> {
        match self.options.javadoc {
            JavadocMode::Dummy => vec![format!("{indent}// DOCSTUB {kind} $$ {name}")],
            _ => build_javadoc(indent, doc, is_method),
        }
    }

    fn resolve_marker(&self, line: &str) -> Option<Vec<String>> {
        let name = srg_finder().captures(line)?.get(1)?.as_str();
        let indent_len = DOC_MARKERS
            .iter()
            .find_map(|m| line.find(m))
            .unwrap_or(0);
        let indent = &line[..indent_len];
        let doc = if name.starts_with("func_") {
            self.tables.methods.doc(name)?
        } else if name.starts_with("field_") {
            self.tables.fields.doc(name)?
        } else {
            return None;
        };
        Some(build_javadoc(indent, doc, true))
    }

    fn generic_applies(&self, file: &str, entry: &GenericEntry, line: &str) -> bool {
        entry.file == file && line.contains(entry.simple_type_name())
    }
}

/// Insert `lines` above any annotation lines at the end of `out`.
fn insert_before_annotations<'t>(out: &mut Vec<(String, &'t str)>, lines: Vec<String>, eol: &'t str) {
    let mut pos = out.len();
    while pos > 0 && out[pos - 1].0.trim_start().starts_with('@') {
        pos -= 1;
    }
    out.splice(pos..pos, lines.into_iter().map(|line| (line, eol)));
}

fn inject_generic(file: &str, line_no: usize, line: &str, entry: &GenericEntry) -> Result<String, RemapError> {
    let at = match entry.slot {
        GenericSlot::Return => line
            .find('(')
            .and_then(|paren| line[..paren].rfind(' ')),
        GenericSlot::Field => line.find(" field_"),
        GenericSlot::Param(n) => param_type_end(line, n),
    };
    let Some(at) = at else {
        return Err(RemapError::GenericBoundary {
            file: file.to_owned(),
            line: line_no,
            param: entry.slot.to_string(),
            suffix: entry.suffix.clone(),
            text: line.to_owned(),
        });
    };
    let mut out = String::with_capacity(line.len() + entry.suffix.len());
    out.push_str(&line[..at]);
    out.push_str(&entry.suffix);
    out.push_str(&line[at..]);
    Ok(out)
}

/// Byte offset just past the type of parameter `n`.
///
/// Parameters are split on commas outside `()` and `<>`; a leading `final`
/// is skipped.
fn param_type_end(line: &str, n: usize) -> Option<usize> {
    let open = line.find('(')?;
    let bytes = line.as_bytes();
    let mut start = open + 1;
    let mut depth = 0usize;
    let mut seen = 0usize;
    let mut idx = start;
    while seen < n {
        match *bytes.get(idx)? {
            b'(' | b'<' => depth += 1,
            b')' if depth == 0 => return None,
            b')' | b'>' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                seen += 1;
                start = idx + 1;
            }
            _ => {}
        }
        idx += 1;
    }

    while bytes.get(start).is_some_and(u8::is_ascii_whitespace) {
        start += 1;
    }
    let mut split = top_level_space(line, start)?;
    while line[..split].trim_end().ends_with("final") {
        split = top_level_space(line, split + 1)?;
    }
    Some(split)
}

fn top_level_space(line: &str, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, b) in line.bytes().enumerate().skip(from) {
        match b {
            b'<' => depth += 1,
            b'>' => depth = depth.saturating_sub(1),
            b' ' if depth == 0 => return Some(idx),
            _ => {}
        }
    }
    None
}

/// `Name:Type1,Type2` for a constructor declaration line.
fn constructor_signature(line: &str) -> Option<String> {
    let open = line.find('(')?;
    let close = line.find(')')?;
    let head = line[..open].trim();
    let name = head.rsplit(' ').next()?;
    let args = &line[open + 1..close];
    let types = if args.trim().is_empty() {
        Vec::new()
    } else {
        args.split(',')
            .map(|arg| {
                let arg = arg.trim();
                arg.rfind(' ').map(|idx| arg[..idx].trim())
            })
            .collect::<Option<Vec<_>>>()?
    };
    Some(format!("{name}:{}", types.join(",")))
}

fn first_terminator(text: &str) -> &'static str {
    match text.find(['\n', '\r']) {
        Some(idx) if text[idx..].starts_with("\r\n") => "\r\n",
        Some(idx) if text[idx..].starts_with('\r') => "\r",
        _ => "\n",
    }
}

/// Lines paired with their own terminator; the last may have none.
fn split_terminated(text: &str) -> impl Iterator<Item = (&str, &str)> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let (line, terminator, tail) = match rest.find(['\n', '\r']) {
            Some(idx) => {
                let len = if rest[idx..].starts_with("\r\n") { 2 } else { 1 };
                (&rest[..idx], &rest[idx..idx + len], &rest[idx + len..])
            }
            None => (rest, "", ""),
        };
        rest = tail;
        Some((line, terminator))
    })
}
