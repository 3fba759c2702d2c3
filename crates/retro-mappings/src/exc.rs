//! Exception tables: `owner.name(desc)=exceptions|params`.

use crate::error::{read_text, MappingError};
use crate::names::NameTable;
use std::path::{Path, PathBuf};

/// Rewrite the method name of one exception-table line through `methods`.
///
/// Only the segment between the first `.` and the first `(` changes; lines that
/// don't look like method entries come back unchanged.
pub fn remap_exc_line(line: &str, methods: &NameTable) -> String {
    let (key, value) = match line.split_once('=') {
        Some((key, value)) => (key, Some(value)),
        None => (line, None),
    };

    let (Some(dot), Some(sig)) = (key.find('.'), key.find('(')) else {
        return line.to_owned();
    };
    if dot > sig {
        return line.to_owned();
    }

    let name = &key[dot + 1..sig];
    let Some(human) = methods.name(name) else {
        return line.to_owned();
    };

    let mut out = String::with_capacity(line.len() + human.len());
    out.push_str(&key[..=dot]);
    out.push_str(human);
    out.push_str(&key[sig..]);
    if let Some(value) = value {
        out.push('=');
        out.push_str(value);
    }
    out
}

/// Intermediate and human-named exception tables merged from several files.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExcTables {
    pub intermediate: String,
    pub human: String,
}

impl ExcTables {
    /// Merge `files` in order, rewriting each line for the human table.
    pub fn merge(files: &[PathBuf], methods: &NameTable) -> Result<Self, MappingError> {
        let mut tables = Self::default();
        for file in files {
            tables.append(file, &read_text(file)?, methods);
        }
        Ok(tables)
    }

    fn append(&mut self, path: &Path, text: &str, methods: &NameTable) {
        let mut lines = 0usize;
        for line in text.lines() {
            self.intermediate.push_str(line);
            self.intermediate.push('\n');
            self.human.push_str(&remap_exc_line(line, methods));
            self.human.push('\n');
            lines += 1;
        }
        tracing::debug!(
            target = "retro.mappings",
            path = %path.display(),
            lines,
            "merged exception table"
        );
    }
}
