//! Intermediate to human name tables loaded from CSV.
//!
//! Layouts seen in the wild:
//!
//! - `searge,name,side,desc` (fields/methods, documentation in column 4)
//! - `param,name,side` (parameters)
//! - `intermediate,human,documentation` (hand-written tables)
//!
//! Fields follow RFC 4180 quoting; backslash is not an escape character, so
//! documentation keeps literal `\n` sequences for the javadoc writer to split.

use crate::error::{read_text, MappingError};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameEntry {
    pub name: String,
    pub doc: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameTable {
    entries: BTreeMap<String, NameEntry>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let text = read_text(path)?;
        Self::parse(&text, path)
    }

    /// Load `path` if given, else return an empty table.
    pub fn load_opt(path: Option<&Path>) -> Result<Self, MappingError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::new()),
        }
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, MappingError> {
        let mut table = Self::new();
        for record in parse_records(text, path)? {
            let CsvRecord { line, fields } = record;
            if fields.iter().all(|f| f.is_empty()) {
                continue;
            }
            if matches!(fields[0].as_str(), "searge" | "param") {
                continue;
            }
            if fields.len() < 2 {
                return Err(MappingError::syntax(
                    path,
                    line,
                    "expected at least two columns",
                ));
            }

            let doc = match fields.len() {
                0..=2 => None,
                3 => Some(&fields[2]).filter(|col| !is_side_marker(col)),
                _ => Some(&fields[3]),
            }
            .filter(|doc| !doc.is_empty())
            .cloned();

            table.insert(fields[0].clone(), fields[1].clone(), doc);
        }

        tracing::debug!(
            target = "retro.mappings",
            path = %path.display(),
            entries = table.len(),
            "loaded name table"
        );
        Ok(table)
    }

    pub fn insert(&mut self, intermediate: impl Into<String>, name: impl Into<String>, doc: Option<String>) {
        self.entries.insert(
            intermediate.into(),
            NameEntry {
                name: name.into(),
                doc,
            },
        );
    }

    pub fn get(&self, intermediate: &str) -> Option<&NameEntry> {
        self.entries.get(intermediate)
    }

    /// Human name for `intermediate`, if the table has one.
    pub fn name(&self, intermediate: &str) -> Option<&str> {
        self.entries.get(intermediate).map(|e| e.name.as_str())
    }

    pub fn doc(&self, intermediate: &str) -> Option<&str> {
        self.entries
            .get(intermediate)
            .and_then(|e| e.doc.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NameEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_side_marker(col: &str) -> bool {
    !col.is_empty() && col.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRecord {
    /// 1-based line on which the record starts.
    pub line: usize,
    pub fields: Vec<String>,
}

/// Split CSV text into records.
///
/// Quoted fields may contain commas, doubled quotes and line breaks.
pub fn parse_records(text: &str, path: &Path) -> Result<Vec<CsvRecord>, MappingError> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut record_line = 1usize;
    let mut quote_line = 1usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                quote_line = line;
            }
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                fields.push(std::mem::take(&mut field));
                records.push(CsvRecord {
                    line: record_line,
                    fields: std::mem::take(&mut fields),
                });
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(MappingError::syntax(path, quote_line, "unterminated quoted field"));
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push(CsvRecord {
            line: record_line,
            fields,
        });
    }
    Ok(records)
}
