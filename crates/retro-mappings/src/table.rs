use crate::error::{read_text, MappingError};
use std::fmt;
use std::fmt::Write as _;
use std::path::Path;

/// A method reference as written in mapping files: `owner/name` plus descriptor.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodRef {
    pub name: String,
    pub desc: String,
}

impl MethodRef {
    pub fn new(name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
        }
    }

    /// The part of `name` after the last `/`.
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.desc)
    }
}

/// One mapping table in line format (`PK:`, `CL:`, `FD:`, `MD:`).
///
/// Entries keep the order in which they were read or generated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MappingTable {
    pub packages: Vec<(String, String)>,
    pub classes: Vec<(String, String)>,
    pub fields: Vec<(String, String)>,
    pub methods: Vec<(MethodRef, MethodRef)>,
}

impl MappingTable {
    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let text = read_text(path)?;
        Self::parse(&text, path)
    }

    /// Parse mapping lines. `path` is only used for error messages.
    ///
    /// Blank lines and `#` comments are ignored.
    pub fn parse(text: &str, path: &Path) -> Result<Self, MappingError> {
        let mut table = Self::default();
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((kind, rest)) = line.split_once(':') else {
                return Err(MappingError::syntax(path, line_no, "missing record kind"));
            };
            let parts: Vec<&str> = rest.split_whitespace().collect();
            let expect = |n: usize| {
                if parts.len() == n {
                    Ok(())
                } else {
                    Err(MappingError::syntax(
                        path,
                        line_no,
                        format!("{kind} record needs {n} fields, found {}", parts.len()),
                    ))
                }
            };

            match kind {
                "PK" => {
                    expect(2)?;
                    table.packages.push((parts[0].to_owned(), parts[1].to_owned()));
                }
                "CL" => {
                    expect(2)?;
                    table.classes.push((parts[0].to_owned(), parts[1].to_owned()));
                }
                "FD" => {
                    expect(2)?;
                    table.fields.push((parts[0].to_owned(), parts[1].to_owned()));
                }
                "MD" => {
                    expect(4)?;
                    table.methods.push((
                        MethodRef::new(parts[0], parts[1]),
                        MethodRef::new(parts[2], parts[3]),
                    ));
                }
                other => {
                    return Err(MappingError::syntax(
                        path,
                        line_no,
                        format!("unknown record kind {other:?}"),
                    ))
                }
            }
        }
        Ok(table)
    }

    /// Render the table in line format, `\n`-terminated.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (from, to) in &self.packages {
            let _ = writeln!(out, "PK: {from} {to}");
        }
        for (from, to) in &self.classes {
            let _ = writeln!(out, "CL: {from} {to}");
        }
        for (from, to) in &self.fields {
            let _ = writeln!(out, "FD: {from} {to}");
        }
        for (from, to) in &self.methods {
            let _ = writeln!(out, "MD: {from} {to}");
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> Result<(), MappingError> {
        retro_cache::atomic_write(path, self.render().as_bytes())?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.packages.len() + self.classes.len() + self.fields.len() + self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn short_name(name: &str) -> &str {
    match name.rfind('/') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// Replace the segment after the last `/`, keeping the owner prefix.
pub(crate) fn with_short_name(name: &str, short: &str) -> String {
    match name.rfind('/') {
        Some(idx) => format!("{}{}", &name[..=idx], short),
        None => short.to_owned(),
    }
}
