use std::collections::HashMap;
use std::path::{Path, PathBuf};

use retro_mappings::{parse_records, CsvRecord, NameTable};

use crate::error::RemapError;

/// Where a generic suffix goes on its declaration line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenericSlot {
    /// After the return type.
    Return,
    /// After the type of the n-th (0-based) parameter.
    Param(usize),
    /// After the field type.
    Field,
}

impl std::fmt::Display for GenericSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenericSlot::Return => f.write_str("@return"),
            GenericSlot::Param(n) => write!(f, "{n}"),
            GenericSlot::Field => f.write_str("@field"),
        }
    }
}

/// One missing generic type argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenericEntry {
    /// Source file the entry is scoped to.
    pub file: String,
    pub class_name: String,
    /// Lookup key: the intermediate name, or `<file>@init:<Name>:<Types>` for
    /// constructors.
    pub key: String,
    pub slot: GenericSlot,
    /// Fully qualified raw type; its simple name must occur on the line.
    pub type_name: String,
    pub suffix: String,
}

impl GenericEntry {
    pub fn simple_type_name(&self) -> &str {
        self.type_name.rsplit('.').next().unwrap_or(&self.type_name)
    }
}

#[derive(Clone, Debug, Default)]
pub struct GenericTable {
    entries: Vec<GenericEntry>,
    by_key: HashMap<String, Vec<usize>>,
}

impl GenericTable {
    /// Columns: file, class, intermediate name (`:line` suffix ignored),
    /// human name, slot (`@return`, `@field` or a parameter index), type, suffix.
    pub fn load(path: &Path) -> Result<Self, RemapError> {
        let text = read(path)?;
        let mut table = Self::default();
        for CsvRecord { line, fields } in parse_records(&text, path)? {
            if fields.first().map(String::as_str) == Some("zipEntry") || is_blank(&fields) {
                continue;
            }
            if fields.len() < 7 {
                return Err(table_error(path, line, "expected at least 7 columns"));
            }

            let file = fields[0].clone();
            let srg = fields[2].as_str();
            let bare = srg.split(':').next().unwrap_or(srg);
            let key = if bare == "@init" {
                format!("{file}{srg}")
            } else {
                bare.to_owned()
            };
            let slot = match fields[4].as_str() {
                "@return" => GenericSlot::Return,
                "@field" | "" => GenericSlot::Field,
                n => GenericSlot::Param(n.parse().map_err(|_| {
                    table_error(path, line, format!("invalid parameter index {n:?}"))
                })?),
            };
            table.push(GenericEntry {
                file,
                class_name: fields[1].clone(),
                key,
                slot,
                type_name: fields[5].clone(),
                suffix: fields[6].clone(),
            });
        }
        Ok(table)
    }

    pub fn push(&mut self, entry: GenericEntry) {
        self.by_key
            .entry(entry.key.clone())
            .or_default()
            .push(self.entries.len());
        self.entries.push(entry);
    }

    /// Entries for `key` with their index into [`GenericTable::entries`].
    pub fn lookup<'a>(&'a self, key: &str) -> impl Iterator<Item = (usize, &'a GenericEntry)> + 'a {
        self.by_key
            .get(key)
            .into_iter()
            .flatten()
            .map(|&idx| (idx, &self.entries[idx]))
    }

    pub fn entries(&self) -> &[GenericEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A literal replacement applied to lines of one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinePatch {
    pub file: String,
    pub class_name: String,
    /// Only lines containing this text are touched.
    pub contains: String,
    pub replace: String,
    pub with: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct LinePatches {
    by_file: HashMap<String, Vec<LinePatch>>,
}

impl LinePatches {
    /// Columns: file, class, filter, text to replace, replacement, reason.
    pub fn load(path: &Path) -> Result<Self, RemapError> {
        let text = read(path)?;
        let mut patches = Self::default();
        for CsvRecord { line, fields } in parse_records(&text, path)? {
            if fields.first().map(String::as_str) == Some("zipEntry") || is_blank(&fields) {
                continue;
            }
            if fields.len() < 5 {
                return Err(table_error(path, line, "expected at least 5 columns"));
            }
            patches.push(LinePatch {
                file: fields[0].clone(),
                class_name: fields[1].clone(),
                contains: fields[2].clone(),
                replace: fields[3].clone(),
                with: fields[4].clone(),
                reason: fields.get(5).cloned().unwrap_or_default(),
            });
        }
        Ok(patches)
    }

    pub fn push(&mut self, patch: LinePatch) {
        self.by_file.entry(patch.file.clone()).or_default().push(patch);
    }

    pub fn for_file(&self, file: &str) -> &[LinePatch] {
        self.by_file.get(file).map_or(&[], Vec::as_slice)
    }
}

/// CSV files a [`RemapTables`] is loaded from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemapInputs {
    pub fields_csv: PathBuf,
    pub methods_csv: PathBuf,
    pub params_csv: Option<PathBuf>,
    pub generics_csv: Option<PathBuf>,
    pub generic_patches_csv: Option<PathBuf>,
}

/// Everything the remapper looks names up in.
#[derive(Clone, Debug, Default)]
pub struct RemapTables {
    pub fields: NameTable,
    pub methods: NameTable,
    pub params: NameTable,
    pub generics: GenericTable,
    pub patches: LinePatches,
}

impl RemapTables {
    pub fn load(inputs: &RemapInputs) -> Result<Self, RemapError> {
        let tables = Self {
            fields: NameTable::load(&inputs.fields_csv)?,
            methods: NameTable::load(&inputs.methods_csv)?,
            params: NameTable::load_opt(inputs.params_csv.as_deref())?,
            generics: match &inputs.generics_csv {
                Some(path) => GenericTable::load(path)?,
                None => GenericTable::default(),
            },
            patches: match &inputs.generic_patches_csv {
                Some(path) => LinePatches::load(path)?,
                None => LinePatches::default(),
            },
        };
        tracing::debug!(
            target = "retro.remap",
            fields = tables.fields.len(),
            methods = tables.methods.len(),
            params = tables.params.len(),
            generics = tables.generics.entries().len(),
            "loaded remap tables"
        );
        Ok(tables)
    }
}

fn read(path: &Path) -> Result<String, RemapError> {
    std::fs::read_to_string(path).map_err(|source| {
        retro_mappings::MappingError::Io {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

fn is_blank(fields: &[String]) -> bool {
    fields.iter().all(|f| f.is_empty())
}

fn table_error(path: &Path, line: usize, message: impl Into<String>) -> RemapError {
    RemapError::Table {
        path: path.to_path_buf(),
        line,
        message: message.into(),
    }
}
