//! Loading patch files from single files, directories and zip/jar archives.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::diff::{parse_patch, PatchSpec};
use crate::error::PatchError;

const PATCH_EXTENSION: &str = ".patch";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchFile {
    /// Path relative to the bundle root, or the file path for single-file bundles.
    pub name: String,
    pub bundle: PathBuf,
    pub text: String,
}

impl PatchFile {
    pub fn specs(&self) -> Result<Vec<PatchSpec>, PatchError> {
        parse_patch(&self.text, &self.name)
    }

    fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// Read every file of a bundle, sorted by name.
pub fn load_bundle(path: &Path) -> Result<Vec<PatchFile>, PatchError> {
    let mut files = Vec::new();

    if path.is_dir() {
        for entry in walkdir::WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|err| PatchError::Bundle {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(path)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let text = std::fs::read_to_string(entry.path()).map_err(|source| PatchError::Io {
                path: entry.path().to_path_buf(),
                source,
            })?;
            files.push(PatchFile {
                name: rel,
                bundle: path.to_path_buf(),
                text,
            });
        }
    } else if is_archive(path) {
        let entries = retro_archive::Archive::new(path)
            .entries()
            .map_err(|err| PatchError::Bundle {
                path: path.to_path_buf(),
                message: format!("{err:#}"),
            })?;
        for (name, bytes) in entries {
            let text = String::from_utf8(bytes).map_err(|_| PatchError::Bundle {
                path: path.to_path_buf(),
                message: format!("{name} is not valid UTF-8"),
            })?;
            files.push(PatchFile {
                name,
                bundle: path.to_path_buf(),
                text,
            });
        }
    } else {
        let text = std::fs::read_to_string(path).map_err(|source| PatchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        files.push(PatchFile {
            name: path.display().to_string(),
            bundle: path.to_path_buf(),
            text,
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::debug!(
        target = "retro.patch",
        bundle = %path.display(),
        files = files.len(),
        "loaded patch bundle"
    );
    Ok(files)
}

fn is_archive(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("zip" | "jar")
    )
}

/// Group patch files by base name: `Foo.java.patch`, `Foo.java.patch2`, ...
/// all land under `Foo.java.patch`, ordered by their numeric suffix.
///
/// Files without `.patch` in their name are dropped.
pub fn group_by_base_name(files: Vec<PatchFile>) -> Vec<(String, Vec<PatchFile>)> {
    let mut groups: BTreeMap<String, Vec<(u32, PatchFile)>> = BTreeMap::new();
    for file in files {
        let name = file.file_name();
        let Some(idx) = name.rfind(PATCH_EXTENSION) else {
            continue;
        };
        let split = idx + PATCH_EXTENSION.len();
        let base = name[..split].to_owned();
        let rank = name[split..].parse().unwrap_or(0);
        groups.entry(base).or_default().push((rank, file));
    }

    groups
        .into_iter()
        .map(|(base, mut files)| {
            files.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name.cmp(&b.1.name)));
            (base, files.into_iter().map(|(_, file)| file).collect())
        })
        .collect()
}
