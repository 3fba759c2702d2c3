//! Reading and writing jar-like artifacts.
//!
//! Every pipeline stage consumes one archive and produces another. Stages never
//! edit an archive in place: they load it into an [`Artifact`], transform the
//! in-memory entries, and write a fresh archive with [`Artifact::save`].
//!
//! Output archives are reproducible. Entries are written in a stable order with a
//! fixed timestamp so that hashing an output is stable across runs.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Extension that marks an entry as patchable source text.
pub const SOURCE_EXTENSION: &str = ".java";

const META_INF: &str = "META-INF/";

/// A directory tree or zip file viewed as a flat set of `/`-separated entries.
#[derive(Clone, Debug)]
pub struct Archive {
    path: PathBuf,
}

impl Archive {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a single entry.
    ///
    /// Returns `Ok(None)` when the entry isn't present.
    pub fn read(&self, name: &str) -> anyhow::Result<Option<Vec<u8>>> {
        if self.path.is_dir() {
            let candidate = self.path.join(name);
            if !candidate.is_file() {
                return Ok(None);
            }
            let bytes = std::fs::read(&candidate)
                .with_context(|| format!("failed to read {}", candidate.display()))?;
            return Ok(Some(bytes));
        }

        let mut zip = self.open_zip()?;
        let result = match zip.by_name(name) {
            Ok(mut entry) => {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf).with_context(|| {
                    format!("failed to read {} from {}", name, self.path.display())
                })?;
                Ok(Some(buf))
            }
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(err) => Err(err).with_context(|| {
                format!("failed to read {} from zip {}", name, self.path.display())
            }),
        };
        result
    }

    /// Read every file entry, keyed by its `/`-separated relative path.
    ///
    /// Directory entries are skipped.
    pub fn entries(&self) -> anyhow::Result<BTreeMap<String, Vec<u8>>> {
        let mut out = BTreeMap::new();

        if self.path.is_dir() {
            for entry in walkdir::WalkDir::new(&self.path).follow_links(false) {
                let entry = entry
                    .with_context(|| format!("failed to walk {}", self.path.display()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(&self.path)
                    .with_context(|| format!("{} escaped its root", entry.path().display()))?;
                let name = normalize_rel_path(rel);
                let bytes = std::fs::read(entry.path())
                    .with_context(|| format!("failed to read {}", entry.path().display()))?;
                out.insert(name, bytes);
            }
            return Ok(out);
        }

        let mut zip = self.open_zip()?;
        for idx in 0..zip.len() {
            let mut entry = zip.by_index(idx).with_context(|| {
                format!("failed to read entry #{idx} from {}", self.path.display())
            })?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_owned();
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut buf)
                .with_context(|| format!("failed to read {} from {}", name, self.path.display()))?;
            out.insert(name, buf);
        }
        Ok(out)
    }

    /// Extract all entries below `dest`, rejecting entries that would escape it.
    pub fn extract_to(&self, dest: &Path) -> anyhow::Result<usize> {
        let mut zip = self.open_zip()?;
        let mut written = 0usize;
        for idx in 0..zip.len() {
            let mut entry = zip.by_index(idx).with_context(|| {
                format!("failed to read entry #{idx} from {}", self.path.display())
            })?;
            let Some(rel) = entry.enclosed_name() else {
                anyhow::bail!(
                    "refusing to extract {:?} from {}: path escapes the destination",
                    entry.name(),
                    self.path.display()
                );
            };
            let target = dest.join(rel);
            if entry.is_dir() {
                std::fs::create_dir_all(&target)
                    .with_context(|| format!("failed to create {}", target.display()))?;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let mut out = File::create(&target)
                .with_context(|| format!("failed to create {}", target.display()))?;
            std::io::copy(&mut entry, &mut out)
                .with_context(|| format!("failed to extract {}", target.display()))?;
            written += 1;
        }

        tracing::debug!(
            target = "retro.archive",
            archive = %self.path.display(),
            dest = %dest.display(),
            entries = written,
            "extracted archive"
        );
        Ok(written)
    }

    fn open_zip(&self) -> anyhow::Result<ZipArchive<File>> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open archive {}", self.path.display()))?;
        ZipArchive::new(file)
            .with_context(|| format!("failed to read zip {}", self.path.display()))
    }
}

/// In-memory working copy of a jar: opaque resources plus UTF-8 sources.
///
/// An entry lives in exactly one of the two maps. `.java` entries are sources,
/// everything else is a resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Artifact {
    resources: BTreeMap<String, Vec<u8>>,
    sources: BTreeMap<String, String>,
}

impl Artifact {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an artifact from a zip file or directory.
    ///
    /// `META-INF/` entries are dropped: signatures and manifests of the input do
    /// not describe the transformed output.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut artifact = Self::new();
        for (name, bytes) in Archive::new(path).entries()? {
            if name.starts_with(META_INF) {
                continue;
            }
            artifact
                .insert(name.clone(), bytes)
                .with_context(|| format!("failed to load {} from {}", name, path.display()))?;
        }

        tracing::debug!(
            target = "retro.archive",
            path = %path.display(),
            sources = artifact.sources.len(),
            resources = artifact.resources.len(),
            "loaded artifact"
        );
        Ok(artifact)
    }

    /// Write the artifact as a zip archive at `path`.
    ///
    /// The archive is written to a temporary sibling first and renamed into place,
    /// so `path` is either the complete new archive or untouched.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".artifact-")
            .suffix(".tmp")
            .tempfile_in(parent)
            .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
        self.write_zip(tmp.as_file_mut())
            .with_context(|| format!("failed to write archive {}", path.display()))?;
        tmp.as_file_mut()
            .sync_all()
            .with_context(|| format!("failed to sync archive {}", path.display()))?;
        tmp.persist(path)
            .with_context(|| format!("failed to move archive into {}", path.display()))?;
        Ok(())
    }

    fn write_zip<W: Write + std::io::Seek>(&self, writer: W) -> anyhow::Result<()> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        let mut zip = ZipWriter::new(writer);
        for (name, bytes) in &self.resources {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }
        for (name, text) in &self.sources {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(text.as_bytes())?;
        }
        zip.finish()?;
        Ok(())
    }

    /// Insert an entry, routing it to sources or resources by extension.
    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> anyhow::Result<()> {
        let name = name.into();
        if is_source_path(&name) {
            let text = String::from_utf8(bytes)
                .with_context(|| format!("source entry {name} is not valid UTF-8"))?;
            self.insert_source(name, text);
        } else {
            self.insert_resource(name, bytes);
        }
        Ok(())
    }

    pub fn insert_source(&mut self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        self.resources.remove(&name);
        self.sources.insert(name, text.into());
    }

    pub fn insert_resource(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        self.sources.remove(&name);
        self.resources.insert(name, bytes);
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.sources.remove(name).is_some() | self.resources.remove(name).is_some()
    }

    #[must_use]
    pub fn source(&self, name: &str) -> Option<&str> {
        self.sources.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&[u8]> {
        self.resources.get(name).map(Vec::as_slice)
    }

    #[must_use]
    pub fn sources(&self) -> &BTreeMap<String, String> {
        &self.sources
    }

    pub fn sources_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.sources
    }

    #[must_use]
    pub fn resources(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.resources
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len() + self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.resources.is_empty()
    }
}

#[must_use]
pub fn is_source_path(name: &str) -> bool {
    name.ends_with(SOURCE_EXTENSION)
}

fn normalize_rel_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
