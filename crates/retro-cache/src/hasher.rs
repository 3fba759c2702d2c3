//! Content digests over the declared inputs of a pipeline stage.
//!
//! Every input is framed with a one-byte tag and, for variable-length data, a
//! little-endian length prefix, so adjacent inputs can never run together
//! (`"ab" + "c"` hashes differently from `"a" + "bc"`).

use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Bytes folded in for an optional input that is not present.
///
/// Distinct from every real input, including empty strings and empty files.
pub const ABSENT_SENTINEL: &[u8] = b"\xA5retro:absent-input\xA5";

const TAG_BYTES: u8 = 0x01;
const TAG_STR: u8 = 0x02;
const TAG_I32: u8 = 0x03;
const TAG_I64: u8 = 0x04;
const TAG_BOOL: u8 = 0x05;
const TAG_FILE: u8 = 0x10;
const TAG_FILES: u8 = 0x11;
const TAG_DIR: u8 = 0x12;
const TAG_ABSENT: u8 = 0x7f;

/// One declared input of a stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HashInput {
    Bytes(Vec<u8>),
    Str(String),
    I32(i32),
    I64(i64),
    Bool(bool),
    /// A required file, hashed by content.
    File(PathBuf),
    /// A file that may legitimately be missing from the configuration.
    OptionalFile(Option<PathBuf>),
    /// A set of files; declaration order does not matter.
    Files(Vec<PathBuf>),
    /// A required directory, hashed recursively.
    Dir(PathBuf),
    OptionalDir(Option<PathBuf>),
    Absent,
}

impl HashInput {
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self::Dir(path.into())
    }
}

#[derive(Clone, Copy, Debug)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
    digest: [u8; 32],
}

/// Memoized per-file content digests keyed by absolute path.
///
/// An entry is reused only while the file's modification time and length are
/// unchanged. Share one instance (via `Arc`) across every hasher in a build.
#[derive(Debug, Default)]
pub struct FileHashCache {
    entries: Mutex<HashMap<PathBuf, FileStamp>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FileHashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// SHA-256 of the file at `path`, reading it only if it changed since the
    /// last call.
    pub fn file_digest(&self, path: &Path) -> Result<[u8; 32], CacheError> {
        let input_err = |source| CacheError::Input {
            path: path.to_path_buf(),
            source,
        };
        let abs = std::fs::canonicalize(path).map_err(input_err)?;
        let meta = std::fs::metadata(&abs).map_err(input_err)?;
        if !meta.is_file() {
            return Err(input_err(std::io::Error::other("not a regular file")));
        }
        let modified = meta.modified().ok();
        let len = meta.len();

        if let Some(stamp) = self.entries.lock().get(&abs) {
            if stamp.modified.is_some() && stamp.modified == modified && stamp.len == len {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(stamp.digest);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let digest = hash_file_raw(&abs).map_err(input_err)?;
        self.entries.lock().insert(
            abs,
            FileStamp {
                modified,
                len,
                digest,
            },
        );
        Ok(digest)
    }

    /// Number of lookups answered from memory.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of lookups that had to read the file.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

fn hash_file_raw(path: &Path) -> std::io::Result<[u8; 32]> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    let mut out = [0_u8; 32];
    out.copy_from_slice(&hasher.finalize());
    Ok(out)
}

/// Incremental builder for a [`Fingerprint`] over an ordered list of inputs.
#[derive(Debug)]
pub struct ContentHasher {
    hasher: Sha256,
    files: Arc<FileHashCache>,
}

impl ContentHasher {
    pub fn new(files: Arc<FileHashCache>) -> Self {
        Self {
            hasher: Sha256::new(),
            files,
        }
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.tag(TAG_BYTES).len_prefixed(bytes)
    }

    pub fn str(&mut self, value: &str) -> &mut Self {
        self.tag(TAG_STR).len_prefixed(value.as_bytes())
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.tag(TAG_I32);
        self.hasher.update(value.to_le_bytes());
        self
    }

    pub fn i64(&mut self, value: i64) -> &mut Self {
        self.tag(TAG_I64);
        self.hasher.update(value.to_le_bytes());
        self
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.tag(TAG_BOOL);
        self.hasher.update([u8::from(value)]);
        self
    }

    pub fn absent(&mut self) -> &mut Self {
        self.tag(TAG_ABSENT);
        self.hasher.update(ABSENT_SENTINEL);
        self
    }

    /// Fold in a required file's content.
    pub fn file(&mut self, path: &Path) -> Result<&mut Self, CacheError> {
        let digest = self.files.file_digest(path)?;
        self.tag(TAG_FILE);
        self.hasher.update(digest);
        Ok(self)
    }

    pub fn file_opt(&mut self, path: Option<&Path>) -> Result<&mut Self, CacheError> {
        match path {
            Some(path) => self.file(path),
            None => Ok(self.absent()),
        }
    }

    /// Fold in a set of files, sorted by path so declaration order is irrelevant.
    pub fn files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<&mut Self, CacheError> {
        let mut sorted: Vec<&Path> = paths.iter().map(AsRef::as_ref).collect();
        sorted.sort();
        sorted.dedup();

        let mut digests = Vec::with_capacity(sorted.len());
        for path in sorted {
            digests.push(self.files.file_digest(path)?);
        }

        self.tag(TAG_FILES);
        self.hasher.update((digests.len() as u64).to_le_bytes());
        for digest in digests {
            self.hasher.update(digest);
        }
        Ok(self)
    }

    /// Fold in every regular file below `dir`.
    ///
    /// Files are ordered by their `/`-separated relative path, and each
    /// contributes that path and its content digest, so the result is the same
    /// on every platform and filesystem.
    pub fn dir(&mut self, dir: &Path) -> Result<&mut Self, CacheError> {
        if !dir.is_dir() {
            return Err(CacheError::Input {
                path: dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(dir).follow_links(false) {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(dir)
                .map_err(|_| CacheError::Input {
                    path: entry.path().to_path_buf(),
                    source: std::io::Error::other("path escaped hashed directory"),
                })?;
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.push((rel, entry.into_path()));
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        self.tag(TAG_DIR);
        self.hasher.update((files.len() as u64).to_le_bytes());
        for (rel, path) in files {
            let digest = self.files.file_digest(&path)?;
            self.len_prefixed(rel.as_bytes());
            self.hasher.update(digest);
        }
        Ok(self)
    }

    pub fn dir_opt(&mut self, dir: Option<&Path>) -> Result<&mut Self, CacheError> {
        match dir {
            Some(dir) => self.dir(dir),
            None => Ok(self.absent()),
        }
    }

    pub fn input(&mut self, input: &HashInput) -> Result<&mut Self, CacheError> {
        match input {
            HashInput::Bytes(bytes) => Ok(self.bytes(bytes)),
            HashInput::Str(value) => Ok(self.str(value)),
            HashInput::I32(value) => Ok(self.i32(*value)),
            HashInput::I64(value) => Ok(self.i64(*value)),
            HashInput::Bool(value) => Ok(self.bool(*value)),
            HashInput::File(path) => self.file(path),
            HashInput::OptionalFile(path) => self.file_opt(path.as_deref()),
            HashInput::Files(paths) => self.files(paths),
            HashInput::Dir(path) => self.dir(path),
            HashInput::OptionalDir(path) => self.dir_opt(path.as_deref()),
            HashInput::Absent => Ok(self.absent()),
        }
    }

    pub fn inputs<'a>(
        &mut self,
        inputs: impl IntoIterator<Item = &'a HashInput>,
    ) -> Result<&mut Self, CacheError> {
        for input in inputs {
            self.input(input)?;
        }
        Ok(self)
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint::from_digest(self.hasher)
    }

    fn tag(&mut self, tag: u8) -> &mut Self {
        self.hasher.update([tag]);
        self
    }

    fn len_prefixed(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }
}

/// Digest an ordered list of inputs.
pub fn digest(files: &Arc<FileHashCache>, inputs: &[HashInput]) -> Result<Fingerprint, CacheError> {
    let mut hasher = ContentHasher::new(Arc::clone(files));
    hasher.inputs(inputs)?;
    Ok(hasher.finish())
}
