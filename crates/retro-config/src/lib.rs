//! TOML configuration for a retro pipeline run.
//!
//! Every section is optional and falls back to defaults. Relative paths in a
//! config file are resolved against the directory containing that file.

mod logging;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub use logging::{init_tracing, LoggingConfig};

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "retro.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub chain: ChainSection,
    #[serde(default)]
    pub mappings: MappingsSection,
    #[serde(default)]
    pub patch: PatchSection,
    #[serde(default)]
    pub cleanup: CleanupSection,
    #[serde(default)]
    pub remap: RemapSection,
    /// External tools keyed by role: `merge`, `deobfuscate`, `decompile`,
    /// `access_transform`.
    #[serde(default)]
    pub tools: BTreeMap<String, ToolConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    /// Shared cache root. `RETRO_CACHE_DIR` takes precedence when set.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Give up waiting for the cache lock after this many milliseconds.
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainSection {
    /// The obfuscated jar the first stage consumes.
    #[serde(default)]
    pub input: Option<PathBuf>,
    /// Where stage outputs are written.
    #[serde(default = "ChainSection::default_work_dir")]
    pub work_dir: PathBuf,
    /// Keep intermediate jars after a successful run.
    #[serde(default)]
    pub keep_intermediates: bool,
    /// How long an up-to-date answer is reused without re-hashing.
    #[serde(default = "ChainSection::default_debounce_ms")]
    pub debounce_ms: u64,
}

impl ChainSection {
    fn default_work_dir() -> PathBuf {
        PathBuf::from("build/retro")
    }

    fn default_debounce_ms() -> u64 {
        10_000
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for ChainSection {
    fn default() -> Self {
        Self {
            input: None,
            work_dir: Self::default_work_dir(),
            keep_intermediates: false,
            debounce_ms: Self::default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingsSection {
    /// Base notch to intermediate table.
    #[serde(default)]
    pub srg: Option<PathBuf>,
    #[serde(default)]
    pub fields_csv: Option<PathBuf>,
    #[serde(default)]
    pub methods_csv: Option<PathBuf>,
    #[serde(default)]
    pub params_csv: Option<PathBuf>,
    /// Exception table in intermediate names.
    #[serde(default)]
    pub exc: Option<PathBuf>,
    /// Additional exception tables appended after `exc`.
    #[serde(default)]
    pub extra_exc: Vec<PathBuf>,
    /// Directory the generated tables are written to.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchSection {
    /// Patch files, directories of patches, or zip archives of patches.
    #[serde(default)]
    pub bundles: Vec<PathBuf>,
    /// Directories copied verbatim into the artifact before patching.
    #[serde(default)]
    pub injection_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub max_fuzz: usize,
    #[serde(default = "PatchSection::default_strip")]
    pub strip: usize,
    /// Report failures in the patch log instead of failing the stage.
    #[serde(default)]
    pub allow_failure: bool,
    /// Ignore access modifiers when matching context lines.
    #[serde(default = "default_true")]
    pub canonicalize_access: bool,
}

impl PatchSection {
    fn default_strip() -> usize {
        3
    }
}

impl Default for PatchSection {
    fn default() -> Self {
        Self {
            bundles: Vec::new(),
            injection_dirs: Vec::new(),
            max_fuzz: 0,
            strip: Self::default_strip(),
            allow_failure: false,
            canonicalize_access: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupSection {
    /// Decompiler fix-up patches, grouped by file name.
    #[serde(default)]
    pub patches_dir: Option<PathBuf>,
    #[serde(default = "CleanupSection::default_strip")]
    pub strip: usize,
    #[serde(default)]
    pub max_fuzz: usize,
    /// Remove blank lines around `case` and `default` labels.
    #[serde(default = "default_true")]
    pub normalize_switch_labels: bool,
}

impl CleanupSection {
    fn default_strip() -> usize {
        1
    }
}

impl Default for CleanupSection {
    fn default() -> Self {
        Self {
            patches_dir: None,
            strip: Self::default_strip(),
            max_fuzz: 0,
            normalize_switch_labels: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemapSection {
    /// Skip the remap stage entirely.
    #[serde(default)]
    pub disabled: bool,
    /// File-scoped generic type edits.
    #[serde(default)]
    pub generics_csv: Option<PathBuf>,
    /// File-scoped literal replacements.
    #[serde(default)]
    pub generic_patches_csv: Option<PathBuf>,
    /// Emit `// DOCSTUB` markers instead of javadoc.
    #[serde(default)]
    pub dummy_javadoc: bool,
    /// Disable javadoc insertion.
    #[serde(default)]
    pub skip_javadoc: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    pub program: PathBuf,
    /// Argument template. `{input}`, `{output}` and `{temp}` are substituted.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra files the tool reads; hashed into the chain digest.
    #[serde(default)]
    pub inputs: Vec<PathBuf>,
    /// Arguments repeated once per entry of `inputs`, with `{file}` substituted.
    #[serde(default)]
    pub per_input_args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ToolConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config{}: {message}", .line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    Toml {
        line: Option<usize>,
        message: String,
    },
    #[error("invalid value for `{field}`: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    fn from_toml(text: &str, err: &toml::de::Error) -> Self {
        // Keep just the message and location; the default `Display` includes a source snippet.
        let line = err
            .span()
            .map(|span| text[..span.start.min(text.len())].matches('\n').count() + 1);
        Self::Toml {
            line,
            message: err.message().to_owned(),
        }
    }
}

impl PipelineConfig {
    /// Load a config file from TOML, resolving relative paths against its directory.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::load_from_str(&text)?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parse and validate a config from TOML text. Paths are left as written.
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig =
            toml::from_str(text).map_err(|err| ConfigError::from_toml(text, &err))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.patch.max_fuzz > 16 {
            return Err(ConfigError::Invalid {
                field: "patch.max_fuzz",
                message: format!("{} exceeds the supported maximum of 16", self.patch.max_fuzz),
            });
        }
        for (name, tool) in &self.tools {
            if tool.program.as_os_str().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "tools.program",
                    message: format!("tool `{name}` has an empty program"),
                });
            }
            if !tool.per_input_args.is_empty() && tool.inputs.is_empty() {
                tracing::debug!(
                    target = "retro.config",
                    tool = %name,
                    "per_input_args set without inputs; nothing will be repeated"
                );
            }
        }
        if self.remap.dummy_javadoc && self.remap.skip_javadoc {
            return Err(ConfigError::Invalid {
                field: "remap.dummy_javadoc",
                message: "cannot be combined with remap.skip_javadoc".to_owned(),
            });
        }
        Ok(())
    }

    /// Make every relative path absolute with respect to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let fix = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        let fix_opt = |path: &mut Option<PathBuf>| {
            if let Some(path) = path {
                fix(path);
            }
        };

        fix_opt(&mut self.cache.root);
        fix_opt(&mut self.chain.input);
        fix(&mut self.chain.work_dir);

        fix_opt(&mut self.mappings.srg);
        fix_opt(&mut self.mappings.fields_csv);
        fix_opt(&mut self.mappings.methods_csv);
        fix_opt(&mut self.mappings.params_csv);
        fix_opt(&mut self.mappings.exc);
        self.mappings.extra_exc.iter_mut().for_each(fix);
        fix_opt(&mut self.mappings.output_dir);

        self.patch.bundles.iter_mut().for_each(fix);
        self.patch.injection_dirs.iter_mut().for_each(fix);
        fix_opt(&mut self.cleanup.patches_dir);
        fix_opt(&mut self.remap.generics_csv);
        fix_opt(&mut self.remap.generic_patches_csv);

        for tool in self.tools.values_mut() {
            // Bare program names are looked up on PATH.
            if tool.program.components().count() > 1 {
                fix(&mut tool.program);
            }
            tool.inputs.iter_mut().for_each(fix);
        }

        fix_opt(&mut self.logging.file);
    }
}
