use std::path::PathBuf;

use retro_config::{ConfigError, PipelineConfig, CONFIG_FILE_NAME};
use tempfile::tempdir;

#[test]
fn relative_paths_resolve_against_config_dir() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(
        &path,
        r#"
[chain]
input = "jars/minecraft.jar"

[mappings]
srg = "mcp/joined.srg"
extra_exc = ["mcp/extra.exc"]

[patch]
bundles = ["patches"]

[tools.decompile]
program = "java"
inputs = ["tools/fernflower.jar"]

[tools.deobfuscate]
program = "tools/specialsource.sh"

[logging]
file = "retro.log"
"#,
    )
    .unwrap();

    let config = PipelineConfig::load_from_path(&path).unwrap();
    assert_eq!(config.chain.input, Some(dir.path().join("jars/minecraft.jar")));
    assert_eq!(config.chain.work_dir, dir.path().join("build/retro"));
    assert_eq!(config.mappings.srg, Some(dir.path().join("mcp/joined.srg")));
    assert_eq!(config.mappings.extra_exc, vec![dir.path().join("mcp/extra.exc")]);
    assert_eq!(config.patch.bundles, vec![dir.path().join("patches")]);
    assert_eq!(config.tools["decompile"].program, PathBuf::from("java"));
    assert_eq!(
        config.tools["decompile"].inputs,
        vec![dir.path().join("tools/fernflower.jar")]
    );
    assert_eq!(
        config.tools["deobfuscate"].program,
        dir.path().join("tools/specialsource.sh")
    );
    assert_eq!(config.logging.file, Some(dir.path().join("retro.log")));
}

#[test]
fn missing_file_reports_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope.toml");
    let err = PipelineConfig::load_from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("nope.toml"), "{err}");
}

#[test]
fn syntax_errors_do_not_echo_values() {
    let err = PipelineConfig::load_from_str("[chain]\nkeep_intermediates = \"secret-value\"\n")
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("line 2"), "{message}");
    assert!(!message.contains("keep_intermediates = "), "{message}");
}
