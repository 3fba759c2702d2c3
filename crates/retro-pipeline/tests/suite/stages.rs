use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use retro_archive::Artifact;
use retro_config::{CleanupSection, PatchSection};
use retro_patch::PatchError;
use retro_pipeline::stages::{CleanupStage, PatchStage, PATCH_LOG_FILE};
use retro_pipeline::{PipelineError, Stage, StageContext};

const FOO: &str = "class Foo {\n    int a;\n}\n";

fn patch_for(field: &str, value: &str) -> String {
    format!(
        "--- a/net/Foo.java\n\
         +++ b/net/Foo.java\n\
         @@ -1,3 +1,3 @@\n\
         \x20class Foo {{\n\
         -    int {field};\n\
         +    int {field} = {value};\n\
         \x20}}\n"
    )
}

struct Scratch {
    dir: tempfile::TempDir,
}

impl Scratch {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn write(&self, rel: &str, text: &str) -> PathBuf {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, text).unwrap();
        path
    }

    fn input_jar(&self) -> PathBuf {
        let mut artifact = Artifact::new();
        artifact.insert_source("net/Foo.java", FOO);
        artifact.insert_resource("assets/pack.mcmeta", b"{}\n".to_vec());
        let path = self.path("input.jar");
        artifact.save(&path).unwrap();
        path
    }

    fn run(&self, stage: &dyn Stage) -> Result<Artifact, PipelineError> {
        let input = self.input_jar();
        let output = self.path("output.jar");
        let temp = self.path("tmp");
        std::fs::create_dir_all(&temp).unwrap();
        stage.run(&StageContext {
            input: Some(&input),
            output: &output,
            temp_dir: &temp,
        })?;
        Ok(Artifact::load(&output).unwrap())
    }

    fn patch_log(&self) -> String {
        std::fs::read_to_string(self.path("tmp").join(PATCH_LOG_FILE)).unwrap()
    }
}

fn patch_section(bundle: &Path) -> PatchSection {
    PatchSection {
        bundles: vec![bundle.to_path_buf()],
        strip: 1,
        ..PatchSection::default()
    }
}

#[test]
fn patch_stage_applies_bundle_and_writes_log() {
    let scratch = Scratch::new();
    scratch.write("patches/net/Foo.java.patch", &patch_for("a", "1"));

    let out = scratch
        .run(&PatchStage::new(&patch_section(&scratch.path("patches"))))
        .unwrap();
    assert_eq!(out.source("net/Foo.java"), Some("class Foo {\n    int a = 1;\n}\n"));
    assert_eq!(out.resource("assets/pack.mcmeta"), Some(&b"{}\n"[..]));
    assert!(scratch
        .patch_log()
        .starts_with("Applying patch net/Foo.java.patch from bundle "));
}

#[test]
fn patch_stage_failure_still_writes_log() {
    let scratch = Scratch::new();
    scratch.write("patches/net/Foo.java.patch", &patch_for("b", "2"));

    let err = scratch
        .run(&PatchStage::new(&patch_section(&scratch.path("patches"))))
        .unwrap_err();
    match err {
        PipelineError::Patch(PatchError::Rejected { target, reports, .. }) => {
            assert_eq!(target, "net/Foo.java");
            assert_eq!(reports.len(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!scratch.path("output.jar").exists());

    let log = scratch.patch_log();
    assert!(log.contains("Patch net/Foo.java failed: 1 of 1 hunks failed"), "{log}");
    assert!(log.contains(" - Hunk 1 failed (1+3 -> 1+3), fuzz 0..=0:"), "{log}");
}

#[test]
fn patch_stage_tolerates_failures_when_allowed() {
    let scratch = Scratch::new();
    scratch.write("patches/net/Foo.java.patch", &patch_for("b", "2"));

    let section = PatchSection {
        allow_failure: true,
        ..patch_section(&scratch.path("patches"))
    };
    let out = scratch.run(&PatchStage::new(&section)).unwrap();
    assert_eq!(out.source("net/Foo.java"), Some(FOO));
    assert!(scratch.patch_log().contains("Patch net/Foo.java failed"));
}

#[test]
fn patch_stage_injects_files_before_patching() {
    let scratch = Scratch::new();
    scratch.write("inject/net/Extra.java", "class Extra {}\n");
    scratch.write("inject/assets/lang.txt", "hello\n");
    scratch.write("inject/net/Foo.java", "class Foo {\n    int a;\n    int b;\n}\n");

    let section = PatchSection {
        injection_dirs: vec![scratch.path("inject")],
        ..PatchSection::default()
    };
    let out = scratch.run(&PatchStage::new(&section)).unwrap();
    assert_eq!(out.source("net/Extra.java"), Some("class Extra {}\n"));
    assert_eq!(out.source("net/Foo.java"), Some("class Foo {\n    int a;\n    int b;\n}\n"));
    assert_eq!(out.resource("assets/lang.txt"), Some(&b"hello\n"[..]));
}

#[test]
fn cleanup_stage_picks_first_applicable_fix() {
    let scratch = Scratch::new();
    scratch.write("fixes/Foo.java.patch", &patch_for("b", "2"));
    scratch.write("fixes/Foo.java.patch2", &patch_for("a", "1"));

    let section = CleanupSection {
        patches_dir: Some(scratch.path("fixes")),
        ..CleanupSection::default()
    };
    let out = scratch.run(&CleanupStage::new(&section)).unwrap();
    assert_eq!(out.source("net/Foo.java"), Some("class Foo {\n    int a = 1;\n}\n"));
}

#[test]
fn cleanup_stage_fails_when_no_fix_applies() {
    let scratch = Scratch::new();
    scratch.write("fixes/Foo.java.patch", &patch_for("b", "2"));

    let section = CleanupSection {
        patches_dir: Some(scratch.path("fixes")),
        ..CleanupSection::default()
    };
    let err = scratch.run(&CleanupStage::new(&section)).unwrap_err();
    assert!(matches!(err, PipelineError::Patch(PatchError::Rejected { .. })), "{err}");
}

#[cfg(unix)]
mod tool {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    use retro_cache::{ContentHasher, FileHashCache};
    use retro_config::ToolConfig;
    use retro_pipeline::stages::ToolStage;

    fn tool(program: &str, args: &[&str]) -> ToolConfig {
        ToolConfig {
            program: PathBuf::from(program),
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            inputs: Vec::new(),
            per_input_args: Vec::new(),
            env: BTreeMap::new(),
            timeout_ms: Some(30_000),
        }
    }

    #[test]
    fn runs_tool_with_expanded_paths() {
        let scratch = Scratch::new();
        let stage = ToolStage::new("merge", tool("cp", &["{input}", "{output}"]));
        let out = scratch.run(&stage).unwrap();
        assert_eq!(out.source("net/Foo.java"), Some(FOO));
    }

    #[test]
    fn failing_tool_is_reported() {
        let scratch = Scratch::new();
        let stage = ToolStage::new("decompile", tool("sh", &["-c", "echo broken >&2; exit 3"]));
        let err = scratch.run(&stage).unwrap_err();
        assert!(matches!(err, PipelineError::Tool(_)), "{err}");
        assert!(err.to_string().contains("broken"), "{err}");
        assert!(!scratch.path("output.jar").exists());
    }

    #[test]
    fn access_transform_without_inputs_copies_input() {
        let scratch = Scratch::new();
        let stage = ToolStage::new("access_transform", tool("false", &[])).copy_if_no_inputs(true);
        let out = scratch.run(&stage).unwrap();
        assert_eq!(out.source("net/Foo.java"), Some(FOO));
    }

    #[test]
    fn tool_arguments_change_the_digest() {
        let digest = |args: &[&str]| {
            let mut hasher = ContentHasher::new(FileHashCache::shared());
            ToolStage::new("merge", tool("cp", args))
                .hash_inputs(&mut hasher)
                .unwrap();
            hasher.finish()
        };
        assert_eq!(digest(&["{input}", "{output}"]), digest(&["{input}", "{output}"]));
        assert_ne!(digest(&["{input}", "{output}"]), digest(&["-v", "{input}", "{output}"]));
    }
}
