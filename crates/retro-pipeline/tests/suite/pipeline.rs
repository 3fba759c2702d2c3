use std::collections::BTreeMap;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use retro_archive::Artifact;
use retro_config::{PipelineConfig, ToolConfig};
use retro_pipeline::{Pipeline, PipelineError};

const JOINED: &str = "\
CL: a net/Foo
FD: a/b net/Foo/field_1_a
MD: a/c ()V net/Foo/func_100_a ()V
";

const SOURCE: &str = "class Foo {\n    int field_1_a;\n\n    void func_100_a() {\n        field_1_a = 1;\n    }\n}\n";

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        ws.write("mappings/joined.srg", JOINED);
        ws.write(
            "mappings/fields.csv",
            "searge,name,side,desc\nfield_1_a,health,0,Current health.\n",
        );
        ws.write(
            "mappings/methods.csv",
            "searge,name,side,desc\nfunc_100_a,doFoo,0,Does the foo.\n",
        );
        let mut artifact = Artifact::new();
        artifact.insert_source("net/Foo.java", SOURCE);
        artifact.save(ws.path("input.jar")).unwrap();
        ws
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn write(&self, rel: &str, text: &str) {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    fn config(&self) -> PipelineConfig {
        let text = r#"
[cache]
root = "cache"

[chain]
input = "input.jar"
work_dir = "work"

[mappings]
srg = "mappings/joined.srg"
fields_csv = "mappings/fields.csv"
methods_csv = "mappings/methods.csv"

[remap]
skip_javadoc = true
"#;
        let mut config = PipelineConfig::load_from_str(text).unwrap();
        config.resolve_paths(self.dir.path());
        config
    }
}

#[test]
fn standard_chain_omits_unconfigured_tools() {
    let ws = Workspace::new();
    let pipeline = Pipeline::from_config(&ws.config()).unwrap();
    assert_eq!(
        pipeline.chain().stage_names().collect::<Vec<_>>(),
        ["cleanup", "remap"]
    );
    assert_eq!(pipeline.chain().final_output(), Some(ws.path("work/remap.jar").as_path()));
    assert_eq!(pipeline.cache().root(), ws.path("cache"));
}

#[test]
fn configured_tools_run_in_chain_order() {
    let ws = Workspace::new();
    let mut config = ws.config();
    let tool = |program: &str| ToolConfig {
        program: PathBuf::from(program),
        args: vec!["{input}".to_owned(), "{output}".to_owned()],
        inputs: Vec::new(),
        per_input_args: Vec::new(),
        env: BTreeMap::new(),
        timeout_ms: None,
    };
    config.tools.insert("decompile".to_owned(), tool("decompiler"));
    config.tools.insert("merge".to_owned(), tool("merger"));
    config.patch.bundles.push(ws.path("patches"));

    let pipeline = Pipeline::from_config(&config).unwrap();
    assert_eq!(
        pipeline.chain().stage_names().collect::<Vec<_>>(),
        ["merge", "decompile", "cleanup", "patch", "remap"]
    );
}

#[test]
fn remap_requires_name_tables() {
    let ws = Workspace::new();
    let mut config = ws.config();
    config.mappings.fields_csv = None;

    let err = Pipeline::from_config(&config).err().unwrap();
    assert!(
        matches!(err, PipelineError::MissingConfig("mappings.fields_csv")),
        "{err}"
    );
}

#[test]
fn run_generates_mappings_and_remaps_sources() {
    let ws = Workspace::new();
    let mut pipeline = Pipeline::from_config(&ws.config()).unwrap();

    let report = pipeline.run().unwrap();
    assert_eq!(report.chain.invocations(), 2);
    let mappings = report.mappings.unwrap();
    assert_eq!(
        mappings.intermediate_to_human.fields,
        [("net/Foo/field_1_a".to_owned(), "net/Foo/health".to_owned())]
    );
    assert!(ws.path("work/mappings/srg-mcp.srg").is_file());
    assert!(ws.path("work/mappings/mcp-notch.srg").is_file());

    let out = Artifact::load(ws.path("work/remap.jar")).unwrap();
    assert_eq!(
        out.source("net/Foo.java"),
        Some("class Foo {\n    int health;\n\n    void doFoo() {\n        health = 1;\n    }\n}\n")
    );
    assert!(!ws.path("work/cleanup.jar").exists());

    let again = pipeline.run().unwrap();
    assert!(again.chain.up_to_date);
    assert_eq!(again.chain.invocations(), 0);
}

#[test]
fn changed_name_table_reruns_the_chain() {
    let ws = Workspace::new();
    Pipeline::from_config(&ws.config()).unwrap().run().unwrap();

    ws.write(
        "mappings/fields.csv",
        "searge,name,side,desc\nfield_1_a,hitPoints,0,Current health.\n",
    );
    let mut pipeline = Pipeline::from_config(&ws.config()).unwrap();
    assert!(!pipeline.is_up_to_date().unwrap());
    assert_eq!(pipeline.run().unwrap().chain.invocations(), 2);

    let out = Artifact::load(ws.path("work/remap.jar")).unwrap();
    assert!(out.source("net/Foo.java").unwrap().contains("int hitPoints;"));
}
