use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use retro_cache::{ContentHasher, FileHashCache};
use retro_pipeline::{ChainAction, JarChain, PipelineError, Stage, StageContext};

/// Appends its name to the input and counts invocations.
struct Append {
    name: String,
    salt: String,
    runs: Arc<AtomicUsize>,
}

impl Append {
    fn new(name: &str, runs: &Arc<AtomicUsize>) -> Self {
        Self {
            name: name.to_owned(),
            salt: String::new(),
            runs: Arc::clone(runs),
        }
    }

    fn salted(mut self, salt: &str) -> Self {
        self.salt = salt.to_owned();
        self
    }
}

impl Stage for Append {
    fn name(&self) -> &str {
        &self.name
    }

    fn hash_inputs(&self, hasher: &mut ContentHasher) -> Result<(), PipelineError> {
        hasher.str(&self.salt);
        Ok(())
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<(), PipelineError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let mut text = std::fs::read_to_string(ctx.require_input()?).unwrap();
        text.push_str(&self.name);
        text.push('\n');
        std::fs::write(ctx.output, text).unwrap();
        Ok(())
    }
}

/// Writes half an output, then fails.
struct Broken;

impl Stage for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn hash_inputs(&self, _hasher: &mut ContentHasher) -> Result<(), PipelineError> {
        Ok(())
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<(), PipelineError> {
        std::fs::write(ctx.output, "partial").unwrap();
        Err(PipelineError::MissingConfig("broken.stage"))
    }
}

/// Returns successfully without writing anything.
struct Silent;

impl Stage for Silent {
    fn name(&self) -> &str {
        "silent"
    }

    fn hash_inputs(&self, _hasher: &mut ContentHasher) -> Result<(), PipelineError> {
        Ok(())
    }

    fn run(&self, _ctx: &StageContext<'_>) -> Result<(), PipelineError> {
        Ok(())
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    input: PathBuf,
    runs: Arc<AtomicUsize>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let input = root.join("input.jar");
        std::fs::write(&input, "input\n").unwrap();
        Self {
            _dir: dir,
            root,
            input,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn out(&self, name: &str) -> PathBuf {
        self.root.join("work").join(name)
    }

    fn chain(&self) -> JarChain {
        let mut chain = JarChain::new(
            Some(self.input.clone()),
            self.root.join("work/tmp"),
            FileHashCache::shared(),
        )
        .debounce(Duration::ZERO);
        chain.push(Append::new("first", &self.runs), self.out("first.jar"), ChainAction::Cleanup);
        chain.push(Append::new("second", &self.runs), self.out("second.jar"), ChainAction::Cleanup);
        chain
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[test]
fn second_run_with_same_inputs_is_skipped() {
    let fx = Fixture::new();
    let mut chain = fx.chain();

    let report = chain.run().unwrap();
    assert!(!report.up_to_date);
    assert_eq!(report.invocations(), 2);
    assert_eq!(
        report.executed.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        ["first", "second"]
    );
    let first_output = std::fs::read(fx.out("second.jar")).unwrap();
    assert_eq!(read(&fx.out("second.jar")), "input\nfirst\nsecond\n");

    let again = chain.run().unwrap();
    assert!(again.up_to_date);
    assert_eq!(again.invocations(), 0);
    assert_eq!(again.digest, report.digest);
    assert_eq!(std::fs::read(fx.out("second.jar")).unwrap(), first_output);

    // A fresh chain picks up the persisted digest.
    let mut fresh = fx.chain();
    assert!(fresh.is_up_to_date().unwrap());
    assert_eq!(fresh.run().unwrap().invocations(), 0);
    assert_eq!(fx.runs(), 2);
}

#[test]
fn digest_is_written_beside_the_final_output() {
    let fx = Fixture::new();
    let mut chain = fx.chain();
    let report = chain.run().unwrap();

    let digest_path = chain.digest_path().unwrap();
    assert_eq!(digest_path, fx.root.join("work/second.jar.inputs.sha256"));
    assert_eq!(read(&digest_path), format!("{}\n", report.digest));
}

#[test]
fn changed_input_reruns_every_stage() {
    let fx = Fixture::new();
    fx.chain().run().unwrap();

    std::fs::write(&fx.input, "different input\n").unwrap();
    let report = fx.chain().run().unwrap();
    assert_eq!(report.invocations(), 2);
    assert_eq!(read(&fx.out("second.jar")), "different input\nfirst\nsecond\n");
}

#[test]
fn changed_stage_input_reruns_the_whole_chain() {
    let fx = Fixture::new();
    fx.chain().run().unwrap();

    let mut chain = JarChain::new(
        Some(fx.input.clone()),
        fx.root.join("work/tmp"),
        FileHashCache::shared(),
    );
    chain.push(
        Append::new("first", &fx.runs).salted("v2"),
        fx.out("first.jar"),
        ChainAction::Cleanup,
    );
    chain.push(Append::new("second", &fx.runs), fx.out("second.jar"), ChainAction::Cleanup);
    assert_eq!(chain.run().unwrap().invocations(), 2);
    assert_eq!(fx.runs(), 4);
}

#[test]
fn missing_output_with_digest_present_is_a_miss() {
    let fx = Fixture::new();
    let mut chain = fx.chain();
    chain.run().unwrap();

    std::fs::remove_file(fx.out("second.jar")).unwrap();
    assert!(chain.digest_path().unwrap().is_file());
    assert!(!chain.is_up_to_date().unwrap());
    assert_eq!(chain.run().unwrap().invocations(), 2);
}

#[test]
fn corrupt_digest_is_a_miss() {
    let fx = Fixture::new();
    let mut chain = fx.chain();
    chain.run().unwrap();

    std::fs::write(chain.digest_path().unwrap(), "not a digest\n").unwrap();
    assert!(!chain.is_up_to_date().unwrap());
}

#[test]
fn up_to_date_answer_is_debounced() {
    let fx = Fixture::new();
    let mut chain = fx.chain().debounce(Duration::from_secs(3600));
    chain.run().unwrap();
    assert!(chain.is_up_to_date().unwrap());

    // Within the debounce window the memoized answer is reused.
    std::fs::remove_file(fx.out("second.jar")).unwrap();
    assert!(chain.is_up_to_date().unwrap());

    let mut undebounced = fx.chain();
    assert!(!undebounced.is_up_to_date().unwrap());
}

#[test]
fn intermediates_are_removed_unless_kept() {
    let fx = Fixture::new();
    fx.chain().run().unwrap();
    assert!(!fx.out("first.jar").exists());
    assert!(fx.out("second.jar").is_file());

    let kept = Fixture::new();
    kept.chain().keep_intermediates(true).run().unwrap();
    assert!(kept.out("first.jar").is_file());
}

#[test]
fn no_cleanup_outputs_survive() {
    let fx = Fixture::new();
    let mut chain = JarChain::new(
        Some(fx.input.clone()),
        fx.root.join("work/tmp"),
        FileHashCache::shared(),
    );
    chain.push(Append::new("first", &fx.runs), fx.out("first.jar"), ChainAction::NoCleanup);
    chain.push(Append::new("second", &fx.runs), fx.out("second.jar"), ChainAction::OnlyCleanup);
    chain.push(Append::new("third", &fx.runs), fx.out("third.jar"), ChainAction::Cleanup);
    chain.run().unwrap();

    assert!(fx.out("first.jar").is_file());
    assert!(!fx.out("second.jar").exists());
    assert_eq!(read(&fx.out("third.jar")), "input\nfirst\nsecond\nthird\n");
}

#[test]
fn only_cleanup_stages_are_not_hashed() {
    let fx = Fixture::new();
    let digest_with = |salt: &str| {
        let mut chain = JarChain::new(
            Some(fx.input.clone()),
            fx.root.join("work/tmp"),
            FileHashCache::shared(),
        );
        chain.push(Append::new("a", &fx.runs).salted(salt), fx.out("a.jar"), ChainAction::OnlyCleanup);
        chain.push(Append::new("b", &fx.runs), fx.out("b.jar"), ChainAction::Cleanup);
        chain.compute_digest().unwrap()
    };
    assert_eq!(digest_with("one"), digest_with("two"));
}

#[test]
fn failed_stage_publishes_nothing() {
    let fx = Fixture::new();
    let mut chain = JarChain::new(
        Some(fx.input.clone()),
        fx.root.join("work/tmp"),
        FileHashCache::shared(),
    );
    chain.push(Append::new("first", &fx.runs), fx.out("first.jar"), ChainAction::Cleanup);
    chain.push(Broken, fx.out("broken.jar"), ChainAction::Cleanup);

    let err = chain.run().unwrap_err();
    assert!(matches!(err, PipelineError::MissingConfig("broken.stage")), "{err}");
    assert!(!fx.out("broken.jar").exists());
    assert!(!chain.digest_path().unwrap().exists());

    let leftovers: Vec<_> = std::fs::read_dir(fx.root.join("work"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".retro-stage-"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn stage_without_output_is_an_error() {
    let fx = Fixture::new();
    let mut chain = JarChain::new(
        Some(fx.input.clone()),
        fx.root.join("work/tmp"),
        FileHashCache::shared(),
    );
    chain.push(Silent, fx.out("silent.jar"), ChainAction::Cleanup);

    match chain.run().unwrap_err() {
        PipelineError::MissingOutput { stage, path } => {
            assert_eq!(stage, "silent");
            assert_eq!(path, fx.out("silent.jar"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn empty_chain_cannot_run() {
    let mut chain = JarChain::new(None, "tmp", FileHashCache::shared());
    assert!(chain.is_empty());
    assert!(matches!(chain.run(), Err(PipelineError::MissingConfig(_))));
}
