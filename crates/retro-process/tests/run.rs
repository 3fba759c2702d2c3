use retro_process::{run_tool, run_tool_checked, RunOptions, RunToolError, ToolCommand};
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

fn helper() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_retro_process_test_helper"))
}

fn command(args: &[&str]) -> ToolCommand {
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    ToolCommand::new(Path::new("."), &helper(), &args)
}

#[test]
fn truncates_large_stdout() {
    let opts = RunOptions {
        timeout: Some(Duration::from_secs(2)),
        max_bytes: 1024,
        ..RunOptions::default()
    };

    let result = run_tool(&command(&["--stdout-bytes", "1048576"]), &opts).unwrap();

    assert!(result.status.success());
    assert!(!result.timed_out);
    assert!(result.output.truncated);
    assert_eq!(result.output.stdout.len(), 1024);
}

#[test]
fn timeout_kills_process_tree() {
    let opts = RunOptions {
        timeout: Some(Duration::from_millis(50)),
        max_bytes: 1024,
        ..RunOptions::default()
    };

    let start = Instant::now();
    let result = run_tool(
        &command(&["--spawn-child-sleep-ms", "5000", "--sleep-ms", "5000"]),
        &opts,
    )
    .unwrap();

    assert!(result.timed_out);
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "expected timeout kill to return promptly, took {:?}",
        start.elapsed()
    );
}

#[test]
fn non_zero_exit_is_a_failure_with_output() {
    let err = run_tool_checked(
        &command(&["--stderr-bytes", "5", "--exit-code", "3"]),
        &RunOptions::default(),
    )
    .unwrap_err();

    match err {
        RunToolError::Failed(failure) => {
            assert_eq!(failure.status.code(), Some(3));
            assert_eq!(failure.output.stderr, "bbbbb");
            assert!(failure.to_string().contains("stderr:\nbbbbb"), "{failure}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn checked_timeout_is_a_failure() {
    let opts = RunOptions {
        timeout: Some(Duration::from_millis(50)),
        ..RunOptions::default()
    };
    let err = run_tool_checked(&command(&["--sleep-ms", "5000"]), &opts).unwrap_err();

    match err {
        RunToolError::Failed(failure) => {
            assert!(failure.timed_out);
            assert!(failure.to_string().contains("timed out"), "{failure}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn output_below_the_limit_is_not_truncated() {
    let opts = RunOptions {
        max_bytes: 1024,
        ..RunOptions::default()
    };
    let result = run_tool(&command(&["--stdout-bytes", "1024"]), &opts).unwrap();

    assert_eq!(result.output.stdout.len(), 1024);
    assert!(!result.output.truncated);
}

#[test]
fn missing_program_is_a_spawn_error() {
    let cmd = ToolCommand::new(
        Path::new("."),
        Path::new("/definitely/not/a/real/tool"),
        &[],
    );
    let err = run_tool_checked(&cmd, &RunOptions::default()).unwrap_err();
    assert!(matches!(err, RunToolError::Spawn { .. }), "{err}");
}

#[test]
fn copies_like_a_jar_tool_and_sees_env() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.jar");
    let output = dir.path().join("out.jar");
    std::fs::write(&input, b"PK\x03\x04").unwrap();

    let cmd = command(&[
        "--copy",
        input.to_str().unwrap(),
        output.to_str().unwrap(),
        "--print-env",
        "RETRO_STAGE",
    ])
    .with_env("RETRO_STAGE", "decompile");
    let result = run_tool_checked(&cmd, &RunOptions::default()).unwrap();

    assert_eq!(std::fs::read(&output).unwrap(), b"PK\x03\x04");
    assert_eq!(result.output.stdout.trim(), "decompile");
}
