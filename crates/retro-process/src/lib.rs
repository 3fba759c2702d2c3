//! Running the external jar-in, jar-out tools of the pipeline.
//!
//! Decompilers and bytecode renamers are chatty and occasionally hang. Output
//! is captured into bounded buffers on reader threads, and an optional
//! wall-clock timeout kills the whole process tree.

use std::{
    collections::BTreeMap,
    fmt,
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

/// Captured stdout/stderr from a command, truncated to a maximum size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedOutput {
    pub stdout: String,
    pub stderr: String,
    /// Set when either stdout or stderr had more bytes than were captured.
    pub truncated: bool,
}

impl BoundedOutput {
    /// Stdout followed by stderr, separated by a newline when needed.
    pub fn combined(&self) -> String {
        let mut s = String::new();
        s.push_str(&self.stdout);
        if !self.stderr.is_empty() {
            if !s.is_empty() && !s.ends_with('\n') {
                s.push('\n');
            }
            s.push_str(&self.stderr);
        }
        s
    }
}

/// Options controlling command execution.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Kill the process if it hasn't exited after this duration.
    pub timeout: Option<Duration>,
    /// Maximum bytes to capture *per stream* (stdout and stderr).
    pub max_bytes: usize,
    /// How long to wait after a graceful termination signal before
    /// force-killing the process tree.
    pub kill_grace: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_bytes: 4 * 1024 * 1024,
            kill_grace: Duration::from_millis(250),
        }
    }
}

/// A full tool invocation (cwd + program + args + extra environment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub cwd: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl ToolCommand {
    pub fn new(cwd: &Path, program: &Path, args: &[String]) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            program: program.to_path_buf(),
            args: args.to_vec(),
            env: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Human-readable, not a round-trippable shell snippet.
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(' ') || arg.contains('\t') {
                write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Replace `{name}` placeholders in every argument.
///
/// Unknown placeholders are left as-is so tools that use braces in their own
/// syntax keep working.
pub fn expand_placeholders(template: &[String], values: &[(&str, &str)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            let mut out = arg.clone();
            for (name, value) in values {
                let needle = format!("{{{name}}}");
                if out.contains(&needle) {
                    out = out.replace(&needle, value);
                }
            }
            out
        })
        .collect()
}

/// Result of running a command with bounded output capture.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub status: ExitStatus,
    pub output: BoundedOutput,
    pub timed_out: bool,
    pub elapsed: Duration,
}

/// A tool that exited non-zero or ran past its timeout.
#[derive(Debug, Clone)]
pub struct ToolFailure {
    pub command: ToolCommand,
    pub status: ExitStatus,
    pub output: BoundedOutput,
    pub timed_out: bool,
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timed_out {
            writeln!(f, "`{}` timed out and was killed ({})", self.command, self.status)?;
        } else {
            writeln!(f, "`{}` exited with {}", self.command, self.status)?;
        }
        for (name, text) in [("stdout", &self.output.stdout), ("stderr", &self.output.stderr)] {
            if !text.is_empty() {
                writeln!(f, "{name}:\n{text}")?;
            }
        }
        if self.output.truncated {
            writeln!(f, "(output truncated)")?;
        }
        Ok(())
    }
}

impl std::error::Error for ToolFailure {}

/// Error returned by [`run_tool_checked`].
#[derive(Debug, thiserror::Error)]
pub enum RunToolError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: ToolCommand,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Failed(Box<ToolFailure>),
}

/// Run a tool, capturing at most `opts.max_bytes` bytes of stdout and stderr
/// each. Non-zero exits are reported through `status`, not as errors.
pub fn run_tool(command: &ToolCommand, opts: &RunOptions) -> io::Result<ToolResult> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .envs(&command.env)
        .current_dir(&command.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Own process group on Unix so a timeout can kill wrapper scripts together
    // with the JVM they spawn.
    #[cfg(unix)]
    unsafe {
        use std::os::unix::process::CommandExt;

        cmd.pre_exec(|| {
            // SAFETY: `setpgid` is async-signal-safe and does not allocate.
            if libc::setpgid(0, 0) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    tracing::debug!(target = "retro.process", command = %command, "spawning tool");
    let start = Instant::now();
    let mut child = cmd.spawn()?;

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(io::Error::other("tool output pipes were not captured"));
    };

    let stdout = spawn_capture(stdout, opts.max_bytes);
    let stderr = spawn_capture(stderr, opts.max_bytes);

    let mut timed_out = false;
    let status = match opts.timeout {
        Some(timeout) => {
            let poll = Duration::from_millis(50);
            loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if start.elapsed() >= timeout {
                    tracing::warn!(
                        target = "retro.process",
                        command = %command,
                        timeout_ms = timeout.as_millis() as u64,
                        "tool timed out; killing it"
                    );
                    timed_out = true;
                    break terminate_process_tree(&mut child, opts.kill_grace)?;
                }
                thread::sleep(poll.min(timeout.saturating_sub(start.elapsed())));
            }
        }
        None => child.wait()?,
    };

    let (stdout_bytes, stdout_truncated) = finish_capture(stdout, "stdout")?;
    let (stderr_bytes, stderr_truncated) = finish_capture(stderr, "stderr")?;
    let elapsed = start.elapsed();

    tracing::debug!(
        target = "retro.process",
        command = %command,
        status = %status,
        timed_out,
        elapsed_ms = elapsed.as_millis() as u64,
        "tool finished"
    );

    Ok(ToolResult {
        status,
        output: BoundedOutput {
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            truncated: stdout_truncated || stderr_truncated,
        },
        timed_out,
        elapsed,
    })
}

/// Run a tool and treat non-zero exits and timeouts as errors.
pub fn run_tool_checked(
    command: &ToolCommand,
    opts: &RunOptions,
) -> Result<ToolResult, RunToolError> {
    let result = run_tool(command, opts).map_err(|source| RunToolError::Spawn {
        command: command.clone(),
        source,
    })?;

    if result.timed_out || !result.status.success() {
        return Err(RunToolError::Failed(Box::new(ToolFailure {
            command: command.clone(),
            status: result.status,
            output: result.output,
            timed_out: result.timed_out,
        })));
    }

    Ok(result)
}

/// SIGTERM the tool's process group, then SIGKILL it if it outlives `grace`.
#[cfg(unix)]
fn terminate_process_tree(
    child: &mut std::process::Child,
    grace: Duration,
) -> io::Result<ExitStatus> {
    let group = -(child.id() as i32);
    // SAFETY: plain syscall on a process group we created in `pre_exec`.
    unsafe { libc::kill(group, libc::SIGTERM) };

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        thread::sleep(Duration::from_millis(25));
    }

    // SAFETY: as above.
    unsafe { libc::kill(group, libc::SIGKILL) };
    child.wait()
}

// Only the direct child is killed here; helpers it spawned may outlive it.
#[cfg(not(unix))]
fn terminate_process_tree(
    child: &mut std::process::Child,
    _grace: Duration,
) -> io::Result<ExitStatus> {
    child.kill()?;
    child.wait()
}

/// Bytes read from one output stream and whether anything was dropped.
type Captured = (Vec<u8>, bool);

fn spawn_capture(
    stream: impl Read + Send + 'static,
    max_bytes: usize,
) -> thread::JoinHandle<io::Result<Captured>> {
    thread::spawn(move || capture(stream, max_bytes))
}

/// Keep the first `max_bytes` bytes and drain the rest so the tool never
/// blocks on a full pipe.
fn capture(mut stream: impl Read, max_bytes: usize) -> io::Result<Captured> {
    let mut kept = Vec::new();
    stream
        .by_ref()
        .take(max_bytes as u64)
        .read_to_end(&mut kept)?;
    let dropped = io::copy(&mut stream, &mut io::sink())?;
    Ok((kept, dropped > 0))
}

fn finish_capture(
    handle: thread::JoinHandle<io::Result<Captured>>,
    stream: &str,
) -> io::Result<Captured> {
    handle
        .join()
        .map_err(|_| io::Error::other(format!("{stream} capture thread panicked")))?
}
