use std::path::Path;

use retro_cache::ContentHasher;
use retro_config::ToolConfig;
use retro_process::{expand_placeholders, run_tool_checked, RunOptions, ToolCommand};

use crate::error::PipelineError;
use crate::stage::{Stage, StageContext};

/// Runs an external jar-in, jar-out tool.
///
/// The argument template may use `{input}`, `{output}` and `{temp}`.
/// `per_input_args` is appended once per extra input with `{file}` set to it.
#[derive(Clone, Debug)]
pub struct ToolStage {
    name: String,
    tool: ToolConfig,
    copy_if_no_inputs: bool,
}

impl ToolStage {
    pub fn new(name: impl Into<String>, tool: ToolConfig) -> Self {
        Self {
            name: name.into(),
            tool,
            copy_if_no_inputs: false,
        }
    }

    /// Copy the input through unchanged when the tool has no extra inputs.
    ///
    /// Used for the source access transformer, which has nothing to do
    /// without transformer files.
    #[must_use]
    pub fn copy_if_no_inputs(mut self, copy: bool) -> Self {
        self.copy_if_no_inputs = copy;
        self
    }

    pub fn tool(&self) -> &ToolConfig {
        &self.tool
    }

    fn command(&self, ctx: &StageContext<'_>) -> ToolCommand {
        let input = ctx.input.map(path_arg).unwrap_or_default();
        let output = path_arg(ctx.output);
        let temp = path_arg(ctx.temp_dir);
        let values = [
            ("input", input.as_str()),
            ("output", output.as_str()),
            ("temp", temp.as_str()),
        ];
        let mut args = expand_placeholders(&self.tool.args, &values);
        for file in &self.tool.inputs {
            let file = path_arg(file);
            let mut per_file = values.to_vec();
            per_file.push(("file", file.as_str()));
            args.extend(expand_placeholders(&self.tool.per_input_args, &per_file));
        }

        let mut command = ToolCommand::new(ctx.temp_dir, &self.tool.program, &args);
        for (key, value) in &self.tool.env {
            command = command.with_env(key.clone(), value.clone());
        }
        command
    }
}

impl Stage for ToolStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn hash_inputs(&self, hasher: &mut ContentHasher) -> Result<(), PipelineError> {
        // A bare program name is resolved through PATH; only its name is stable.
        if self.tool.program.is_file() {
            hasher.file(&self.tool.program)?;
        } else {
            hasher.str(&self.tool.program.to_string_lossy());
        }
        hasher.i64(self.tool.args.len() as i64);
        for arg in &self.tool.args {
            hasher.str(arg);
        }
        hasher.i64(self.tool.per_input_args.len() as i64);
        for arg in &self.tool.per_input_args {
            hasher.str(arg);
        }
        hasher.files(&self.tool.inputs)?;
        for (key, value) in &self.tool.env {
            hasher.str(key).str(value);
        }
        hasher.bool(self.copy_if_no_inputs);
        Ok(())
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<(), PipelineError> {
        if self.copy_if_no_inputs && self.tool.inputs.is_empty() {
            let input = ctx.require_input()?;
            tracing::info!(
                target = "retro.pipeline",
                stage = %self.name,
                "no transformer inputs; copying input through"
            );
            std::fs::copy(input, ctx.output).map_err(|err| PipelineError::io(input, err))?;
            return Ok(());
        }

        let command = self.command(ctx);
        let options = RunOptions {
            timeout: self.tool.timeout(),
            ..RunOptions::default()
        };
        tracing::info!(
            target = "retro.pipeline",
            stage = %self.name,
            command = %command,
            "running tool"
        );
        let result = run_tool_checked(&command, &options)?;
        if result.output.truncated {
            tracing::debug!(
                target = "retro.pipeline",
                stage = %self.name,
                "tool output exceeded the capture limit and was truncated"
            );
        }
        tracing::debug!(
            target = "retro.pipeline",
            stage = %self.name,
            elapsed_ms = result.elapsed.as_millis() as u64,
            output = %result.output.combined(),
            "tool finished"
        );
        Ok(())
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
