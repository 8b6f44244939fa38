// src/core/runner.rs

//! # Command Runner
//!
//! Runs the commands of one environment inside its context, in order,
//! reporting progress to a [`RunListener`].

use crate::{
    CancellationToken,
    core::materializer::ExecutionContext,
    models::{CommandOutcome, CommandStatus, RunResult},
    system::executor::{self, ExecutionError, OutputSink, ProcessRequest},
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Observes an invocation as it happens. Every method has a no-op default.
///
/// Implementations must be thread-safe: environments may run in parallel.
pub trait RunListener: Send + Sync {
    /// An environment is about to materialize its context.
    fn environment_started(&self, _env: &str) {}
    /// A command is about to be spawned.
    fn command_started(&self, _env: &str, _argv: &[String]) {}
    /// One line of a command's merged stdout/stderr, without its line ending.
    fn output_line(&self, _env: &str, _line: &str) {}
    /// An environment has its final result.
    fn environment_finished(&self, _result: &RunResult) {}
}

/// A listener that ignores everything.
#[derive(Debug)]
pub struct SilentListener;

impl RunListener for SilentListener {}

/// Everything the runner needs for one environment. Nothing is read from
/// the ambient process state.
#[derive(Debug, Clone, Copy)]
pub struct CommandBatch<'a> {
    /// Used for listener events and logs.
    pub env_name: &'a str,
    /// The context the commands run in.
    pub context: &'a ExecutionContext,
    /// The injected variables.
    pub vars: &'a BTreeMap<String, String>,
    /// Substituted commands, possibly with `-` markers.
    pub commands: &'a [Vec<String>],
    /// Working directory of every command.
    pub cwd: &'a Path,
    /// Keep going after a failing command.
    pub ignore_errors: bool,
}

/// The outcomes of a batch, plus the error that stopped it, if any.
#[derive(Debug)]
pub struct BatchReport {
    /// One outcome per declared command.
    pub outcomes: Vec<CommandOutcome>,
    /// Set when a command could not run at all (not found, cancelled, ...).
    pub error: Option<ExecutionError>,
}

impl BatchReport {
    /// True if a command exited non-zero without being ignored.
    pub fn any_failed(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.status == CommandStatus::Failed)
    }
}

/// Strips a leading `-` marker. Returns whether the command's exit code
/// should be ignored, and the remaining argv.
fn parse_ignore_marker(argv: &[String]) -> (bool, Vec<String>) {
    match argv.split_first() {
        Some((first, rest)) if first == "-" => (true, rest.to_vec()),
        Some((first, rest)) if first.len() > 1 && first.starts_with('-') => {
            let mut stripped = Vec::with_capacity(argv.len());
            stripped.push(first.strip_prefix('-').unwrap_or(first).to_string());
            stripped.extend(rest.iter().cloned());
            (true, stripped)
        }
        _ => (false, argv.to_vec()),
    }
}

/// The complete process environment: `vars` plus the context's own
/// `VIRTUAL_ENV`, with its bin directory first on `PATH`.
pub fn process_env(
    context: &ExecutionContext,
    vars: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut env = vars.clone();
    env.insert(
        "VIRTUAL_ENV".to_string(),
        context.root.to_string_lossy().into_owned(),
    );
    let mut entries = vec![context.bin_dir.clone()];
    if let Some(path) = vars.get("PATH") {
        entries.extend(std::env::split_paths(path));
    }
    let path = match std::env::join_paths(&entries) {
        Ok(joined) => joined.to_string_lossy().into_owned(),
        Err(e) => {
            log::warn!("Could not build PATH for context '{}': {}", context.key, e);
            context.bin_dir.to_string_lossy().into_owned()
        }
    };
    env.insert("PATH".to_string(), path);
    env
}

/// Runs `batch.commands` in order.
///
/// The first command that exits non-zero stops the batch and the rest are
/// recorded as skipped, unless `ignore_errors` is set or the command carries
/// the `-` marker. A command that cannot be spawned always stops the batch.
pub fn run(
    batch: CommandBatch<'_>,
    listener: &Arc<dyn RunListener>,
    cancellation_token: &CancellationToken,
) -> BatchReport {
    let env = process_env(batch.context, batch.vars);
    let sink: OutputSink = {
        let listener = listener.clone();
        let env_name = batch.env_name.to_string();
        Arc::new(move |line: &str| listener.output_line(&env_name, line))
    };

    let mut outcomes = Vec::with_capacity(batch.commands.len());
    let mut error = None;
    let mut remaining = batch.commands.iter();

    for command in remaining.by_ref() {
        let (ignore_exit, argv) = parse_ignore_marker(command);
        listener.command_started(batch.env_name, &argv);
        log::trace!("[{}] running: {:?}", batch.env_name, argv);

        let request = ProcessRequest {
            argv: &argv,
            cwd: batch.cwd,
            env: &env,
            clear_env: true,
        };
        match executor::execute_streaming(request, &sink, cancellation_token) {
            Ok(output) => {
                let failed = !output.success && !ignore_exit;
                if !output.success && ignore_exit {
                    log::debug!(
                        "[{}] ignoring exit code {:?} of '{}'",
                        batch.env_name,
                        output.exit_code,
                        argv.join(" ")
                    );
                }
                outcomes.push(CommandOutcome {
                    argv,
                    status: if failed {
                        CommandStatus::Failed
                    } else {
                        CommandStatus::Succeeded
                    },
                    exit_code: output.exit_code,
                    duration: output.duration,
                    output: output.output,
                    error: None,
                });
                if failed && !batch.ignore_errors {
                    break;
                }
            }
            Err(e) => {
                outcomes.push(CommandOutcome {
                    argv,
                    status: CommandStatus::Errored,
                    exit_code: None,
                    duration: Duration::ZERO,
                    output: String::new(),
                    error: Some(e.to_string()),
                });
                error = Some(e);
                break;
            }
        }
    }

    outcomes.extend(
        remaining.map(|command| CommandOutcome::skipped(parse_ignore_marker(command).1)),
    );
    BatchReport { outcomes, error }
}
