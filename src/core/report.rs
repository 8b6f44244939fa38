//! # Result Aggregator
//!
//! Folds per-environment results into a [`Summary`], decides the process exit
//! code and renders the console output of an invocation.

use crate::{
    constants::{EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_SUCCESS, EXIT_USAGE},
    core::runner::RunListener,
    models::{CommandStatus, RunResult, RunStatus},
};
use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;
use std::{fmt::Write, fs, path::Path, time::Duration};

/// The outcome of a whole invocation.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    /// Environments whose commands all succeeded.
    pub succeeded: usize,
    /// Environments with a failing command.
    pub failed: usize,
    /// Environments that could not be built or run.
    pub errored: usize,
    /// Environments never started.
    pub skipped: usize,
    /// The operator interrupted the run.
    pub interrupted: bool,
    /// One result per selected environment, in selection order.
    pub results: Vec<RunResult>,
}

impl Summary {
    /// Number of environments in the invocation.
    pub fn total(&self) -> usize {
        self.results.len()
    }
}

/// Counts `results` per status, keeping their order.
pub fn aggregate(results: Vec<RunResult>) -> Summary {
    let mut summary = Summary::default();
    for result in &results {
        match result.status {
            RunStatus::Success => summary.succeeded += 1,
            RunStatus::Failure => summary.failed += 1,
            RunStatus::Error => summary.errored += 1,
            RunStatus::Skipped => summary.skipped += 1,
        }
    }
    summary.results = results;
    summary
}

/// `0` only when every selected environment succeeded; `2` when nothing was
/// selected; `130` after an interruption; `1` otherwise.
pub fn exit_code(summary: &Summary) -> i32 {
    if summary.results.is_empty() {
        EXIT_USAGE
    } else if summary.interrupted {
        EXIT_INTERRUPTED
    } else if summary.succeeded == summary.total() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}

/// Writes the summary as pretty-printed JSON.
pub fn write_json(summary: &Summary, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)
        .context("Failed to serialize the result summary.")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write results to '{}'", path.display()))
}

fn format_duration(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f64())
}

fn status_label(status: RunStatus) -> ColoredString {
    match status {
        RunStatus::Success => "OK".green().bold(),
        RunStatus::Failure => "FAIL".red().bold(),
        RunStatus::Error => "ERROR".red().bold(),
        RunStatus::Skipped => "SKIP".yellow().bold(),
    }
}

/// A short explanation of why an environment did not succeed.
fn reason(result: &RunResult) -> Option<String> {
    match result.status {
        RunStatus::Success => None,
        RunStatus::Failure => result
            .commands
            .iter()
            .find(|c| c.status == CommandStatus::Failed)
            .map(|c| {
                let code = c
                    .exit_code
                    .map_or_else(|| "signal".to_string(), |code| code.to_string());
                format!("'{}' exited with {}", c.argv.join(" "), code)
            }),
        RunStatus::Error | RunStatus::Skipped => result.error.clone(),
    }
}

/// The end-of-run table: one line per environment, then the totals.
pub fn render_summary(summary: &Summary) -> String {
    let width = summary
        .results
        .iter()
        .map(|r| r.name.len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    let _ = writeln!(out, "{}", "── summary ──".dimmed());
    for result in &summary.results {
        let label = status_label(result.status);
        let _ = write!(
            out,
            "  {:<width$}  {:<5}  {}",
            result.name.cyan(),
            label,
            format_duration(result.duration).dimmed(),
            width = width
        );
        if let Some(reason) = reason(result) {
            let _ = write!(out, "  {}", reason.dimmed());
        }
        out.push('\n');
    }

    let mut totals = vec![format!("{} succeeded", summary.succeeded).green().to_string()];
    if summary.failed > 0 {
        totals.push(format!("{} failed", summary.failed).red().to_string());
    }
    if summary.errored > 0 {
        totals.push(format!("{} errored", summary.errored).red().to_string());
    }
    if summary.skipped > 0 {
        totals.push(format!("{} skipped", summary.skipped).yellow().to_string());
    }
    let _ = writeln!(out, "  {}", totals.join(", "));
    if summary.interrupted {
        let _ = writeln!(out, "  {}", "interrupted".yellow().bold());
    }
    out
}

/// Captured output worth showing after the run. Environments that did not
/// succeed are always shown in full; successful ones only when `verbose`.
/// `streamed` tells whether command output already went to the console.
pub fn render_outputs(summary: &Summary, streamed: bool, verbose: bool) -> String {
    let mut out = String::new();
    for result in &summary.results {
        let failed = matches!(result.status, RunStatus::Failure | RunStatus::Error);
        if !failed && !verbose {
            continue;
        }
        let body = if streamed {
            result.setup_output.clone()
        } else {
            result.combined_output()
        };
        if body.trim().is_empty() {
            continue;
        }
        let _ = writeln!(out, "{} {}", "┌─ output of".dimmed(), result.name.cyan().bold());
        for line in body.lines() {
            let _ = writeln!(out, "{} {}", "│".dimmed(), line);
        }
        let _ = writeln!(out, "{}", "└─".dimmed());
    }
    out
}

/// How command output reaches the console while environments run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Print output as it arrives (sequential runs).
    Stream,
    /// Print output as it arrives, each line prefixed with its environment.
    Prefixed,
    /// Only report progress; output is shown after the run.
    Quiet,
}

impl OutputMode {
    /// Sequential runs stream; parallel runs stay quiet unless `live`.
    pub fn for_run(workers: usize, live: bool) -> Self {
        match (workers, live) {
            (0 | 1, _) => OutputMode::Stream,
            (_, true) => OutputMode::Prefixed,
            (_, false) => OutputMode::Quiet,
        }
    }

    /// Whether output reaches the console while commands run.
    pub fn streams(self) -> bool {
        self != OutputMode::Quiet
    }
}

/// Prints the progress of an invocation to stdout.
#[derive(Debug)]
pub struct ConsoleListener {
    mode: OutputMode,
}

impl ConsoleListener {
    /// A listener printing in `mode`.
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }
}

impl RunListener for ConsoleListener {
    fn environment_started(&self, env: &str) {
        match self.mode {
            OutputMode::Stream => println!("{} {}", "┌─".dimmed(), env.cyan().bold()),
            OutputMode::Prefixed | OutputMode::Quiet => {
                println!("{} {}", "├─> started".dimmed(), env.cyan())
            }
        }
    }

    fn command_started(&self, env: &str, argv: &[String]) {
        let command = argv.join(" ");
        match self.mode {
            OutputMode::Stream => println!("{} {}", "→".blue(), command.green()),
            OutputMode::Prefixed => {
                println!("{} {} {}", format!("[{env}]").dimmed(), "→".blue(), command.green())
            }
            OutputMode::Quiet => log::debug!("[{}] → {}", env, command),
        }
    }

    fn output_line(&self, env: &str, line: &str) {
        match self.mode {
            OutputMode::Stream => println!("{line}"),
            OutputMode::Prefixed => println!("{} {}", format!("[{env}]").dimmed(), line),
            OutputMode::Quiet => {}
        }
    }

    fn environment_finished(&self, result: &RunResult) {
        let prefix = match self.mode {
            OutputMode::Stream => "└─",
            OutputMode::Prefixed | OutputMode::Quiet => "├─>",
        };
        println!(
            "{} {} {} {}",
            prefix.dimmed(),
            result.name.cyan(),
            status_label(result.status),
            format_duration(result.duration).dimmed()
        );
    }
}
