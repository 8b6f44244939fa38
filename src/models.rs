// src/models.rs

//! Data types shared between the declaration, the runner and the reports.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

// --- DECLARATION MODELS (What is read from `toxide.toml`) ---

/// A command as written in the declaration. Uses `untagged` for flexible syntax:
/// either an explicit token list or a single line split with shell rules.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum CommandDecl {
    /// `["pytest", "-x"]`
    Tokens(Vec<String>),
    /// `"pytest -x"`
    Line(String),
}

impl CommandDecl {
    /// Returns the argument tokens of this command, or `None` if a line
    /// has unbalanced quoting.
    pub fn to_tokens(&self) -> Option<Vec<String>> {
        match self {
            CommandDecl::Tokens(tokens) => Some(tokens.clone()),
            CommandDecl::Line(line) => shlex::split(line),
        }
    }
}

/// Command templates used by the external installer.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    /// Creates an empty context at `{envdir}`.
    pub create: Option<Vec<String>>,
    /// Installs `{packages}` into an existing context.
    pub install: Option<Vec<String>>,
}

/// The `[orchestrator]` table.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Environments (or factor templates) run when no selection is given.
    pub env_list: Vec<String>,
    /// Where contexts live. Supports `~` and `$VAR`; relative to the declaration root.
    pub work_dir: Option<String>,
    /// Files whose content invalidates every context when it changes.
    pub lock_files: Vec<String>,
    /// Default worker count when `--parallel` is not given.
    pub parallel: Option<usize>,
    /// `[orchestrator.installer]`.
    pub installer: InstallerConfig,
}

// --- IN-MEMORY MODELS ---

/// One concrete, fully merged environment.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSpec {
    /// Unique after expansion.
    pub name: String,
    /// The factor values bound by expansion, in template order.
    pub factors: Vec<String>,
    /// Shown by `toxide list`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Feature groups of the project to install.
    pub extras: BTreeSet<String>,
    /// Requirements installed after the project.
    pub deps: Vec<String>,
    /// Host variables copied into the environment.
    pub passenv: BTreeSet<String>,
    /// Tokenized commands, placeholders still unsubstituted.
    pub commands: Vec<Vec<String>>,
    /// Rebuild the context once per invocation.
    pub isolated: bool,
    /// Install `deps` only.
    pub skip_install: bool,
    /// Keep going after a failing command.
    pub ignore_errors: bool,
    /// Interpreter the context is created with.
    pub base_python: String,
    /// Selection labels.
    pub labels: BTreeSet<String>,
    /// Context key. Environments naming the same context share one installation root.
    pub context: String,
    /// Variables set explicitly, after `passenv`.
    pub setenv: BTreeMap<String, String>,
}

/// Final state of one environment in an invocation.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every command succeeded.
    Success,
    /// A command exited non-zero.
    Failure,
    /// The context or a command could not be made to run.
    Error,
    /// Never started.
    Skipped,
}

/// Final state of one command.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    /// Exited zero, or non-zero with its exit code ignored.
    Succeeded,
    /// Exited non-zero.
    Failed,
    /// Could not be spawned, or was killed on cancellation.
    Errored,
    /// Not run because an earlier command stopped the batch.
    Skipped,
}

/// What happened to one command.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// The argv as run, without the `-` marker.
    pub argv: Vec<String>,
    /// Final state.
    pub status: CommandStatus,
    /// `None` when the command never exited normally.
    pub exit_code: Option<i32>,
    /// Wall time of the command.
    pub duration: Duration,
    /// Combined stdout and stderr, in arrival order.
    pub output: String,
    /// Why the command errored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandOutcome {
    /// An outcome for a command that was never spawned.
    pub fn skipped(argv: Vec<String>) -> Self {
        Self {
            argv,
            status: CommandStatus::Skipped,
            exit_code: None,
            duration: Duration::ZERO,
            output: String::new(),
            error: None,
        }
    }
}

/// The result of one environment.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// The environment name.
    pub name: String,
    /// Final state.
    pub status: RunStatus,
    /// Outcomes in declaration order.
    pub commands: Vec<CommandOutcome>,
    /// Set for `Error` and `Skipped` results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Installer output, kept when the context could not be built.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub setup_output: String,
    /// Wall time of the whole environment.
    pub duration: Duration,
}

impl RunResult {
    /// A result for an environment that never started.
    pub fn skipped(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            status: RunStatus::Skipped,
            commands: Vec::new(),
            error: Some(reason.to_string()),
            setup_output: String::new(),
            duration: Duration::ZERO,
        }
    }

    /// The captured output of every command, concatenated.
    pub fn combined_output(&self) -> String {
        let mut combined = self.setup_output.clone();
        for outcome in &self.commands {
            combined.push_str(&outcome.output);
        }
        combined
    }
}

// --- CONTEXT STAMP (written with bincode inside each context) ---

/// Records what a context was built from, so the next run can detect staleness.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContextStamp {
    /// Compared on every invocation.
    pub fingerprint: String,
    /// The rest is informational.
    pub base_python: String,
    /// Resolved interpreter path.
    pub interpreter: String,
    /// Everything handed to the installer.
    pub packages: Vec<String>,
}
