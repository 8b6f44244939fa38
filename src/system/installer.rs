// src/system/installer.rs

//! The package installer interface and its command-template implementation.

use crate::{
    CancellationToken,
    models::InstallerConfig,
    system::executor::{self, ExecutionError, ProcessRequest},
};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

lazy_static! {
    static ref TEMPLATE_RE: Regex =
        Regex::new(r"\{([a-z_]+)\}").expect("template pattern is valid");
}

const DEFAULT_CREATE: &[&str] = &["{base_python}", "-m", "venv", "{envdir}"];
const DEFAULT_INSTALL: &[&str] = &["{envbindir}/python", "-m", "pip", "install", "{packages}"];

/// Errors of the installer steps.
#[derive(Error, Debug)]
pub enum InstallerError {
    /// The installer ran and exited unsuccessfully.
    #[error("Installer step '{step}' failed ({}).", describe_exit(.exit_code))]
    Failed {
        /// `create` or `install`.
        step: &'static str,
        /// `None` when killed by a signal.
        exit_code: Option<i32>,
        /// Everything the step printed.
        output: String,
    },
    /// The installer could not be run at all.
    #[error("Installer step '{step}' could not be run: {source}")]
    Execution {
        /// `create` or `install`.
        step: &'static str,
        /// Why it could not run.
        #[source]
        source: ExecutionError,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

impl InstallerError {
    /// Whatever the installer printed before failing.
    pub fn output(&self) -> &str {
        match self {
            InstallerError::Failed { output, .. } => output,
            InstallerError::Execution { .. } => "",
        }
    }

    /// True when the step was killed because the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            InstallerError::Execution {
                source: ExecutionError::Cancelled,
                ..
            }
        )
    }
}

/// Where a context lives and how to reach its tools.
#[derive(Debug, Clone, Copy)]
pub struct ContextLocation<'a> {
    /// The context directory.
    pub envdir: &'a Path,
    /// Its bin directory.
    pub bin_dir: &'a Path,
}

impl ContextLocation<'_> {
    fn display_parts(&self, root: &Path) -> (String, String, String) {
        (
            self.envdir.to_string_lossy().into_owned(),
            self.bin_dir.to_string_lossy().into_owned(),
            root.to_string_lossy().into_owned(),
        )
    }
}

/// The narrow interface to the external package installer.
///
/// Both operations return the installer's captured output on success.
pub trait Installer: Send + Sync {
    /// Creates an empty context at `location.envdir` using `interpreter`.
    fn create(
        &self,
        location: ContextLocation<'_>,
        interpreter: &Path,
        cancellation_token: &CancellationToken,
    ) -> Result<String, InstallerError>;

    /// Installs `packages` into an existing context.
    fn install(
        &self,
        location: ContextLocation<'_>,
        packages: &[String],
        cancellation_token: &CancellationToken,
    ) -> Result<String, InstallerError>;

    /// A stable description of how this installer behaves. It is part of every
    /// context fingerprint, so changing it rebuilds existing contexts.
    fn identity(&self) -> String;
}

/// Shells out to the command templates of `[orchestrator.installer]`.
///
/// Templates understand `{base_python}`, `{envdir}`, `{envbindir}`, `{root}`
/// and `{packages}`; the last one is spliced as separate arguments.
/// The installer inherits the orchestrator's own environment.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    root: PathBuf,
    create: Vec<String>,
    install: Vec<String>,
}

impl CommandInstaller {
    /// Uses the configured templates, or `venv` and `pip` for those unset.
    pub fn new(root: &Path, config: &InstallerConfig) -> Self {
        let or_default = |template: &Option<Vec<String>>, default: &[&str]| {
            template
                .clone()
                .unwrap_or_else(|| default.iter().map(|s| s.to_string()).collect())
        };
        Self {
            root: root.to_path_buf(),
            create: or_default(&config.create, DEFAULT_CREATE),
            install: or_default(&config.install, DEFAULT_INSTALL),
        }
    }

    fn run_step(
        &self,
        step: &'static str,
        argv: Vec<String>,
        cancellation_token: &CancellationToken,
    ) -> Result<String, InstallerError> {
        log::debug!("Installer {}: {}", step, argv.join(" "));
        let inherited = BTreeMap::new();
        let request = ProcessRequest {
            argv: &argv,
            cwd: &self.root,
            env: &inherited,
            clear_env: false,
        };
        let output = executor::execute_captured(request, cancellation_token)
            .map_err(|source| InstallerError::Execution { step, source })?;
        if output.success {
            Ok(output.output)
        } else {
            Err(InstallerError::Failed {
                step,
                exit_code: output.exit_code,
                output: output.output,
            })
        }
    }
}

impl Installer for CommandInstaller {
    fn create(
        &self,
        location: ContextLocation<'_>,
        interpreter: &Path,
        cancellation_token: &CancellationToken,
    ) -> Result<String, InstallerError> {
        let interpreter = interpreter.to_string_lossy();
        let (envdir, bin_dir, root) = location.display_parts(&self.root);
        let argv = render(
            &self.create,
            &[
                ("base_python", &*interpreter),
                ("envdir", &*envdir),
                ("envbindir", &*bin_dir),
                ("root", &*root),
            ],
            &[],
        );
        self.run_step("create", argv, cancellation_token)
    }

    fn install(
        &self,
        location: ContextLocation<'_>,
        packages: &[String],
        cancellation_token: &CancellationToken,
    ) -> Result<String, InstallerError> {
        let (envdir, bin_dir, root) = location.display_parts(&self.root);
        let argv = render(
            &self.install,
            &[("envdir", &*envdir), ("envbindir", &*bin_dir), ("root", &*root)],
            packages,
        );
        self.run_step("install", argv, cancellation_token)
    }

    fn identity(&self) -> String {
        format!("create={:?};install={:?}", self.create, self.install)
    }
}

/// Substitutes `{name}` placeholders in every token. A token that is exactly
/// `{packages}` expands to one argument per package; unknown names are kept.
fn render(template: &[String], values: &[(&str, &str)], packages: &[String]) -> Vec<String> {
    let joined = packages.join(" ");
    let mut argv = Vec::with_capacity(template.len() + packages.len());
    for token in template {
        if token == "{packages}" {
            argv.extend(packages.iter().cloned());
            continue;
        }
        let rendered = TEMPLATE_RE.replace_all(token, |caps: &Captures<'_>| {
            let name = caps.get(1).map_or("", |m| m.as_str());
            let value = match name {
                "packages" => Some(joined.as_str()),
                _ => values.iter().find(|(n, _)| *n == name).map(|(_, v)| *v),
            };
            value
                .unwrap_or_else(|| caps.get(0).map_or("", |m| m.as_str()))
                .to_string()
        });
        argv.push(rendered.into_owned());
    }
    argv
}
