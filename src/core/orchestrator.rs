//! # Orchestrator
//!
//! Drives one invocation: picks the environments, fans them out over a
//! bounded `rayon` pool and turns every environment into exactly one
//! [`RunResult`], whatever happens to it.

use crate::{
    CancellationToken,
    core::{
        config_loader::Declaration,
        injector::{self, InjectionScope},
        materializer::{ContextError, ExecutionContext, Materializer, MaterializerOptions},
        paths,
        registry::{MatrixSelection, RegistryError, Selector},
        report::{self, Summary},
        runner::{self, CommandBatch, RunListener},
    },
    models::{EnvironmentSpec, RunResult, RunStatus},
    system::{
        executor::ExecutionError,
        installer::{CommandInstaller, Installer},
    },
};
use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use std::{
    collections::BTreeMap,
    sync::{Arc, atomic::Ordering},
    time::Instant,
};

/// Worker count for `--parallel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    /// Exactly this many workers.
    Fixed(usize),
    /// One worker per available CPU.
    Auto,
}

impl Parallelism {
    /// Parses a positive number or `auto`.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.eq_ignore_ascii_case("auto") {
            return Ok(Parallelism::Auto);
        }
        match raw.parse::<usize>() {
            Ok(0) | Err(_) => Err(anyhow!(
                "Invalid value '{}' for --parallel: expected a positive number or 'auto'.",
                raw
            )),
            Ok(n) => Ok(Parallelism::Fixed(n)),
        }
    }

    /// The worker count this resolves to on this machine.
    pub fn workers(self) -> usize {
        match self {
            Parallelism::Fixed(n) => n.max(1),
            Parallelism::Auto => std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

/// Options of a `run` invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// The operator's selection; `None` when nothing was selected explicitly.
    pub selectors: Option<Vec<Selector>>,
    /// Substituted for `{posargs}`.
    pub posargs: Vec<String>,
    /// Overrides `[orchestrator].parallel`.
    pub parallel: Option<Parallelism>,
    /// Rebuild every selected context once.
    pub recreate: bool,
    /// Build contexts but do not run commands.
    pub notest: bool,
}

impl RunOptions {
    /// `--parallel`, else `[orchestrator].parallel`, else one.
    pub fn workers(&self, declaration: &Declaration) -> usize {
        self.parallel
            .or(declaration.orchestrator.parallel.map(Parallelism::Fixed))
            .unwrap_or(Parallelism::Fixed(1))
            .workers()
    }
}

/// Resolves the environments to run. Without an explicit selection the
/// declaration's `env_list` applies, and when that is empty, every
/// environment. An explicit selection that expands to nothing selects nothing.
pub fn resolve_selection(
    declaration: &Declaration,
    selectors: Option<&[Selector]>,
) -> Result<MatrixSelection> {
    let effective: Vec<Selector> = if let Some(selectors) = selectors {
        selectors.to_vec()
    } else if !declaration.orchestrator.env_list.is_empty() {
        let mut from_list = Vec::new();
        for entry in &declaration.orchestrator.env_list {
            from_list.extend(Selector::from_env_arg(entry)?);
        }
        from_list
    } else {
        vec![Selector::All]
    };
    log::debug!("Effective selectors: {:?}", effective);
    Ok(declaration.registry.select(&effective)?)
}

/// Everything shared by the workers of one invocation.
pub struct Orchestrator<'a> {
    declaration: &'a Declaration,
    materializer: Materializer,
    listener: Arc<dyn RunListener>,
    host_env: BTreeMap<String, String>,
    cancellation_token: CancellationToken,
}

impl std::fmt::Debug for Orchestrator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("root", &self.declaration.root)
            .field("materializer", &self.materializer)
            .finish_non_exhaustive()
    }
}

impl<'a> Orchestrator<'a> {
    /// Builds an orchestrator that installs through the declaration's
    /// `[orchestrator.installer]` templates.
    pub fn new(
        declaration: &'a Declaration,
        listener: Arc<dyn RunListener>,
        recreate: bool,
        cancellation_token: CancellationToken,
    ) -> Result<Self> {
        let installer = Arc::new(CommandInstaller::new(
            &declaration.root,
            &declaration.orchestrator.installer,
        ));
        Self::with_installer(declaration, installer, listener, recreate, cancellation_token)
    }

    /// Builds an orchestrator around any [`Installer`].
    pub fn with_installer(
        declaration: &'a Declaration,
        installer: Arc<dyn Installer>,
        listener: Arc<dyn RunListener>,
        recreate: bool,
        cancellation_token: CancellationToken,
    ) -> Result<Self> {
        let work_dir = paths::resolve_work_dir(
            &declaration.root,
            declaration.orchestrator.work_dir.as_deref(),
        )?;
        let materializer = Materializer::new(
            &declaration.root,
            &work_dir,
            &declaration.orchestrator.lock_files,
            installer,
            MaterializerOptions { recreate },
        );
        Ok(Self {
            declaration,
            materializer,
            listener,
            host_env: host_environment(),
            cancellation_token,
        })
    }

    /// Replaces the snapshot of the host environment `passenv` reads from.
    pub fn with_host_env(mut self, host_env: BTreeMap<String, String>) -> Self {
        self.host_env = host_env;
        self
    }

    /// The materializer owning this declaration's contexts.
    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    /// Runs every selected environment and aggregates the results.
    ///
    /// Selection errors are returned before anything executes. Failures
    /// inside an environment never abort its siblings.
    pub fn run(&self, options: &RunOptions) -> Result<Summary> {
        let selection = resolve_selection(self.declaration, options.selectors.as_deref())?;
        if selection.is_empty() {
            log::warn!("The selection matched no environment.");
            return Ok(report::aggregate(Vec::new()));
        }

        let workers = options.workers(self.declaration).min(selection.len());
        log::debug!(
            "Running {} environment(s) with {} worker(s).",
            selection.len(),
            workers
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("toxide-worker-{i}"))
            .build()
            .context("Failed to start the worker pool.")?;

        let results: Vec<RunResult> = pool.install(|| {
            selection
                .names()
                .par_iter()
                .map(|name| self.run_by_name(name, options))
                .collect()
        });

        let mut summary = report::aggregate(results);
        summary.interrupted = self.cancellation_token.load(Ordering::SeqCst);
        Ok(summary)
    }

    fn run_by_name(&self, name: &str, options: &RunOptions) -> RunResult {
        match self.declaration.registry.lookup(name) {
            Ok(spec) => self.run_environment(spec, options),
            Err(RegistryError::UnknownEnvironment { .. }) => {
                RunResult::skipped(name, "environment disappeared from the registry")
            }
        }
    }

    /// Materializes, injects and runs one environment.
    pub fn run_environment(&self, spec: &EnvironmentSpec, options: &RunOptions) -> RunResult {
        if self.cancellation_token.load(Ordering::SeqCst) {
            return RunResult::skipped(&spec.name, "not started: run was interrupted");
        }

        let started = Instant::now();
        self.listener.environment_started(&spec.name);
        let mut result = self.execute(spec, options);
        result.duration = started.elapsed();
        self.listener.environment_finished(&result);
        result
    }

    fn execute(&self, spec: &EnvironmentSpec, options: &RunOptions) -> RunResult {
        // The context stays locked against rebuilds until the batch is over.
        self.materializer
            .with_context(spec, &self.cancellation_token, |context| {
                self.run_in_context(spec, context, options)
            })
            .unwrap_or_else(|e| context_failure(spec, e))
    }

    fn run_in_context(
        &self,
        spec: &EnvironmentSpec,
        context: &ExecutionContext,
        options: &RunOptions,
    ) -> RunResult {
        if options.notest {
            return RunResult {
                name: spec.name.clone(),
                status: RunStatus::Success,
                commands: Vec::new(),
                error: None,
                setup_output: context.setup_output.clone(),
                duration: Default::default(),
            };
        }

        let injected = injector::compute_env(
            spec,
            &self.host_env,
            &options.posargs,
            InjectionScope {
                project_root: &self.declaration.root,
                context,
            },
        );
        let batch = runner::run(
            CommandBatch {
                env_name: &spec.name,
                context,
                vars: &injected.vars,
                commands: &injected.commands,
                cwd: &self.declaration.root,
                ignore_errors: spec.ignore_errors,
            },
            &self.listener,
            &self.cancellation_token,
        );

        let (status, error) = match &batch.error {
            Some(ExecutionError::Cancelled) => (RunStatus::Error, Some("cancelled".to_string())),
            Some(e) => (RunStatus::Error, Some(e.to_string())),
            None if batch.any_failed() => (RunStatus::Failure, None),
            None => (RunStatus::Success, None),
        };
        RunResult {
            name: spec.name.clone(),
            status,
            commands: batch.outcomes,
            error,
            setup_output: String::new(),
            duration: Default::default(),
        }
    }
}

fn context_failure(spec: &EnvironmentSpec, error: ContextError) -> RunResult {
    log::debug!("Context for '{}' unavailable: {}", spec.name, error);
    let message = match &error {
        ContextError::Cancelled => "cancelled".to_string(),
        other => other.to_string(),
    };
    RunResult {
        name: spec.name.clone(),
        status: RunStatus::Error,
        commands: Vec::new(),
        error: Some(message),
        setup_output: error.output().to_string(),
        duration: Default::default(),
    }
}

/// A snapshot of the orchestrator's own environment. Non-UTF-8 entries are skipped.
pub fn host_environment() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{
        constants::{EXIT_FAILURE, EXIT_SUCCESS, EXIT_USAGE},
        core::{
            config_loader::parse_declaration, materializer::tests::CountingInstaller,
            runner::SilentListener,
        },
        models::CommandStatus,
    };
    use std::path::Path;
    use std::sync::atomic::AtomicBool;

    fn token() -> CancellationToken {
        Arc::new(AtomicBool::new(false))
    }

    fn declaration(dir: &Path, content: &str) -> Declaration {
        parse_declaration(content, dir.to_path_buf()).unwrap()
    }

    fn scripts(pairs: &[(&str, &str)]) -> Arc<CountingInstaller> {
        Arc::new(CountingInstaller {
            scripts: pairs
                .iter()
                .map(|(name, body)| (name.to_string(), body.to_string()))
                .collect(),
            ..Default::default()
        })
    }

    fn orchestrator<'a>(
        declaration: &'a Declaration,
        installer: Arc<CountingInstaller>,
        cancellation_token: CancellationToken,
    ) -> Orchestrator<'a> {
        Orchestrator::with_installer(
            declaration,
            installer,
            Arc::new(SilentListener),
            false,
            cancellation_token,
        )
        .unwrap()
        .with_host_env(BTreeMap::from([
            ("PATH".to_string(), "/usr/bin:/bin".to_string()),
            ("CI".to_string(), "true".to_string()),
        ]))
    }

    fn select(raw: &str) -> RunOptions {
        RunOptions {
            selectors: Some(Selector::from_env_arg(raw).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_environment_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let declaration = declaration(
            dir.path(),
            r#"
            [env.lint-py310]
            base_python = "sh"
            extras = ["lint"]
            commands = [["check"]]
            "#,
        );
        let installer = scripts(&[("check", "exit 0")]);
        let summary = orchestrator(&declaration, installer.clone(), token())
            .run(&select("lint-py310"))
            .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.total(), 1);
        assert_eq!(report::exit_code(&summary), EXIT_SUCCESS);
        assert_eq!(installer.installs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_template_expansion_runs_every_cell() {
        let dir = tempfile::tempdir().unwrap();
        let declaration = declaration(
            dir.path(),
            r#"
            [defaults]
            base_python = "sh"
            passenv = ["PATH"]

            [env."test-py{310,311}"]
            commands = [["pytest"]]
            "#,
        );
        let names: Vec<&str> = declaration.registry.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["test-py310", "test-py311"]);

        let options = RunOptions {
            parallel: Some(Parallelism::Fixed(2)),
            ..Default::default()
        };
        let summary = orchestrator(&declaration, scripts(&[("pytest", "exit 1")]), token())
            .run(&options)
            .unwrap();

        assert_eq!(summary.failed, 2);
        assert!(summary.results.iter().all(|r| r.status == RunStatus::Failure));
        assert_eq!(summary.results[0].name, "test-py310");
        assert_eq!(summary.results[1].name, "test-py311");
        assert_eq!(report::exit_code(&summary), EXIT_FAILURE);
    }

    #[test]
    fn test_only_declared_variables_reach_commands() {
        let dir = tempfile::tempdir().unwrap();
        let declaration = declaration(
            dir.path(),
            r#"
            [env.ci]
            base_python = "sh"
            skip_install = true
            passenv = ["CI"]
            setenv = { MODE = "fast" }
            commands = [["/bin/sh", "-c", "echo \"$CI/$MODE/[$PATH]\""]]
            "#,
        );
        let summary = orchestrator(&declaration, Arc::default(), token())
            .run(&select("ci"))
            .unwrap();
        let result = &summary.results[0];
        assert_eq!(result.status, RunStatus::Success);
        let bin = paths::bin_dir(&dir.path().join(".toxide").join("ci"));
        assert_eq!(
            result.commands[0].output.trim(),
            format!("true/fast/[{}]", bin.display())
        );
    }

    #[test]
    fn test_unknown_environment_fails_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let declaration = declaration(
            dir.path(),
            r#"
            [env.lint]
            base_python = "sh"
            commands = [["check"]]
            "#,
        );
        let installer = scripts(&[("check", "exit 0")]);
        let err = orchestrator(&declaration, installer.clone(), token())
            .run(&select("lint,nope"))
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::UnknownEnvironment { name, .. }) if name == "nope"
        ));
        assert_eq!(installer.creates.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_env_list_and_empty_selection() {
        let dir = tempfile::tempdir().unwrap();
        let declaration = declaration(
            dir.path(),
            r#"
            [orchestrator]
            env_list = ["a"]

            [env.a]
            base_python = "sh"
            skip_install = true
            commands = [["/bin/sh", "-c", "exit 0"]]

            [env.b]
            base_python = "sh"
            commands = [["/bin/sh", "-c", "exit 1"]]
            "#,
        );
        let orchestrator = orchestrator(&declaration, Arc::default(), token());
        let default_run = orchestrator.run(&RunOptions::default()).unwrap();
        assert_eq!(default_run.total(), 1);
        assert_eq!(default_run.results[0].name, "a");

        let nothing = orchestrator
            .run(&RunOptions {
                selectors: Some(vec![Selector::Factor("py399".into())]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(report::exit_code(&nothing), EXIT_USAGE);

        // An explicit selection that expands to nothing does not fall back to env_list.
        let empty_template = orchestrator.run(&select("test-py{}")).unwrap();
        assert_eq!(empty_template.total(), 0);
        assert_eq!(report::exit_code(&empty_template), EXIT_USAGE);
    }

    #[test]
    fn test_build_failure_and_missing_command_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let declaration = declaration(
            dir.path(),
            r#"
            [env.broken]
            base_python = "sh"
            commands = [["check"]]

            [env.missing]
            base_python = "sh"
            skip_install = true
            commands = [["tool-that-is-not-installed"], ["/bin/sh", "-c", "exit 0"]]
            "#,
        );
        let failing = Arc::new(CountingInstaller {
            fail_install: true,
            ..Default::default()
        });
        let summary = orchestrator(&declaration, failing, token())
            .run(&select("broken,missing"))
            .unwrap();

        let broken = &summary.results[0];
        assert_eq!(broken.status, RunStatus::Error);
        assert!(broken.setup_output.contains("no matching distribution"));

        let missing = &summary.results[1];
        assert_eq!(missing.status, RunStatus::Error);
        assert_eq!(missing.commands[0].status, CommandStatus::Errored);
        assert_eq!(missing.commands[1].status, CommandStatus::Skipped);
        assert_eq!(summary.errored, 2);
    }

    #[test]
    fn test_shared_context_is_built_once_in_parallel() {
        let dir = tempfile::tempdir().unwrap();
        let declaration = declaration(
            dir.path(),
            r#"
            [env."{lint,type,audit}"]
            base_python = "sh"
            context = "static"
            commands = [["/bin/sh", "-c", "exit 0"]]
            "#,
        );
        let installer = Arc::new(CountingInstaller::default());
        let options = RunOptions {
            parallel: Some(Parallelism::Fixed(3)),
            ..Default::default()
        };
        let summary = orchestrator(&declaration, installer.clone(), token())
            .run(&options)
            .unwrap();
        assert_eq!(summary.succeeded, 3);
        assert_eq!(installer.creates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shared_context_is_not_wiped_while_a_sibling_runs() {
        let dir = tempfile::tempdir().unwrap();
        let declaration = declaration(
            dir.path(),
            r#"
            [env."{a,b}"]
            base_python = "sh"
            skip_install = true
            context = "shared"
            passenv = ["PATH"]
            commands = [[
                "/bin/sh", "-c",
                "touch \"$VIRTUAL_ENV/marker-{envname}\" && sleep 0.3 && test -f \"$VIRTUAL_ENV/marker-{envname}\"",
            ]]

            [env.a]
            deps = ["one"]

            [env.b]
            deps = ["two"]
            "#,
        );
        let options = RunOptions {
            parallel: Some(Parallelism::Fixed(2)),
            ..Default::default()
        };
        let summary = orchestrator(&declaration, Arc::default(), token())
            .run(&options)
            .unwrap();

        for result in &summary.results {
            assert_eq!(result.status, RunStatus::Success, "{}: {:?}", result.name, result.commands);
        }
        assert_eq!(summary.succeeded, 2);
    }

    #[test]
    fn test_cancelling_a_running_command_errors_the_environment() {
        let dir = tempfile::tempdir().unwrap();
        let declaration = declaration(
            dir.path(),
            r#"
            [env.slow]
            base_python = "sh"
            skip_install = true
            commands = [["/bin/sh", "-c", "exec /bin/sleep 30"], ["/bin/sh", "-c", "exit 0"]]
            "#,
        );
        let cancellation_token = token();
        let trigger = {
            let cancellation_token = cancellation_token.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(300));
                cancellation_token.store(true, Ordering::SeqCst);
            })
        };
        let started = Instant::now();
        let summary = orchestrator(&declaration, Arc::default(), cancellation_token)
            .run(&RunOptions::default())
            .unwrap();
        trigger.join().unwrap();

        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        let result = &summary.results[0];
        assert_eq!(result.status, RunStatus::Error);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
        assert_eq!(result.commands[0].status, CommandStatus::Errored);
        assert_eq!(result.commands[1].status, CommandStatus::Skipped);
        assert!(summary.interrupted);
        assert_eq!(report::exit_code(&summary), crate::constants::EXIT_INTERRUPTED);
    }

    #[test]
    fn test_interrupted_run_skips_pending_environments() {
        let dir = tempfile::tempdir().unwrap();
        let declaration = declaration(
            dir.path(),
            r#"
            [env.a]
            base_python = "sh"
            commands = [["/bin/sh", "-c", "exit 0"]]
            "#,
        );
        let cancelled = Arc::new(AtomicBool::new(true));
        let summary = orchestrator(&declaration, Arc::default(), cancelled)
            .run(&RunOptions::default())
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert!(summary.interrupted);
        assert_eq!(report::exit_code(&summary), crate::constants::EXIT_INTERRUPTED);
    }

    #[test]
    fn test_notest_only_builds() {
        let dir = tempfile::tempdir().unwrap();
        let declaration = declaration(
            dir.path(),
            r#"
            [env.a]
            base_python = "sh"
            commands = [["/bin/sh", "-c", "exit 1"]]
            "#,
        );
        let installer = Arc::new(CountingInstaller::default());
        let summary = orchestrator(&declaration, installer.clone(), token())
            .run(&RunOptions {
                notest: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(summary.succeeded, 1);
        assert!(summary.results[0].commands.is_empty());
        assert_eq!(installer.creates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parallelism_parse() {
        assert_eq!(Parallelism::parse("3").unwrap(), Parallelism::Fixed(3));
        assert_eq!(Parallelism::parse("AUTO").unwrap(), Parallelism::Auto);
        assert!(Parallelism::parse("0").is_err());
        assert!(Parallelism::parse("many").is_err());
        assert!(Parallelism::Auto.workers() >= 1);
    }
}
