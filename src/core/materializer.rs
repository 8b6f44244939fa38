//! # Context Materializer
//!
//! Builds and reuses the isolated directory each environment runs in.
//!
//! A context is identified by its key (the environment's `context`, which
//! defaults to its name). After a successful build a bincode stamp holding the
//! context's fingerprint is written inside it; the next invocation compares
//! fingerprints and only rebuilds when something that went into the build has
//! changed. Builds of the same key are single-flight: concurrent callers wait
//! for the first one and then reuse its result.
//!
//! Each key has a read/write lock. Building or destroying a context takes it
//! exclusively; running commands in a context through
//! [`Materializer::with_context`] holds it shared, so a sibling environment
//! with a different fingerprint cannot wipe a context that is in use.

use crate::{
    CancellationToken,
    core::{cache, paths},
    dev_utils::BlockTimer,
    models::{ContextStamp, EnvironmentSpec},
    system::installer::{ContextLocation, Installer, InstallerError},
};
use std::{
    collections::HashMap,
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError, RwLock},
};
use thiserror::Error;

/// Why a context could not be made ready.
#[derive(Error, Debug)]
pub enum ContextError {
    /// The installer failed; `output` is everything it printed.
    #[error("Failed to build context '{key}': {source}")]
    Build {
        /// The context key.
        key: String,
        /// Installer output up to the failure.
        output: String,
        /// The failing installer step.
        #[source]
        source: InstallerError,
    },
    /// `base_python` is not on `PATH`.
    #[error("Interpreter '{base_python}' could not be found: {source}")]
    Interpreter {
        /// The interpreter as declared.
        base_python: String,
        /// The lookup error.
        #[source]
        source: which::Error,
    },
    /// A filesystem operation inside the work dir failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// The path operated on.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// An input of the fingerprint could not be read.
    #[error("Failed to fingerprint context '{key}': {source}")]
    Fingerprint {
        /// The context key.
        key: String,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },
    /// The stamp could not be serialized.
    #[error("Failed to encode context stamp: {0}")]
    StampEncode(#[from] bincode::error::EncodeError),
    /// The run was interrupted during a build.
    #[error("Context build was cancelled.")]
    Cancelled,
}

impl ContextError {
    /// Captured installer output, if the error carries any.
    pub fn output(&self) -> &str {
        match self {
            ContextError::Build { output, .. } => output,
            _ => "",
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ContextError + '_ {
    move |source| ContextError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A ready context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// The context key.
    pub key: String,
    /// The context directory (`{envdir}`, `VIRTUAL_ENV`).
    pub root: PathBuf,
    /// Where installed tools live (`{envbindir}`).
    pub bin_dir: PathBuf,
    /// The resolved `base_python`.
    pub interpreter: PathBuf,
    /// Fingerprint of the inputs the context was built from.
    pub fingerprint: String,
    /// True when this call (re)built the context.
    pub rebuilt: bool,
    /// Installer output of the build; empty when the context was reused.
    pub setup_output: String,
}

/// Invocation-wide options for the materializer.
#[derive(Debug, Clone, Default)]
pub struct MaterializerOptions {
    /// Rebuild every context once, regardless of its stamp.
    pub recreate: bool,
}

/// Builds, reuses and destroys the contexts under one work dir.
pub struct Materializer {
    project_root: PathBuf,
    work_dir: PathBuf,
    lock_files: Vec<PathBuf>,
    installer: Arc<dyn Installer>,
    options: MaterializerOptions,
    /// One lock per context key: exclusive to build, shared to use.
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
    /// Keys built during this invocation, with the fingerprint they were built for.
    built: Mutex<HashMap<String, String>>,
    /// Fingerprint of what is on disk for every key touched in this invocation.
    current: Mutex<HashMap<String, String>>,
}

impl fmt::Debug for Materializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Materializer")
            .field("work_dir", &self.work_dir)
            .field("installer", &self.installer.identity())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Materializer {
    /// `lock_files` are taken relative to `project_root`.
    pub fn new(
        project_root: &Path,
        work_dir: &Path,
        lock_files: &[String],
        installer: Arc<dyn Installer>,
        options: MaterializerOptions,
    ) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            work_dir: work_dir.to_path_buf(),
            lock_files: lock_files.iter().map(|f| project_root.join(f)).collect(),
            installer,
            options,
            locks: Mutex::new(HashMap::new()),
            built: Mutex::new(HashMap::new()),
            current: Mutex::new(HashMap::new()),
        }
    }

    /// The directory holding every context.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// The packages handed to the installer for `spec`: the project itself
    /// (with its extras) unless `skip_install`, followed by `deps`.
    pub fn packages_for(&self, spec: &EnvironmentSpec) -> Vec<String> {
        let mut packages = Vec::with_capacity(spec.deps.len() + 1);
        if !spec.skip_install {
            let root = self.project_root.to_string_lossy();
            if spec.extras.is_empty() {
                packages.push(root.into_owned());
            } else {
                let extras: Vec<&str> = spec.extras.iter().map(String::as_str).collect();
                packages.push(format!("{}[{}]", root, extras.join(",")));
            }
        }
        packages.extend(spec.deps.iter().cloned());
        packages
    }

    /// Returns a ready context for `spec`, building it if needed.
    ///
    /// # Errors
    /// `Interpreter` when `base_python` cannot be located, `Build` when the
    /// installer fails (the partial directory is removed), `Cancelled` when
    /// the run is interrupted during a build.
    pub fn materialize(
        &self,
        spec: &EnvironmentSpec,
        cancellation_token: &CancellationToken,
    ) -> Result<ExecutionContext, ContextError> {
        let _timer = BlockTimer::new(format!("materialize {}", spec.context));
        let key = spec.context.as_str();
        let root = paths::context_dir(&self.work_dir, key);
        let bin_dir = paths::bin_dir(&root);

        let interpreter =
            which::which(&spec.base_python).map_err(|source| ContextError::Interpreter {
                base_python: spec.base_python.clone(),
                source,
            })?;
        let packages = self.packages_for(spec);
        let fingerprint = self
            .fingerprint(spec, &interpreter, &packages)
            .map_err(|source| ContextError::Fingerprint {
                key: key.to_string(),
                source,
            })?;

        let key_lock = self.lock_for(key);
        let _exclusive = key_lock.write().unwrap_or_else(PoisonError::into_inner);

        let context = |rebuilt: bool, setup_output: String| ExecutionContext {
            key: key.to_string(),
            root: root.clone(),
            bin_dir: bin_dir.clone(),
            interpreter: interpreter.clone(),
            fingerprint: fingerprint.clone(),
            rebuilt,
            setup_output,
        };

        let built_now = self
            .built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        if built_now.as_deref() == Some(fingerprint.as_str()) {
            log::debug!("Context '{}' already built during this run.", key);
            return Ok(context(false, String::new()));
        }

        let must_rebuild = built_now.is_some() || spec.isolated || self.options.recreate;
        if !must_rebuild && read_stamp(&root).is_some_and(|s| s.fingerprint == fingerprint) {
            log::debug!("Context '{}' is up to date ({}).", key, fingerprint);
            self.set_current(key, &fingerprint);
            return Ok(context(false, String::new()));
        }

        log::info!("Building context '{}' ({}).", key, fingerprint);
        let stamp = ContextStamp {
            fingerprint: fingerprint.clone(),
            base_python: spec.base_python.clone(),
            interpreter: interpreter.to_string_lossy().into_owned(),
            packages: packages.clone(),
        };
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        let output = self.build(key, &root, &bin_dir, &interpreter, &stamp, cancellation_token)?;

        self.set_current(key, &fingerprint);
        self.built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), fingerprint.clone());
        Ok(context(true, output))
    }

    /// Materializes `spec`, then calls `body` while holding the context shared.
    ///
    /// Until `body` returns, no other caller can rebuild or destroy the
    /// context. If a sibling rebuilt it for a different fingerprint between
    /// the build and the shared lock, it is materialized again.
    pub fn with_context<T>(
        &self,
        spec: &EnvironmentSpec,
        cancellation_token: &CancellationToken,
        body: impl FnOnce(&ExecutionContext) -> T,
    ) -> Result<T, ContextError> {
        let key_lock = self.lock_for(&spec.context);
        let mut setup_output = String::new();
        let mut rebuilt = false;
        loop {
            let mut context = self.materialize(spec, cancellation_token)?;
            setup_output.push_str(&context.setup_output);
            rebuilt |= context.rebuilt;

            let _shared = key_lock.read().unwrap_or_else(PoisonError::into_inner);
            if self.is_current(&context) {
                context.setup_output = setup_output;
                context.rebuilt = rebuilt;
                return Ok(body(&context));
            }
            log::debug!(
                "Context '{}' changed before '{}' could use it; materializing again.",
                context.key,
                spec.name
            );
        }
    }

    /// Removes the context stored under `key`. Returns whether it existed.
    pub fn destroy(&self, key: &str) -> Result<bool, ContextError> {
        let key_lock = self.lock_for(key);
        let _exclusive = key_lock.write().unwrap_or_else(PoisonError::into_inner);

        let root = paths::context_dir(&self.work_dir, key);
        self.built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if !root.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&root).map_err(io_error(&root))?;
        log::info!("Removed context '{}' at '{}'.", key, root.display());
        Ok(true)
    }

    fn set_current(&self, key: &str, fingerprint: &str) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), fingerprint.to_string());
    }

    fn is_current(&self, context: &ExecutionContext) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&context.key)
            == Some(&context.fingerprint)
    }

    fn lock_for(&self, key: &str) -> Arc<RwLock<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    fn fingerprint(
        &self,
        spec: &EnvironmentSpec,
        interpreter: &Path,
        packages: &[String],
    ) -> anyhow::Result<String> {
        let mut parts: Vec<(String, String)> = vec![
            ("base_python".into(), spec.base_python.clone()),
            ("interpreter".into(), interpreter.to_string_lossy().into_owned()),
            (
                "interpreter_hash".into(),
                cache::content_hash_or_missing(interpreter)?,
            ),
            ("root".into(), self.project_root.to_string_lossy().into_owned()),
            ("skip_install".into(), spec.skip_install.to_string()),
            ("installer".into(), self.installer.identity()),
        ];
        parts.extend(packages.iter().map(|p| ("package".to_string(), p.clone())));
        for lock_file in &self.lock_files {
            parts.push((
                lock_file.to_string_lossy().into_owned(),
                cache::content_hash_or_missing(lock_file)?,
            ));
        }
        let fingerprint = cache::fingerprint(parts.iter().map(|(l, v)| (l.as_str(), v.as_str())));
        log::debug!("Fingerprint of context '{}': {}", spec.context, fingerprint);
        Ok(fingerprint)
    }

    /// Wipes `root`, creates and installs into it, then writes the stamp.
    /// On any failure the directory is removed again.
    fn build(
        &self,
        key: &str,
        root: &Path,
        bin_dir: &Path,
        interpreter: &Path,
        stamp: &ContextStamp,
        cancellation_token: &CancellationToken,
    ) -> Result<String, ContextError> {
        if root.exists() {
            fs::remove_dir_all(root).map_err(io_error(root))?;
        }
        fs::create_dir_all(&self.work_dir).map_err(io_error(&self.work_dir))?;

        let cleanup = scopeguard::guard(root.to_path_buf(), |path| {
            if path.exists() && fs::remove_dir_all(&path).is_err() {
                log::warn!("Could not remove partial context '{}'.", path.display());
            }
        });

        let location = ContextLocation {
            envdir: root,
            bin_dir,
        };
        let into_context_error = |source: InstallerError| {
            if source.is_cancelled() {
                ContextError::Cancelled
            } else {
                ContextError::Build {
                    key: key.to_string(),
                    output: source.output().to_string(),
                    source,
                }
            }
        };

        let mut output = self
            .installer
            .create(location, interpreter, cancellation_token)
            .map_err(into_context_error)?;
        if !stamp.packages.is_empty() {
            let installed = self
                .installer
                .install(location, &stamp.packages, cancellation_token)
                .map_err(|e| {
                    let mut error = into_context_error(e);
                    if let ContextError::Build { output: partial, .. } = &mut error {
                        partial.insert_str(0, &output);
                    }
                    error
                })?;
            output.push_str(&installed);
        }

        write_stamp(root, stamp)?;
        scopeguard::ScopeGuard::into_inner(cleanup);
        Ok(output)
    }
}

/// Reads the stamp of a context. A missing or unreadable stamp means "stale".
fn read_stamp(root: &Path) -> Option<ContextStamp> {
    let bytes = fs::read(paths::stamp_path(root)).ok()?;
    match bincode::serde::decode_from_slice(&bytes, bincode::config::standard()) {
        Ok((stamp, _)) => Some(stamp),
        Err(e) => {
            log::debug!("Ignoring unreadable stamp in '{}': {}", root.display(), e);
            None
        }
    }
}

fn write_stamp(root: &Path, stamp: &ContextStamp) -> Result<(), ContextError> {
    fs::create_dir_all(root).map_err(io_error(root))?;
    let bytes = bincode::serde::encode_to_vec(stamp, bincode::config::standard())?;
    let path = paths::stamp_path(root);
    fs::write(&path, bytes).map_err(io_error(&path))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::config_loader::parse_declaration;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    /// An installer that only creates directories and counts its calls.
    #[derive(Default)]
    pub(crate) struct CountingInstaller {
        pub creates: AtomicUsize,
        pub installs: AtomicUsize,
        pub fail_install: bool,
        /// Executable scripts written into the bin directory on create.
        pub scripts: Vec<(String, String)>,
    }

    impl Installer for CountingInstaller {
        fn create(
            &self,
            location: ContextLocation<'_>,
            _interpreter: &Path,
            _cancellation_token: &CancellationToken,
        ) -> Result<String, InstallerError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            // Widen the race window for single-flight tests.
            thread::sleep(Duration::from_millis(30));
            fs::create_dir_all(location.bin_dir).unwrap();
            for (name, body) in &self.scripts {
                let path = location.bin_dir.join(name);
                fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
                }
            }
            Ok("created\n".to_string())
        }

        fn install(
            &self,
            _location: ContextLocation<'_>,
            packages: &[String],
            _cancellation_token: &CancellationToken,
        ) -> Result<String, InstallerError> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            if self.fail_install {
                return Err(InstallerError::Failed {
                    step: "install",
                    exit_code: Some(1),
                    output: format!("no matching distribution for {}\n", packages.join(" ")),
                });
            }
            Ok(format!("installed {}\n", packages.join(" ")))
        }

        fn identity(&self) -> String {
            "counting".to_string()
        }
    }

    fn token() -> CancellationToken {
        Arc::new(AtomicBool::new(false))
    }

    fn spec(declaration: &str, name: &str) -> EnvironmentSpec {
        parse_declaration(declaration, PathBuf::from("/project"))
            .unwrap()
            .registry
            .lookup(name)
            .unwrap()
            .clone()
    }

    fn materializer(
        dir: &Path,
        installer: Arc<CountingInstaller>,
        lock_files: &[String],
        recreate: bool,
    ) -> Materializer {
        Materializer::new(
            dir,
            &dir.join(".toxide"),
            lock_files,
            installer,
            MaterializerOptions { recreate },
        )
    }

    const LINT: &str = r#"
        [env.lint]
        base_python = "sh"
        extras = ["lint"]
        deps = ["ruff"]
        commands = [["check"]]
    "#;

    #[test]
    fn test_packages_include_project_extras_and_deps() {
        let dir = tempfile::tempdir().unwrap();
        let m = materializer(dir.path(), Arc::default(), &[], false);
        let packages = m.packages_for(&spec(LINT, "lint"));
        assert_eq!(packages.len(), 2);
        assert!(packages[0].ends_with("[lint]"));
        assert_eq!(packages[1], "ruff");

        let skip = spec(
            r#"
            [env.audit]
            skip_install = true
            deps = ["pip-audit"]
            "#,
            "audit",
        );
        assert_eq!(m.packages_for(&skip), vec!["pip-audit"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unchanged_context_is_reused_across_invocations() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Arc::new(CountingInstaller::default());
        let lint = spec(LINT, "lint");

        let first = materializer(dir.path(), installer.clone(), &[], false)
            .materialize(&lint, &token())
            .unwrap();
        assert!(first.rebuilt);
        assert!(paths::stamp_path(&first.root).is_file());

        let second = materializer(dir.path(), installer.clone(), &[], false)
            .materialize(&lint, &token())
            .unwrap();
        assert!(!second.rebuilt);
        assert_eq!(installer.creates.load(Ordering::SeqCst), 1);
        assert_eq!(installer.installs.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_changed_extras_or_lock_file_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Arc::new(CountingInstaller::default());
        let lock = vec!["requirements.lock".to_string()];

        materializer(dir.path(), installer.clone(), &lock, false)
            .materialize(&spec(LINT, "lint"), &token())
            .unwrap();

        let mut more_extras = spec(LINT, "lint");
        more_extras.extras.insert("typing".into());
        let rebuilt = materializer(dir.path(), installer.clone(), &lock, false)
            .materialize(&more_extras, &token())
            .unwrap();
        assert!(rebuilt.rebuilt);

        fs::write(dir.path().join("requirements.lock"), "ruff==0.6\n").unwrap();
        let after_lock = materializer(dir.path(), installer.clone(), &lock, false)
            .materialize(&more_extras, &token())
            .unwrap();
        assert!(after_lock.rebuilt);
        assert_eq!(installer.creates.load(Ordering::SeqCst), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_recreate_and_isolated_rebuild_once_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Arc::new(CountingInstaller::default());
        let lint = spec(LINT, "lint");
        materializer(dir.path(), installer.clone(), &[], false)
            .materialize(&lint, &token())
            .unwrap();

        let recreating = materializer(dir.path(), installer.clone(), &[], true);
        assert!(recreating.materialize(&lint, &token()).unwrap().rebuilt);
        assert!(!recreating.materialize(&lint, &token()).unwrap().rebuilt);

        let mut isolated = lint.clone();
        isolated.isolated = true;
        let fresh = materializer(dir.path(), installer.clone(), &[], false);
        assert!(fresh.materialize(&isolated, &token()).unwrap().rebuilt);
        assert_eq!(installer.creates.load(Ordering::SeqCst), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_concurrent_callers_share_one_build() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Arc::new(CountingInstaller::default());
        let m = Arc::new(materializer(dir.path(), installer.clone(), &[], false));
        let lint = spec(LINT, "lint");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = m.clone();
                let lint = lint.clone();
                thread::spawn(move || m.materialize(&lint, &token()).unwrap())
            })
            .collect();
        let contexts: Vec<ExecutionContext> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(installer.creates.load(Ordering::SeqCst), 1);
        assert_eq!(contexts.iter().filter(|c| c.rebuilt).count(), 1);
        assert!(contexts.iter().all(|c| c.root == contexts[0].root));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_install_removes_partial_context() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Arc::new(CountingInstaller {
            fail_install: true,
            ..Default::default()
        });
        let m = materializer(dir.path(), installer, &[], false);
        let err = m.materialize(&spec(LINT, "lint"), &token()).unwrap_err();

        assert!(matches!(err, ContextError::Build { .. }));
        assert!(err.output().contains("created"));
        assert!(err.output().contains("no matching distribution"));
        assert!(!paths::context_dir(m.work_dir(), "lint").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_context_in_use_is_not_rebuilt_under_its_user() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Arc::new(CountingInstaller::default());
        let m = Arc::new(materializer(dir.path(), installer.clone(), &[], false));
        let declaration = r#"
            [env."{a,b}"]
            base_python = "sh"
            skip_install = true
            context = "shared"

            [env.a]
            deps = ["one"]

            [env.b]
            deps = ["two"]
        "#;

        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|name| {
                let m = m.clone();
                let env = spec(declaration, name);
                thread::spawn(move || {
                    m.with_context(&env, &token(), |ctx| {
                        let marker = ctx.root.join(format!("marker-{}", env.name));
                        fs::write(&marker, "").unwrap();
                        thread::sleep(Duration::from_millis(100));
                        marker.exists()
                    })
                    .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap(), "context was wiped while in use");
        }
        // Whichever environment builds second rebuilds for its own deps.
        assert!(installer.creates.load(Ordering::SeqCst) >= 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_with_context_reports_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let m = materializer(dir.path(), Arc::default(), &[], false);
        let lint = spec(LINT, "lint");

        let (rebuilt, output) = m
            .with_context(&lint, &token(), |ctx| (ctx.rebuilt, ctx.setup_output.clone()))
            .unwrap();
        assert!(rebuilt);
        assert!(output.contains("installed"));

        let reused = m.with_context(&lint, &token(), |ctx| ctx.rebuilt).unwrap();
        assert!(!reused);
    }

    #[test]
    fn test_missing_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let m = materializer(dir.path(), Arc::default(), &[], false);
        let mut lint = spec(LINT, "lint");
        lint.base_python = "python-that-does-not-exist-9.99".into();
        let err = m.materialize(&lint, &token()).unwrap_err();
        assert!(matches!(err, ContextError::Interpreter { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_destroy_removes_context() {
        let dir = tempfile::tempdir().unwrap();
        let m = materializer(dir.path(), Arc::default(), &[], false);
        let ctx = m.materialize(&spec(LINT, "lint"), &token()).unwrap();
        assert!(ctx.root.exists());
        assert!(m.destroy("lint").unwrap());
        assert!(!ctx.root.exists());
        assert!(!m.destroy("lint").unwrap());
    }
}
