//! # Configuration Layers
//!
//! Every environment is assembled from up to three `EnvLayer`s:
//! the declaration-wide `[defaults]`, the template block that produced the
//! name, and an exact-name block. Layers are combined with [`EnvLayer::merge`],
//! a pure function with fixed per-field precedence:
//!
//! | field kind                                   | rule                          |
//! |----------------------------------------------|-------------------------------|
//! | scalars (`isolated`, `description`, ...)     | override wins if present      |
//! | sets (`extras`, `passenv`, `labels`)         | union                         |
//! | `deps`                                       | base, then new override items |
//! | `setenv`                                     | merged, override wins per key |
//! | `commands`                                   | replaced if override has any  |

use crate::{
    constants::DEFAULT_BASE_PYTHON,
    core::config_loader::DeclarationError,
    models::{CommandDecl, EnvironmentSpec},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path};

/// A partial environment configuration, as written in one declaration block.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EnvLayer {
    /// Shown by `toxide list`.
    pub description: Option<String>,
    /// Optional feature groups of the project to install.
    pub extras: BTreeSet<String>,
    /// Extra requirements installed after the project.
    pub deps: Vec<String>,
    /// Host variables copied into the environment.
    pub passenv: BTreeSet<String>,
    /// Variables set explicitly; placeholders are substituted.
    pub setenv: BTreeMap<String, String>,
    /// Commands, as token lists or shell-split lines.
    pub commands: Option<Vec<CommandDecl>>,
    /// Rebuild the context on every invocation.
    pub isolated: Option<bool>,
    /// Do not install the project itself.
    pub skip_install: Option<bool>,
    /// Keep running commands after a failure.
    pub ignore_errors: Option<bool>,
    /// Interpreter the context is created with.
    pub base_python: Option<String>,
    /// Selection labels.
    pub labels: BTreeSet<String>,
    /// Shared context key; defaults to the environment name.
    pub context: Option<String>,
}

impl EnvLayer {
    /// Layers `over` on top of `self`, returning the merged layer.
    pub fn merge(&self, over: &EnvLayer) -> EnvLayer {
        let mut deps = self.deps.clone();
        for dep in &over.deps {
            if !deps.contains(dep) {
                deps.push(dep.clone());
            }
        }

        let mut setenv = self.setenv.clone();
        setenv.extend(over.setenv.iter().map(|(k, v)| (k.clone(), v.clone())));

        let commands = match &over.commands {
            Some(commands) if !commands.is_empty() => Some(commands.clone()),
            _ => self.commands.clone(),
        };

        EnvLayer {
            description: over.description.clone().or_else(|| self.description.clone()),
            extras: self.extras.union(&over.extras).cloned().collect(),
            deps,
            passenv: self.passenv.union(&over.passenv).cloned().collect(),
            setenv,
            commands,
            isolated: over.isolated.or(self.isolated),
            skip_install: over.skip_install.or(self.skip_install),
            ignore_errors: over.ignore_errors.or(self.ignore_errors),
            base_python: over.base_python.clone().or_else(|| self.base_python.clone()),
            labels: self.labels.union(&over.labels).cloned().collect(),
            context: over.context.clone().or_else(|| self.context.clone()),
        }
    }

    /// Turns a fully merged layer into a concrete `EnvironmentSpec`.
    ///
    /// # Errors
    /// Returns `DeclarationError::Command` if a command line has unbalanced quoting.
    pub fn resolve(
        &self,
        name: &str,
        factors: Vec<String>,
    ) -> Result<EnvironmentSpec, DeclarationError> {
        let commands = self
            .commands
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|decl| {
                decl.to_tokens().ok_or_else(|| DeclarationError::Command {
                    env: name.to_string(),
                    command: format!("{:?}", decl),
                })
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|tokens| !tokens.is_empty())
            .collect();

        let skip_install = self.skip_install.unwrap_or(false);
        if skip_install && !self.extras.is_empty() {
            log::warn!(
                "Environment '{}' sets skip_install; its extras {:?} will not be installed.",
                name,
                self.extras
            );
        }

        let context = self.context.clone().unwrap_or_else(|| name.to_string());
        if !is_plain_dir_name(&context) {
            return Err(DeclarationError::InvalidContext {
                env: name.to_string(),
                context,
            });
        }

        let base_python = self
            .base_python
            .clone()
            .or_else(|| infer_base_python(name))
            .unwrap_or_else(|| DEFAULT_BASE_PYTHON.to_string());

        Ok(EnvironmentSpec {
            name: name.to_string(),
            factors,
            description: self.description.clone(),
            extras: self.extras.clone(),
            deps: self.deps.clone(),
            passenv: self.passenv.clone(),
            commands,
            isolated: self.isolated.unwrap_or(false),
            skip_install,
            ignore_errors: self.ignore_errors.unwrap_or(false),
            base_python,
            labels: self.labels.clone(),
            context,
            setenv: self.setenv.clone(),
        })
    }
}

/// A context key becomes a directory under the work dir, so it must be exactly
/// one normal path component.
fn is_plain_dir_name(key: &str) -> bool {
    let mut components = Path::new(key).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !key.contains(['/', '\\'])
}

/// Derives an interpreter from a `pyXY`/`pypyXY` component of an environment
/// name: `py311` → `python3.11`, `pypy310` → `pypy3.10`, `py3` → `python3`.
pub fn infer_base_python(name: &str) -> Option<String> {
    name.split('-').find_map(|component| {
        let (prefix, version) = if let Some(v) = component.strip_prefix("pypy") {
            ("pypy", v)
        } else if let Some(v) = component.strip_prefix("py") {
            ("python", v)
        } else {
            return None;
        };
        if version.is_empty() || !version.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let (major, minor) = version.split_at(1);
        if minor.is_empty() {
            Some(format!("{}{}", prefix, major))
        } else {
            Some(format!("{}{}.{}", prefix, major, minor))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer_from(toml_src: &str) -> EnvLayer {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn test_merge_precedence_per_field() {
        let base = layer_from(
            r#"
            description = "template"
            extras = ["test"]
            passenv = ["CI"]
            setenv = { MODE = "slow", KEEP = "1" }
            commands = [["pytest"]]
            isolated = false
            deps = ["coverage"]
            "#,
        );
        let over = layer_from(
            r#"
            extras = ["cov"]
            passenv = ["HOME"]
            setenv = { MODE = "fast" }
            isolated = true
            deps = ["coverage", "pytest-xdist"]
            "#,
        );

        let merged = base.merge(&over);
        assert_eq!(merged.description.as_deref(), Some("template"));
        assert_eq!(merged.isolated, Some(true));
        assert_eq!(
            merged.extras.iter().cloned().collect::<Vec<_>>(),
            vec!["cov", "test"]
        );
        assert!(merged.passenv.contains("CI") && merged.passenv.contains("HOME"));
        assert_eq!(merged.setenv.get("MODE").map(String::as_str), Some("fast"));
        assert_eq!(merged.setenv.get("KEEP").map(String::as_str), Some("1"));
        assert_eq!(merged.deps, vec!["coverage", "pytest-xdist"]);
        // The override defines no commands, so the template's survive.
        assert_eq!(
            merged.commands,
            Some(vec![CommandDecl::Tokens(vec!["pytest".to_string()])])
        );
    }

    #[test]
    fn test_override_commands_replace() {
        let base = layer_from(r#"commands = [["pytest"], ["coverage", "report"]]"#);
        let over = layer_from(r#"commands = ["mypy src"]"#);
        let merged = base.merge(&over);
        assert_eq!(
            merged.commands,
            Some(vec![CommandDecl::Line("mypy src".to_string())])
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let base = layer_from(
            r#"
            extras = ["test"]
            setenv = { A = "1" }
            deps = ["x"]
            commands = [["a"]]
            "#,
        );
        let over = layer_from(
            r#"
            extras = ["lint"]
            setenv = { A = "2", B = "3" }
            deps = ["y", "x"]
            skip_install = true
            commands = [["b"]]
            "#,
        );
        let once = base.merge(&over);
        let twice = once.merge(&over);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_resolve_defaults() {
        let spec = layer_from(r#"commands = ["pytest -x '{posargs}'"]"#)
            .resolve("unit", Vec::new())
            .unwrap();
        assert_eq!(spec.context, "unit");
        assert!(!spec.isolated);
        assert!(!spec.skip_install);
        assert_eq!(spec.base_python, DEFAULT_BASE_PYTHON);
        assert_eq!(spec.commands, vec![vec!["pytest", "-x", "{posargs}"]]);
    }

    #[test]
    fn test_resolve_rejects_unbalanced_quotes() {
        let result = layer_from(r#"commands = ["echo 'oops"]"#).resolve("bad", Vec::new());
        assert!(matches!(result, Err(DeclarationError::Command { .. })));
    }

    #[test]
    fn test_infer_base_python() {
        assert_eq!(infer_base_python("test-py311").as_deref(), Some("python3.11"));
        assert_eq!(infer_base_python("py27-lint").as_deref(), Some("python2.7"));
        assert_eq!(infer_base_python("pypy310").as_deref(), Some("pypy3.10"));
        assert_eq!(infer_base_python("py3").as_deref(), Some("python3"));
        assert_eq!(infer_base_python("lint"), None);
        assert_eq!(infer_base_python("pyright"), None);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let parsed: Result<EnvLayer, _> = toml::from_str(r#"comands = [["x"]]"#);
        assert!(parsed.is_err());
    }
}
