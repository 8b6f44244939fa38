// src/core/injector.rs

//! # Environment Injector
//!
//! Builds the exact variable map and the placeholder-substituted commands
//! each environment runs with. Placeholders are `{posargs}` (optionally
//! `{posargs:default}`), `{envname}`, `{envdir}`, `{envbindir}`, `{root}` and
//! `{env:NAME}` / `{env:NAME:default}`; anything else in braces is left as is.

use crate::{core::materializer::ExecutionContext, models::EnvironmentSpec};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::Path;

lazy_static! {
    // A `{...}` placeholder; nested braces never form one.
    static ref PLACEHOLDER_RE: Regex =
        Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern is valid");
    // A token that is nothing but `{posargs}` or `{posargs:default}`.
    static ref POSARGS_TOKEN_RE: Regex =
        Regex::new(r"^\{posargs(?::([^{}]*))?\}$").expect("posargs pattern is valid");
}

/// The variables and fully substituted commands for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedEnv {
    /// The process environment, before the context's own `VIRTUAL_ENV` and `PATH`.
    pub vars: BTreeMap<String, String>,
    /// Commands with every placeholder substituted.
    pub commands: Vec<Vec<String>>,
}

/// Values the placeholders of an environment resolve against.
#[derive(Debug, Clone, Copy)]
pub struct InjectionScope<'a> {
    /// Directory of the declaration file (`{root}`).
    pub project_root: &'a Path,
    /// The ready context (`{envdir}`, `{envbindir}`).
    pub context: &'a ExecutionContext,
}

/// Computes the process environment and commands of `spec`.
///
/// The map starts empty: only variables named in `passenv` are copied from
/// `host_env`, then `setenv` is applied on top. Nothing else from the host
/// leaks in. The function is pure; identical inputs yield identical outputs.
pub fn compute_env(
    spec: &EnvironmentSpec,
    host_env: &BTreeMap<String, String>,
    posargs: &[String],
    scope: InjectionScope<'_>,
) -> InjectedEnv {
    let substitutions = Substitutions {
        spec,
        host_env,
        posargs,
        scope,
    };

    let mut vars: BTreeMap<String, String> = spec
        .passenv
        .iter()
        .filter_map(|name| host_env.get(name).map(|value| (name.clone(), value.clone())))
        .collect();
    for (name, value) in &spec.setenv {
        vars.insert(name.clone(), substitutions.expand(value));
    }

    let commands = spec
        .commands
        .iter()
        .map(|command| substitutions.expand_command(command))
        .filter(|argv| !argv.is_empty())
        .collect();

    log::trace!("Injected {} variable(s) into '{}'", vars.len(), spec.name);
    InjectedEnv { vars, commands }
}

struct Substitutions<'a> {
    spec: &'a EnvironmentSpec,
    host_env: &'a BTreeMap<String, String>,
    posargs: &'a [String],
    scope: InjectionScope<'a>,
}

impl Substitutions<'_> {
    fn expand_command(&self, command: &[String]) -> Vec<String> {
        let mut argv = Vec::with_capacity(command.len() + self.posargs.len());
        for token in command {
            match posargs_default(token) {
                Some(default) => argv.extend(self.splice_posargs(default)),
                None => argv.push(self.expand(token)),
            }
        }
        argv
    }

    /// `{posargs}` standing alone as a token becomes zero or more arguments.
    fn splice_posargs(&self, default: Option<&str>) -> Vec<String> {
        if !self.posargs.is_empty() {
            return self.posargs.to_vec();
        }
        match default {
            Some(default) => shlex::split(default)
                .unwrap_or_else(|| default.split_whitespace().map(String::from).collect()),
            None => Vec::new(),
        }
    }

    /// Replaces every known `{...}` placeholder inside `text`. Unknown ones
    /// are kept as written.
    fn expand(&self, text: &str) -> String {
        PLACEHOLDER_RE
            .replace_all(text, |caps: &Captures<'_>| {
                let inner = caps.get(1).map_or("", |m| m.as_str());
                self.resolve(inner)
                    .unwrap_or_else(|| caps.get(0).map_or("", |m| m.as_str()).to_string())
            })
            .into_owned()
    }

    fn resolve(&self, inner: &str) -> Option<String> {
        let context = self.scope.context;
        match inner {
            "posargs" => Some(self.posargs.join(" ")),
            "envname" => Some(self.spec.name.clone()),
            "envdir" => Some(context.root.to_string_lossy().into_owned()),
            "envbindir" => Some(context.bin_dir.to_string_lossy().into_owned()),
            "root" => Some(self.scope.project_root.to_string_lossy().into_owned()),
            _ => {
                if let Some(default) = inner.strip_prefix("posargs:") {
                    return Some(if self.posargs.is_empty() {
                        default.to_string()
                    } else {
                        self.posargs.join(" ")
                    });
                }
                let reference = inner.strip_prefix("env:")?;
                let (name, default) = match reference.split_once(':') {
                    Some((name, default)) => (name, default),
                    None => (reference, ""),
                };
                Some(
                    self.host_env
                        .get(name)
                        .cloned()
                        .unwrap_or_else(|| default.to_string()),
                )
            }
        }
    }
}

/// If `token` is exactly a posargs placeholder, returns its optional default.
fn posargs_default(token: &str) -> Option<Option<&str>> {
    POSARGS_TOKEN_RE
        .captures(token)
        .map(|caps| caps.get(1).map(|m| m.as_str()))
}
