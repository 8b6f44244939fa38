// src/core/registry.rs

//! The registry of concrete environments and the selectors that query it.

use crate::{
    constants::SELECT_ALL,
    core::{config_loader::DeclarationError, factors},
    models::EnvironmentSpec,
};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors raised while querying the registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A selection names an environment that is not registered.
    #[error("Unknown environment '{name}'. Known environments: {known}")]
    UnknownEnvironment {
        /// The unknown name.
        name: String,
        /// Every registered name, comma separated.
        known: String,
    },
}

/// One way of choosing environments for an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Every registered environment.
    All,
    /// Exactly this name; unknown names are an error.
    Name(String),
    /// Environments with this factor value (a bound factor tag, or a
    /// dash-separated component of the name).
    Factor(String),
    /// Environments carrying this label.
    Label(String),
}

impl Selector {
    /// Parses an `-e` argument: comma-separated names, each possibly a factor
    /// template (`test-py{310,311}`), or the `ALL` keyword.
    pub fn from_env_arg(raw: &str) -> Result<Vec<Selector>, DeclarationError> {
        let mut selectors = Vec::new();
        for part in split_env_list(raw) {
            if part == SELECT_ALL {
                selectors.push(Selector::All);
            } else {
                selectors.extend(
                    factors::expand(part)?
                        .into_iter()
                        .map(|expanded| Selector::Name(expanded.name)),
                );
            }
        }
        Ok(selectors)
    }

    fn matches(&self, spec: &EnvironmentSpec) -> bool {
        match self {
            Selector::All => true,
            Selector::Name(name) => &spec.name == name,
            Selector::Factor(value) => {
                spec.factors.iter().any(|factor| factor == value)
                    || spec.name.split('-').any(|part| part == value)
            }
            Selector::Label(label) => spec.labels.contains(label),
        }
    }
}

/// Splits on commas that are not inside a factor group.
fn split_env_list(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (offset, ch) in raw.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.extend(raw.get(start..offset));
                start = offset + 1;
            }
            _ => {}
        }
    }
    parts.extend(raw.get(start..));
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

/// The environments chosen for one invocation, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixSelection {
    names: Vec<String>,
}

impl MatrixSelection {
    /// The selected names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of selected environments.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Holds every concrete environment, in declaration order.
#[derive(Debug, Default)]
pub struct Registry {
    envs: Vec<EnvironmentSpec>,
    positions: HashMap<String, usize>,
}

impl Registry {
    /// Adds an environment. Names must be unique.
    pub fn register(&mut self, spec: EnvironmentSpec) -> Result<(), DeclarationError> {
        if self.positions.contains_key(&spec.name) {
            return Err(DeclarationError::DuplicateEnvironment {
                name: spec.name.clone(),
                first: spec.name.clone(),
                second: spec.name,
            });
        }
        log::trace!("Registering environment '{}'", spec.name);
        self.positions.insert(spec.name.clone(), self.envs.len());
        self.envs.push(spec);
        Ok(())
    }

    /// Returns the environment called `name`.
    pub fn lookup(&self, name: &str) -> Result<&EnvironmentSpec, RegistryError> {
        self.positions
            .get(name)
            .and_then(|&at| self.envs.get(at))
            .ok_or_else(|| RegistryError::UnknownEnvironment {
                name: name.to_string(),
                known: self.known_names(),
            })
    }

    /// Resolves selectors into a deduplicated selection ordered by registration.
    ///
    /// # Errors
    /// Fails on the first `Selector::Name` that is not registered. Factor and
    /// label selectors that match nothing simply contribute no names.
    pub fn select(&self, selectors: &[Selector]) -> Result<MatrixSelection, RegistryError> {
        for selector in selectors {
            if let Selector::Name(name) = selector {
                self.lookup(name)?;
            }
        }

        let chosen: HashSet<&str> = self
            .envs
            .iter()
            .filter(|spec| selectors.iter().any(|selector| selector.matches(spec)))
            .map(|spec| spec.name.as_str())
            .collect();

        let names = self
            .envs
            .iter()
            .filter(|spec| chosen.contains(spec.name.as_str()))
            .map(|spec| spec.name.clone())
            .collect();
        Ok(MatrixSelection { names })
    }

    /// Every environment, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &EnvironmentSpec> {
        self.envs.iter()
    }

    /// Number of registered environments.
    pub fn len(&self) -> usize {
        self.envs.len()
    }

    /// True when the declaration defines no environment.
    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
    }

    fn known_names(&self) -> String {
        if self.envs.is_empty() {
            return "(none)".to_string();
        }
        self.envs
            .iter()
            .map(|spec| spec.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
