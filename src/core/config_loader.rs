//! # Config Loader
//!
//! Reads a `toxide.toml` declaration and turns it into a populated
//! [`Registry`]. Templates are expanded with the factor expander, then each
//! concrete name is assembled from `[defaults]`, its template block and an
//! optional exact-name block (in that order of increasing precedence).

use crate::{
    constants::DECLARATION_FILENAME,
    core::{factors, layers::EnvLayer, registry::Registry},
    models::{EnvironmentSpec, OrchestratorConfig},
};
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Errors in the declaration itself. All of them abort the invocation before
/// any environment starts.
#[derive(Error, Debug)]
pub enum DeclarationError {
    /// Malformed factor-bracket syntax.
    #[error("Invalid environment template '{template}' at offset {offset}: {reason}")]
    Syntax {
        /// The template as written.
        template: String,
        /// Byte offset of the problem.
        offset: usize,
        /// What is wrong.
        reason: String,
    },
    /// Two declaration blocks produce the same concrete environment name.
    #[error("Environment '{name}' is declared more than once (by '{first}' and '{second}').")]
    DuplicateEnvironment {
        /// The concrete name produced twice.
        name: String,
        /// The block that produced it first.
        first: String,
        /// The block that produced it again.
        second: String,
    },
    /// A context key that is not a single plain directory name.
    #[error("Environment '{env}' has invalid context '{context}': it must be a plain directory name.")]
    InvalidContext {
        /// The environment naming the context.
        env: String,
        /// The rejected key.
        context: String,
    },
    /// A command line could not be split into arguments.
    #[error("Environment '{env}' has a command with unbalanced quoting: {command}")]
    Command {
        /// The environment owning the command.
        env: String,
        /// The command as declared.
        command: String,
    },
    /// No declaration file was found.
    #[error("No '{filename}' found in '{start}' or any parent directory.")]
    NotFound {
        /// The file name searched for.
        filename: String,
        /// Where the search started.
        start: PathBuf,
    },
    /// The TOML content is invalid.
    #[error("Failed to parse declaration '{path}': {source}")]
    TomlParse {
        /// The declaration file.
        path: PathBuf,
        /// The underlying parser error.
        #[source]
        source: toml::de::Error,
    },
    /// A block inside `[env]` is not a valid environment table.
    #[error("Invalid block for environment '{name}': {source}")]
    Block {
        /// The block's key in `[env]`.
        name: String,
        /// The underlying parser error.
        #[source]
        source: toml::de::Error,
    },
    /// The declaration file could not be read.
    #[error("I/O error while reading declaration: {0}")]
    Io(#[from] std::io::Error),
}

/// The raw file layout. `env` stays a table so declaration order is preserved.
#[derive(Deserialize, Debug, Default)]
#[serde(default, deny_unknown_fields)]
struct DeclarationFile {
    orchestrator: OrchestratorConfig,
    defaults: EnvLayer,
    env: toml::Table,
}

/// A loaded declaration: orchestrator options plus every concrete environment.
#[derive(Debug)]
pub struct Declaration {
    /// Directory containing the declaration file; `{root}` in templates.
    pub root: PathBuf,
    /// The `[orchestrator]` table.
    pub orchestrator: OrchestratorConfig,
    /// Every concrete environment, in declaration order.
    pub registry: Registry,
}

/// Searches `start` and its ancestors for the declaration file.
pub fn find_declaration(start: &Path) -> Result<PathBuf, DeclarationError> {
    start
        .ancestors()
        .map(|dir| dir.join(DECLARATION_FILENAME))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| DeclarationError::NotFound {
            filename: DECLARATION_FILENAME.to_string(),
            start: start.to_path_buf(),
        })
}

/// Loads and expands the declaration at `path`.
pub fn load(path: &Path) -> Result<Declaration, DeclarationError> {
    log::debug!("Loading declaration from '{}'", path.display());
    let content = fs::read_to_string(path)?;
    let canonical = dunce::canonicalize(path)?;
    let root = canonical
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    parse_declaration(&content, root).map_err(|e| match e {
        DeclarationError::TomlParse { source, .. } => DeclarationError::TomlParse {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Parses declaration text. `root` becomes the declaration root.
pub fn parse_declaration(content: &str, root: PathBuf) -> Result<Declaration, DeclarationError> {
    let file: DeclarationFile =
        toml::from_str(content).map_err(|source| DeclarationError::TomlParse {
            path: PathBuf::from(DECLARATION_FILENAME),
            source,
        })?;

    let mut blocks = Vec::with_capacity(file.env.len());
    for (key, value) in file.env {
        let layer = value
            .try_into::<EnvLayer>()
            .map_err(|source| DeclarationError::Block {
                name: key.clone(),
                source,
            })?;
        blocks.push((key, layer));
    }

    let registry = build_registry(&file.defaults, &blocks)?;
    log::debug!("Declaration registered {} environment(s).", registry.len());

    Ok(Declaration {
        root,
        orchestrator: file.orchestrator,
        registry,
    })
}

/// A concrete name waiting for its final merge.
struct PendingEnv<'a> {
    name: String,
    factors: Vec<String>,
    origin: &'a str,
    template: &'a EnvLayer,
    exact: Option<&'a EnvLayer>,
}

/// Expands every block and merges `defaults` < template < exact-name.
fn build_registry(
    defaults: &EnvLayer,
    blocks: &[(String, EnvLayer)],
) -> Result<Registry, DeclarationError> {
    let mut pending: Vec<PendingEnv<'_>> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    // Pass 1: templates, in declaration order.
    for (key, layer) in blocks.iter().filter(|(key, _)| factors::is_template(key)) {
        for expanded in factors::expand(key)? {
            if let Some(&at) = positions.get(&expanded.name) {
                let first = pending.get(at).map(|p| p.origin).unwrap_or_default();
                return Err(DeclarationError::DuplicateEnvironment {
                    name: expanded.name,
                    first: first.to_string(),
                    second: key.clone(),
                });
            }
            positions.insert(expanded.name.clone(), pending.len());
            pending.push(PendingEnv {
                name: expanded.name,
                factors: expanded.factors,
                origin: key,
                template: layer,
                exact: None,
            });
        }
    }

    // Pass 2: plain names override an expansion or stand alone.
    let mut standalone: Vec<(usize, PendingEnv<'_>)> = Vec::new();
    for (order, (key, layer)) in blocks.iter().enumerate() {
        if factors::is_template(key) {
            continue;
        }
        match positions.get(key).and_then(|&at| pending.get_mut(at)) {
            Some(entry) => {
                log::debug!("Block '{}' overrides an expansion of '{}'.", key, entry.origin);
                entry.exact = Some(layer);
            }
            None => standalone.push((
                order,
                PendingEnv {
                    name: key.clone(),
                    factors: Vec::new(),
                    origin: key,
                    template: layer,
                    exact: None,
                },
            )),
        }
    }

    // Registration follows declaration order: each block's names at its position.
    let mut ordered: Vec<(usize, PendingEnv<'_>)> = pending
        .into_iter()
        .map(|env| {
            let order = blocks
                .iter()
                .position(|(key, _)| key == env.origin)
                .unwrap_or(usize::MAX);
            (order, env)
        })
        .collect();
    ordered.extend(standalone);
    ordered.sort_by_key(|(order, _)| *order);

    let mut registry = Registry::default();
    for (_, env) in ordered {
        registry.register(resolve_pending(defaults, env)?)?;
    }
    Ok(registry)
}

fn resolve_pending(
    defaults: &EnvLayer,
    env: PendingEnv<'_>,
) -> Result<EnvironmentSpec, DeclarationError> {
    let mut merged = defaults.merge(env.template);
    if let Some(exact) = env.exact {
        merged = merged.merge(exact);
    }
    merged.resolve(&env.name, env.factors)
}
