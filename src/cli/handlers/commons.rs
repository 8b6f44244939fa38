// src/cli/handlers/commons.rs

//! Shared helpers for the command handlers.

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use std::env;

use crate::{
    cli::args::{DeclarationArgs, SelectionArgs},
    core::{
        config_loader::{self, Declaration},
        registry::Selector,
    },
};

/// Parses handler arguments. `--help` and `--version` print and exit.
pub fn parse_args<T: Parser>(args: &[String]) -> Result<T> {
    match T::try_parse_from(args) {
        Ok(parsed) => Ok(parsed),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => Err(e.into()),
    }
}

/// Loads the declaration given with `-c`, or the first one found upwards
/// from the current directory.
pub fn load_declaration(args: &DeclarationArgs) -> Result<Declaration> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => {
            let cwd = env::current_dir().context("Failed to read the current directory.")?;
            config_loader::find_declaration(&cwd)?
        }
    };
    Ok(config_loader::load(&path)?)
}

/// Turns `-e`, `-f` and `-m` into selectors. `None` when none of them was
/// given, so the command applies its own default. A given selection may
/// still expand to nothing, e.g. `-e "test-py{}"`.
pub fn selectors(args: &SelectionArgs) -> Result<Option<Vec<Selector>>> {
    if args.envs.is_empty() && args.factors.is_empty() && args.labels.is_empty() {
        return Ok(None);
    }
    let mut selectors = Vec::new();
    for raw in &args.envs {
        selectors.extend(Selector::from_env_arg(raw)?);
    }
    selectors.extend(args.factors.iter().cloned().map(Selector::Factor));
    selectors.extend(args.labels.iter().cloned().map(Selector::Label));
    Ok(Some(selectors))
}
