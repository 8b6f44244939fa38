// src/cli/handlers/clean.rs

//! `toxide clean`: removes contexts from the work dir.

use crate::{
    CancellationToken,
    cli::{args::CleanArgs, handlers::commons},
    constants::EXIT_SUCCESS,
    core::{orchestrator::Orchestrator, registry::Selector, runner::SilentListener},
};
use anyhow::Result;
use colored::*;
use std::{collections::BTreeSet, sync::Arc};

/// Destroys the contexts of the selected environments.
pub fn handle(args: Vec<String>, cancellation_token: &CancellationToken) -> Result<i32> {
    let clean_args: CleanArgs = commons::parse_args(&args)?;
    let declaration = commons::load_declaration(&clean_args.declaration)?;

    let selectors =
        commons::selectors(&clean_args.selection)?.unwrap_or_else(|| vec![Selector::All]);
    let selection = declaration.registry.select(&selectors)?;

    // Environments sharing a context are cleaned once.
    let mut keys = BTreeSet::new();
    for name in selection.names() {
        keys.insert(declaration.registry.lookup(name)?.context.clone());
    }

    let orchestrator = Orchestrator::new(
        &declaration,
        Arc::new(SilentListener),
        false,
        cancellation_token.clone(),
    )?;
    let materializer = orchestrator.materializer();
    let mut removed = 0;
    for key in &keys {
        if materializer.destroy(key)? {
            println!("{} {}", "✓ removed".green(), key.cyan());
            removed += 1;
        }
    }
    println!(
        "{}",
        format!(
            "{} context(s) removed from '{}'.",
            removed,
            materializer.work_dir().display()
        )
        .dimmed()
    );
    Ok(EXIT_SUCCESS)
}
