// src/cli/handlers/show.rs

//! `toxide show`: prints resolved environment configuration.

use crate::{
    CancellationToken,
    cli::{args::ShowArgs, handlers::commons},
    constants::EXIT_SUCCESS,
    core::registry::Selector,
};
use anyhow::{Context, Result};
use colored::*;

/// Prints each selected environment as it looks after expansion and merging.
pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<i32> {
    let show_args: ShowArgs = commons::parse_args(&args)?;
    let declaration = commons::load_declaration(&show_args.declaration)?;

    let selectors =
        commons::selectors(&show_args.selection)?.unwrap_or_else(|| vec![Selector::All]);
    let selection = declaration.registry.select(&selectors)?;

    for name in selection.names() {
        let spec = declaration.registry.lookup(name)?;
        let body = toml::to_string_pretty(spec)
            .with_context(|| format!("Failed to render environment '{}'", name))?;
        println!("{}", format!("[env.{}]", name).cyan().bold());
        println!("{}", body);
    }
    Ok(EXIT_SUCCESS)
}
