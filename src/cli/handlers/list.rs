// src/cli/handlers/list.rs

//! `toxide list`: prints the declared environments.

use crate::{
    CancellationToken,
    cli::{args::ListArgs, handlers::commons},
    constants::EXIT_SUCCESS,
    core::orchestrator,
    models::EnvironmentSpec,
};
use anyhow::Result;
use colored::*;
use std::collections::HashSet;

/// Lists every environment: first those run by default, then the rest.
pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<i32> {
    let list_args: ListArgs = commons::parse_args(&args)?;
    let declaration = commons::load_declaration(&list_args.declaration)?;

    let defaults = orchestrator::resolve_selection(&declaration, None)?;
    let default_names: HashSet<&str> = defaults.names().iter().map(String::as_str).collect();
    let width = declaration
        .registry
        .iter()
        .map(|spec| spec.name.len())
        .max()
        .unwrap_or(0);

    let (default_envs, other_envs): (Vec<&EnvironmentSpec>, Vec<&EnvironmentSpec>) = declaration
        .registry
        .iter()
        .partition(|spec| default_names.contains(spec.name.as_str()));

    print_group("default environments:", &default_envs, width);
    if !other_envs.is_empty() {
        println!();
        print_group("additional environments:", &other_envs, width);
    }
    Ok(EXIT_SUCCESS)
}

fn print_group(title: &str, envs: &[&EnvironmentSpec], width: usize) {
    println!("{}", title.yellow().bold());
    for spec in envs {
        let mut line = format!("  {:<width$}", spec.name.cyan(), width = width);
        if let Some(description) = &spec.description {
            line.push_str(&format!(" -> {}", description));
        }
        if !spec.labels.is_empty() {
            let labels: Vec<&str> = spec.labels.iter().map(String::as_str).collect();
            line.push_str(&format!(" {}", format!("[{}]", labels.join(", ")).dimmed()));
        }
        println!("{}", line);
    }
}
