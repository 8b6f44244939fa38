// src/cli/handlers/run.rs

//! `toxide run`, the default command.

use crate::{
    CancellationToken,
    cli::{args::RunArgs, handlers::commons},
    core::{
        orchestrator::{self, Orchestrator, Parallelism, RunOptions},
        report::{self, ConsoleListener, OutputMode},
    },
};
use anyhow::Result;
use colored::*;
use std::sync::Arc;

/// The handler for `run`, also used when no command is given.
pub fn handle(args: Vec<String>, cancellation_token: &CancellationToken) -> Result<i32> {
    let run_args: RunArgs = commons::parse_args(&args)?;
    let declaration = commons::load_declaration(&run_args.declaration)?;

    let options = RunOptions {
        selectors: commons::selectors(&run_args.selection)?,
        posargs: run_args.posargs.clone(),
        parallel: run_args
            .parallel
            .as_deref()
            .map(Parallelism::parse)
            .transpose()?,
        recreate: run_args.recreate,
        notest: run_args.notest,
    };

    // Resolved up front so selection errors surface before anything is printed.
    let selection = orchestrator::resolve_selection(&declaration, options.selectors.as_deref())?;
    let workers = options.workers(&declaration).min(selection.len().max(1));
    let mode = OutputMode::for_run(workers, run_args.live);

    let orchestrator = Orchestrator::new(
        &declaration,
        Arc::new(ConsoleListener::new(mode)),
        run_args.recreate,
        cancellation_token.clone(),
    )?;
    let summary = orchestrator.run(&options)?;

    if summary.total() == 0 {
        eprintln!("{}", "No environment matched the selection.".yellow());
    } else {
        print!(
            "{}",
            report::render_outputs(&summary, mode.streams(), run_args.verbose)
        );
        print!("{}", report::render_summary(&summary));
    }

    if let Some(path) = &run_args.result_json {
        report::write_json(&summary, path)?;
        log::debug!("Results written to '{}'", path.display());
    }
    Ok(report::exit_code(&summary))
}
