// src/bin/toxide.rs

use anyhow::Error;
use colored::*;
use toxide::{
    cli::dispatcher,
    constants::{EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_USAGE},
    core::{config_loader::DeclarationError, registry::RegistryError},
    system::{executor::ExecutionError, signals},
};

/// The main entry point of the `toxide` application.
/// It sets up logging and Ctrl+C handling, dispatches to the correct handler,
/// and performs centralized error handling.
fn main() {
    env_logger::init();
    let cancellation_token = signals::install_ctrl_c_handler();

    // Arguments go to the dispatcher untouched so that a leading `--` survives.
    let args: Vec<String> = std::env::args_os()
        .skip(1)
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    match dispatcher::dispatch(args, &cancellation_token) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            let code = exit_code_for(&e);
            if code == EXIT_INTERRUPTED {
                // Interrupted runs exit silently, like a shell would.
                std::process::exit(code);
            }
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            std::process::exit(code);
        }
    }
}

/// Errors in the declaration or the selection are usage errors; they are
/// raised before any environment runs.
fn exit_code_for(error: &Error) -> i32 {
    let mut code = EXIT_FAILURE;
    for cause in error.chain() {
        if matches!(
            cause.downcast_ref::<ExecutionError>(),
            Some(ExecutionError::Cancelled)
        ) {
            return EXIT_INTERRUPTED;
        }
        if cause.is::<DeclarationError>()
            || cause.is::<RegistryError>()
            || cause.is::<clap::Error>()
        {
            code = EXIT_USAGE;
        }
    }
    code
}
