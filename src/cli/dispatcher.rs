//! Routes raw arguments to the handler of a command.

use anyhow::Result;

use crate::{
    CancellationToken,
    cli::{Cli, handlers},
    constants::EXIT_SUCCESS,
};

/// Flags answered by the top level when they come first.
const TOP_LEVEL_FLAGS: &[&str] = &["-h", "--help", "-V", "--version"];
const TOP_LEVEL: &str = "toxide";

/// Defines a system command, its aliases, and its handler. Every handler
/// returns the process exit code it wants.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>, &CancellationToken) -> Result<i32>,
}

/// The single source of truth for all system commands.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "run",
        aliases: &[],
        handler: handlers::run::handle,
    },
    CommandDefinition {
        name: "list",
        aliases: &["ls"],
        handler: handlers::list::handle,
    },
    CommandDefinition {
        name: "show",
        aliases: &["config"],
        handler: handlers::show::handle,
    },
    CommandDefinition {
        name: "clean",
        aliases: &[],
        handler: handlers::clean::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Splits the raw arguments into a command and its arguments.
/// Anything that does not start with a known command is a `run`, including
/// a leading `--` that introduces positional arguments.
fn route(all_args: Vec<String>) -> (&'static str, Vec<String>) {
    match all_args.split_first() {
        Some((first, _)) if TOP_LEVEL_FLAGS.contains(&first.as_str()) => (TOP_LEVEL, all_args),
        Some((first, rest)) => match find_command(first) {
            Some(command) => (command.name, rest.to_vec()),
            None => ("run", all_args),
        },
        None => ("run", all_args),
    }
}

/// Routes the raw arguments (without the binary name) to their handler and
/// returns its exit code.
pub fn dispatch(all_args: Vec<String>, cancellation_token: &CancellationToken) -> Result<i32> {
    log::debug!("Dispatching args: {:?}", all_args);
    let (name, handler_args) = route(all_args);
    if name == TOP_LEVEL {
        // Prints the top-level help or version and exits.
        handlers::commons::parse_args::<Cli>(&handler_args)?;
        return Ok(EXIT_SUCCESS);
    }
    match find_command(name) {
        Some(command) => (command.handler)(handler_args, cancellation_token),
        None => handlers::run::handle(handler_args, cancellation_token),
    }
}
