//! # Command Line Interface
//!
//! `toxide` has a few commands (`run`, `list`, `show`, `clean`); a first
//! argument that is not one of them starts `run`. Each command owns its
//! argument parser in [`args`] and its handler in [`handlers`].

use clap::Parser;

pub mod args;
pub mod dispatcher;
pub mod handlers;

const AFTER_HELP: &str = "\
Commands:
  run    Run environments (default when no command is given)
  list   List the declared environments (alias: ls)
  show   Print the resolved configuration of environments
  clean  Remove the contexts of environments

Run `toxide <command> --help` for the options of a command.
Examples:
  toxide -e lint,test-py{310,311}
  toxide run -m static -p auto
  toxide -e test-py311 -- -k slow
  toxide -- -k slow";

/// toxide: a declarative multi-environment test, lint and audit orchestrator.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    after_help = AFTER_HELP,
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
// Each command parses its own options; the top level only renders help and version.
#[command(no_binary_name = true, disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// A command followed by its arguments, or `run` arguments directly.
    #[arg(allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}
