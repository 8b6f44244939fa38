// src/cli/args.rs

//! Argument parsers of the individual commands.
use clap::{Args, Parser};
use std::path::PathBuf;

/// Where to find the declaration.
#[derive(Args, Debug, Default, Clone)]
pub struct DeclarationArgs {
    /// Path to the declaration file. Searched upwards from the current directory by default.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Which environments a command applies to. With none given, commands fall
/// back to their own default.
#[derive(Args, Debug, Default, Clone)]
pub struct SelectionArgs {
    /// Environments to select, comma separated. Factor templates and `ALL` are accepted.
    #[arg(short = 'e', long = "env", value_name = "ENV")]
    pub envs: Vec<String>,

    /// Select environments carrying this factor (e.g. `py311` or `lint`).
    #[arg(short = 'f', long = "factor", value_name = "FACTOR")]
    pub factors: Vec<String>,

    /// Select environments carrying this label.
    #[arg(short = 'm', long = "label", value_name = "LABEL")]
    pub labels: Vec<String>,
}

/// Arguments of `run`.
#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Runs the commands of the selected environments."
)]
pub struct RunArgs {
    /// Which environments to run.
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Number of environments run at once: a number or `auto`.
    #[arg(short = 'p', long, value_name = "N|auto")]
    pub parallel: Option<String>,

    /// Rebuild the contexts of the selected environments.
    #[arg(short = 'r', long)]
    pub recreate: bool,

    /// Build contexts but do not run any command.
    #[arg(long)]
    pub notest: bool,

    /// Show the output of parallel environments as it arrives.
    #[arg(short = 'o', long)]
    pub live: bool,

    /// Also print the captured output of environments that succeeded.
    #[arg(short, long)]
    pub verbose: bool,

    /// Write the result summary as JSON to this file.
    #[arg(long, value_name = "FILE")]
    pub result_json: Option<PathBuf>,

    /// Where the declaration is.
    #[command(flatten)]
    pub declaration: DeclarationArgs,

    /// Arguments substituted for `{posargs}` in commands.
    #[arg(last = true, value_name = "POSARGS")]
    pub posargs: Vec<String>,
}

/// Arguments of `list`.
#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Lists the declared environments.")]
pub struct ListArgs {
    /// Where the declaration is.
    #[command(flatten)]
    pub declaration: DeclarationArgs,
}

/// Arguments of `show`.
#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Prints the resolved configuration of environments."
)]
pub struct ShowArgs {
    /// Which environments to apply to; all of them by default.
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Where the declaration is.
    #[command(flatten)]
    pub declaration: DeclarationArgs,
}

/// Arguments of `clean`.
#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Removes the contexts of environments (all of them by default)."
)]
pub struct CleanArgs {
    /// Which environments to apply to; all of them by default.
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Where the declaration is.
    #[command(flatten)]
    pub declaration: DeclarationArgs,
}
