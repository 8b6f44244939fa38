// src/cli/handlers/mod.rs

//! One module per CLI command, plus helpers they share.

pub mod clean;
pub mod commons;
pub mod list;
pub mod run;
pub mod show;
