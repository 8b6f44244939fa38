//! # toxide
//!
//! A declarative multi-environment test, lint and audit orchestrator.
//!
//! A declaration names environments (optionally as factor templates such as
//! `test-py{310,311}`); `toxide` expands them into a matrix, materializes an
//! isolated context per environment, injects a controlled set of variables
//! and runs each environment's commands, aggregating the outcomes.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Shared flag set once the operator asks the run to stop.
pub type CancellationToken = Arc<AtomicBool>;

pub mod cli;
pub mod constants;
pub mod core;
pub mod dev_utils;
pub mod models;
pub mod system;
