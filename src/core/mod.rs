// src/core/mod.rs

//! The orchestration pipeline: declaration loading, matrix expansion,
//! context materialization, injection, execution and reporting.

pub mod cache;
pub mod config_loader;
pub mod factors;
pub mod injector;
pub mod layers;
pub mod materializer;
pub mod orchestrator;
pub mod paths;
pub mod registry;
pub mod report;
pub mod runner;
