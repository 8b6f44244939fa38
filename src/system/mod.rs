//! # System Interaction Layer
//!
//! The boundary between the orchestrator and the operating system.
//!
//! ## Modules
//!
//! - **`executor`**: spawns external processes with an explicit environment,
//!   streams their merged output and kills them when the run is cancelled.
//! - **`installer`**: the narrow interface to the external package installer,
//!   plus the implementation that shells out to configurable command templates.
//! - **`signals`**: turns Ctrl+C into a cancellation token.

pub mod executor;
pub mod installer;
pub mod signals;
