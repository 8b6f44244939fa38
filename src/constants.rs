// src/constants.rs

//! Names and exit codes shared across the crate.

/// The name of the declaration file searched for from the working directory upwards.
pub const DECLARATION_FILENAME: &str = "toxide.toml";

/// The default directory (relative to the declaration root) holding every context.
pub const DEFAULT_WORK_DIR: &str = ".toxide";

/// The name of the stamp file written inside a context after a successful build.
pub const CONTEXT_STAMP_FILENAME: &str = ".toxide-context.bin";

/// Interpreter used when an environment neither sets `base_python` nor carries a `pyXY` factor.
pub const DEFAULT_BASE_PYTHON: &str = "python3";

/// Keyword selecting every registered environment (`-e ALL`).
pub const SELECT_ALL: &str = "ALL";

// --- Process exit codes ---

/// Every selected environment succeeded.
pub const EXIT_SUCCESS: i32 = 0;

/// At least one selected environment failed, errored or was skipped.
pub const EXIT_FAILURE: i32 = 1;

/// The selection matched nothing, or the declaration/selection was invalid.
pub const EXIT_USAGE: i32 = 2;

/// The run was interrupted by the operator.
pub const EXIT_INTERRUPTED: i32 = 130;
