//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod instrument;
pub mod recover;
pub mod run;
pub mod utils;

// Re-export main command functions
pub use instrument::execute_instrument;
pub use recover::execute_recover;
pub use run::{execute_run, validate_args, RunArgs};
pub use utils::{display_schema, display_version, validate_trace_file};
