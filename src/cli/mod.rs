//! CLI module for Halyard
//!
//! Provides command-line interface for:
//! - check-config: Validate a configuration file
//! - resolve: Print what a request context sees in a fixture

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check_config, resolve, run, run_command, ResolveOptions};
pub use errors::{CliError, CliResult};
pub use io::{write_error, write_response};
