//! Halyard CLI entry point
//!
//! Parses arguments, dispatches to the CLI module and exits non-zero on
//! failure. The error itself has already been written to stdout as JSON.

use halyard::cli;

fn main() {
    if cli::run().is_err() {
        std::process::exit(1);
    }
}
