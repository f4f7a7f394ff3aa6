//! CLI argument definitions using clap
//!
//! Commands:
//! - halyard check-config --config <path>
//! - halyard resolve --config <path> --fixture <path> [--change-set <id>] [--edit-session <id>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::ids::{ChangeSetId, EditSessionId};

/// Halyard - branch-aware infrastructure model
#[derive(Parser, Debug)]
#[command(name = "halyard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate a configuration file
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./halyard.json")]
        config: PathBuf,
    },

    /// Load a fixture and print the rows visible to a context
    Resolve {
        /// Path to configuration file; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON fixture with tenancy, branches and rows
        #[arg(long)]
        fixture: PathBuf,

        #[arg(long)]
        change_set: Option<ChangeSetId>,

        /// Requires --change-set
        #[arg(long, requires = "change_set")]
        edit_session: Option<EditSessionId>,

        /// Include tombstoned rows
        #[arg(long)]
        include_deleted: bool,

        /// Print computed attribute values instead of rows
        #[arg(long)]
        attributes: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolve() {
        let cs = ChangeSetId::new();
        let cli = Cli::try_parse_from([
            "halyard",
            "resolve",
            "--fixture",
            "rows.json",
            "--change-set",
            &cs.to_string(),
            "--include-deleted",
        ])
        .unwrap();
        match cli.command {
            Command::Resolve {
                change_set,
                include_deleted,
                edit_session,
                ..
            } => {
                assert_eq!(change_set, Some(cs));
                assert!(include_deleted);
                assert!(edit_session.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_edit_session_requires_change_set() {
        let es = EditSessionId::new().to_string();
        let parsed = Cli::try_parse_from([
            "halyard",
            "resolve",
            "--fixture",
            "rows.json",
            "--edit-session",
            es.as_str(),
        ]);
        assert!(parsed.is_err());
    }
}
