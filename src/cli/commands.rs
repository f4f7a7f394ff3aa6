//! CLI command implementations
//!
//! `resolve` builds an in-memory store from a fixture file, then prints
//! what one request context sees. Fixture layout:
//!
//! ```json
//! {
//!   "tenancy": {"workspace_ids": ["..."]},
//!   "change_sets": [
//!     {"id": "...", "name": "edit", "edit_sessions": [{"id": "...", "finish": "save"}]}
//!   ],
//!   "rows": [{"logical_id": "...", "tenancy": {..}, "visibility": {..}, "payload": {..}}]
//! }
//! ```
//!
//! Branches are opened first, rows imported in file order, then each
//! branch's `finish` action runs (edit sessions before their change set).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::config::HalyardConfig;
use crate::events::EventEmitter;
use crate::functions::BuiltinExecutor;
use crate::graph::GraphEngine;
use crate::ids::{ChangeSetId, EditSessionId};
use crate::lifecycle::LifecycleManager;
use crate::observability;
use crate::store::contract::import_row;
use crate::store::{ListOptions, RequestContext, Store, VersionedRow};
use crate::tenancy::{TenancyContext, VisibilityContext};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ChangeSetFinish {
    Apply,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EditSessionFinish {
    Save,
    Cancel,
}

#[derive(Debug, Deserialize)]
struct FixtureEditSession {
    id: EditSessionId,

    #[serde(default)]
    finish: Option<EditSessionFinish>,
}

#[derive(Debug, Deserialize)]
struct FixtureChangeSet {
    id: ChangeSetId,

    #[serde(default)]
    name: String,

    #[serde(default)]
    edit_sessions: Vec<FixtureEditSession>,

    #[serde(default)]
    finish: Option<ChangeSetFinish>,
}

#[derive(Debug, Deserialize)]
struct Fixture {
    tenancy: TenancyContext,

    #[serde(default)]
    change_sets: Vec<FixtureChangeSet>,

    #[serde(default)]
    rows: Vec<Value>,
}

/// Options for [`resolve`]
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub config: Option<PathBuf>,
    pub fixture: PathBuf,
    pub visibility: VisibilityContext,
    pub include_deleted: bool,
    pub attributes: bool,
}

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// Command failures are reported as a JSON error object on stdout.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    match run_command(cli.command) {
        Ok(()) => Ok(()),
        Err(e) => {
            write_error(e.code(), &e.to_string())?;
            Err(e)
        }
    }
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::CheckConfig { config } => write_response(check_config(&config)?),
        Command::Resolve {
            config,
            fixture,
            change_set,
            edit_session,
            include_deleted,
            attributes,
        } => {
            let options = ResolveOptions {
                config,
                fixture,
                visibility: VisibilityContext {
                    change_set_id: change_set,
                    edit_session_id: edit_session,
                },
                include_deleted,
                attributes,
            };
            write_response(resolve(&options)?)
        }
    }
}

/// Loads and validates the configuration, returning it with every
/// default filled in.
pub fn check_config(path: &Path) -> CliResult<Value> {
    let config = HalyardConfig::load(path)?;
    Ok(serde_json::to_value(config)?)
}

pub fn resolve(options: &ResolveOptions) -> CliResult<Value> {
    let config = match &options.config {
        Some(path) => HalyardConfig::load(path)?,
        None => HalyardConfig::default(),
    };
    observability::init(&config.logging);

    let content = fs::read_to_string(&options.fixture).map_err(|e| {
        CliError::Fixture(format!("{}: {}", options.fixture.display(), e))
    })?;
    let fixture: Fixture =
        serde_json::from_str(&content).map_err(|e| CliError::Fixture(e.to_string()))?;

    let store = Arc::new(Store::new());
    let events = Arc::new(EventEmitter::new(&config.events));
    load_fixture(&store, &events, &fixture)?;

    let ctx = RequestContext::new(fixture.tenancy.clone(), options.visibility);
    let listing = store.list(
        &ctx,
        ListOptions {
            include_deleted: options.include_deleted,
            kind: None,
        },
        |_| true,
    )?;

    if !options.attributes {
        let rows = listing.to_vec();
        info!(
            event = "FIXTURE_RESOLVED",
            rows = rows.len(),
            watermark = listing.watermark().value(),
        );
        let rows: Vec<&VersionedRow> = rows.iter().map(|row| row.as_ref()).collect();
        return Ok(json!({
            "watermark": listing.watermark(),
            "rows": rows,
        }));
    }

    let engine = GraphEngine::new(
        store.clone(),
        events,
        Arc::new(BuiltinExecutor::new()),
        &config.resolver,
    );
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let (report, attributes) = runtime.block_on(async {
        let report = engine.recompute_all(&ctx).await?;
        let attributes = engine.attributes(&ctx).await?;
        Ok::<_, CliError>((report, attributes))
    })?;

    Ok(json!({
        "watermark": report.watermark,
        "report": report,
        "attributes": attributes.as_ref(),
    }))
}

fn load_fixture(store: &Arc<Store>, events: &Arc<EventEmitter>, fixture: &Fixture) -> CliResult<()> {
    let lifecycle = LifecycleManager::new(store.clone(), events.clone());
    let tenancy = &fixture.tenancy;

    for change_set in &fixture.change_sets {
        lifecycle.open_change_set_with_id(tenancy, change_set.id, change_set.name.as_str())?;
        for edit_session in &change_set.edit_sessions {
            lifecycle.open_edit_session_with_id(tenancy, change_set.id, edit_session.id)?;
        }
    }

    for row in &fixture.rows {
        import_row(store, &row.to_string())?;
    }

    for change_set in &fixture.change_sets {
        for edit_session in &change_set.edit_sessions {
            match edit_session.finish {
                Some(EditSessionFinish::Save) => {
                    lifecycle.save_edit_session(tenancy, edit_session.id)?;
                }
                Some(EditSessionFinish::Cancel) => {
                    lifecycle.cancel_edit_session(tenancy, edit_session.id)?;
                }
                None => {}
            }
        }
        match change_set.finish {
            Some(ChangeSetFinish::Apply) => {
                lifecycle.apply_change_set(tenancy, change_set.id)?;
            }
            Some(ChangeSetFinish::Cancel) => {
                lifecycle.cancel_change_set(tenancy, change_set.id)?;
            }
            None => {}
        }
    }
    Ok(())
}
