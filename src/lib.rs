//! steward: governance enforcement for repositories edited by coding agents.
//!
//! The binary is a thin shell over [`run`]; tests drive the same entry point
//! with an in-memory writer.

pub mod cli;
pub mod commands;
pub mod config;
pub mod workspace;

use cli::{Cli, Command};
use commands::Output;
use serde_json::json;
use std::io::Write;
use workspace::Workspace;

pub const COMMAND_FAILED: &str = "command.failed";

pub async fn run(cli: Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let ws = Workspace::open(&cli.root, cli.config.as_deref())?;
    let name = cli.command.name();
    let mut output = Output::new(cli.json, out);

    let result = dispatch(&ws, &mut output, cli.command).await;
    if let Err(e) = &result {
        let payload = json!({
            "command": name,
            "error": format!("{e:#}"),
            "exitCode": exit_code(e),
        });
        if let Err(audit_err) = ws.audit.append(COMMAND_FAILED, payload) {
            tracing::warn!(error = %audit_err, "could not audit command failure");
        }
    }
    result
}

async fn dispatch(ws: &Workspace, out: &mut Output<'_>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Install { dry_run, source } => {
            commands::install::install(ws, out, source.as_deref(), dry_run)
        }
        Command::Update { apply, source } => {
            commands::install::update(ws, out, source.as_deref(), apply)
        }
        Command::Doctor { fix_hooks, fix_tools } => {
            commands::doctor::run(ws, out, fix_hooks, fix_tools).await
        }
        Command::Gate(args) => commands::gate::run(ws, out, args).await,
        Command::Standards(cmd) => commands::standards::run(ws, out, cmd),
        Command::Decision(cmd) => commands::decision::run(ws, out, cmd),
    }
}

/// Process exit code for a failed command: the first steward error in the chain decides.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<steward_core::Error>())
        .map_or(1, |e| e.exit_code())
}
