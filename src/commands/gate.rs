//! `gate <stage>`: the entry point git hooks call.

use super::Output;
use crate::cli::GateArgs;
use crate::workspace::Workspace;
use anyhow::Context;
use std::sync::Arc;
use steward_gate::{
    git, GateEngine, GateRequest, GateSettings, ProcessToolchain, Stack, StageReport,
};

pub fn settings(ws: &Workspace) -> anyhow::Result<GateSettings> {
    let (resolution, _) = ws.resolve_standards()?;
    let stack = Stack::detect(&ws.root);
    tracing::debug!(%stack, "project stack");
    Ok(GateSettings::from_resolution(&resolution, stack)?)
}

pub async fn run(ws: &Workspace, out: &mut Output<'_>, args: GateArgs) -> anyhow::Result<()> {
    let settings = settings(ws)?;
    let branch = match args.branch {
        Some(b) => b,
        None => git::current_branch(&ws.root).await?,
    };

    let mut request = GateRequest::new(args.stage, branch);
    if let Some(path) = &args.msg_file {
        let message = std::fs::read_to_string(path)
            .with_context(|| format!("reading commit message {}", path.display()))?;
        request = request.with_commit_message(message);
    }
    request.overrides = args.overrides;

    let store = ws.decisions()?;
    let toolchain = Arc::new(ProcessToolchain::new(&ws.root, settings.check_timeout));
    let engine = GateEngine::new(toolchain, settings, &ws.audit, &store);
    let report = engine.run(request).await?;

    print(out, &report)?;
    report.into_result()?;
    Ok(())
}

fn print(out: &mut Output<'_>, report: &StageReport) -> anyhow::Result<()> {
    if out.is_json() {
        return out.value(report);
    }
    for check in &report.checks {
        let remediated = if check.remediation_attempted {
            " (after remediation)"
        } else {
            ""
        };
        let name = &check.check_name;
        out.line(format!("{name:<20} {}{remediated}", check.status))?;
    }
    for tool in &report.not_run {
        out.line(format!("{:<20} not run", tool.name()))?;
    }
    for message in &report.messages {
        out.line(message)?;
    }
    let verdict = format!("{}: {:?}", report.stage, report.verdict);
    out.line(verdict.to_lowercase())?;
    Ok(())
}
