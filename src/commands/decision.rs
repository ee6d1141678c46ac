//! `decision accept|list|renew`.

use super::Output;
use crate::cli::DecisionCommand;
use crate::workspace::Workspace;
use anyhow::Context;
use steward_decisions::{Decision, MAX_RENEWALS};

pub fn run(ws: &Workspace, out: &mut Output<'_>, command: DecisionCommand) -> anyhow::Result<()> {
    let mut store = ws.decisions()?;
    match command {
        DecisionCommand::Accept { scope, policy, severity, context } => {
            let context: serde_json::Value =
                serde_json::from_str(&context).context("--context must be valid JSON")?;
            let decision = store.record(&scope, &policy, severity, &context)?;
            if out.is_json() {
                out.value(&decision)?;
            } else {
                out.line(format!(
                    "recorded {} ({} {}/{}), expires {}",
                    decision.id,
                    decision.severity,
                    decision.scope,
                    decision.policy,
                    decision.expires_at.to_rfc3339()
                ))?;
            }
        }
        DecisionCommand::List => {
            let decisions = store.list();
            if out.is_json() {
                out.value(&decisions)?;
            } else if decisions.is_empty() {
                out.line("no decisions recorded")?;
            } else {
                let now = chrono::Utc::now();
                for d in decisions {
                    out.line(list_line(d, d.is_live_at(now)))?;
                }
            }
        }
        DecisionCommand::Renew { id } => {
            let decision = store.renew(&id)?;
            if out.is_json() {
                out.value(&decision)?;
            } else {
                out.line(format!(
                    "renewed {} ({} of {MAX_RENEWALS}), expires {}",
                    decision.id,
                    decision.renewal_count,
                    decision.expires_at.to_rfc3339()
                ))?;
            }
        }
    }
    Ok(())
}

fn list_line(d: &Decision, live: bool) -> String {
    format!(
        "{}  {:<8} {:<7} {}/{}  expires {}  renewals {}",
        d.id,
        d.severity.name(),
        if live { "live" } else { "expired" },
        d.scope,
        d.policy,
        d.expires_at.format("%Y-%m-%d"),
        d.renewal_count
    )
}
