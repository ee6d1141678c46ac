//! `standards show|diff`.

use super::Output;
use crate::cli::StandardsCommand;
use crate::workspace::Workspace;
use steward_standards::{diff_layers, CacheStatus, KeyChange};

pub fn run(ws: &Workspace, out: &mut Output<'_>, command: StandardsCommand) -> anyhow::Result<()> {
    match command {
        StandardsCommand::Show { prefix } => {
            let (resolution, status) = ws.resolve_standards()?;
            tracing::debug!(cache = ?status, layers = ?resolution.layer_ids, "standards resolved");
            let entries: Vec<_> = resolution
                .entries
                .iter()
                .filter(|e| prefix.as_deref().map_or(true, |p| e.key.starts_with(p)))
                .collect();

            if out.is_json() {
                out.value(&entries)?;
                return Ok(());
            }
            out.line(format!(
                "layers: {}{}",
                resolution.layer_ids.join(" < "),
                if status == CacheStatus::Hit {
                    " (cached)"
                } else {
                    ""
                }
            ))?;
            for e in entries {
                out.line(format!(
                    "{} = {}  [{}]",
                    e.key, e.value, e.contributing_layer_id
                ))?;
            }
        }
        StandardsCommand::Diff { layer_a, layer_b } => {
            let a = ws.standards_layer(&layer_a)?;
            let b = ws.standards_layer(&layer_b)?;
            let diff = diff_layers(&a, &b);

            if out.is_json() {
                out.value(&diff)?;
                return Ok(());
            }
            if diff.is_empty() {
                out.line(format!("{layer_a} and {layer_b} set the same leaves"))?;
            }
            for d in diff {
                let line = match d.change {
                    KeyChange::Added { value } => format!("+ {} = {value}", d.key),
                    KeyChange::Removed { value } => format!("- {} = {value}", d.key),
                    KeyChange::Changed { from, to } => format!("~ {}: {from} -> {to}", d.key),
                };
                out.line(line)?;
            }
        }
    }
    Ok(())
}
