//! `doctor`: verify every piece of governance state, optionally fix hooks and tools.

use super::Output;
use crate::workspace::Workspace;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use steward_core::fsio::write_atomic;
use steward_decisions::{DecisionIndex, DecisionStore};
use steward_gate::{git, ProcessToolchain, Stage, Tool, Toolchain};
use steward_update::InstalledManifest;

pub const DOCTOR_FIX_HOOK: &str = "doctor.fix_hook";
pub const DOCTOR_FIX_TOOL: &str = "doctor.fix_tool";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

impl Finding {
    fn new(name: impl Into<String>, ok: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok,
            detail: detail.into(),
        }
    }
}

/// One line: the hook hands its arguments to the gate.
pub fn hook_shim(stage: Stage) -> String {
    match stage {
        Stage::CommitMsg => "#!/bin/sh\nexec steward gate commit-msg \"$1\"\n".to_string(),
        other => format!("#!/bin/sh\nexec steward gate {other}\n"),
    }
}

pub async fn run(
    ws: &Workspace,
    out: &mut Output<'_>,
    fix_hooks: bool,
    fix_tools: bool,
) -> anyhow::Result<()> {
    let toolchain = ProcessToolchain::new(&ws.root, std::time::Duration::from_secs(60));
    run_with(ws, out, fix_hooks, fix_tools, Arc::new(toolchain)).await
}

pub async fn run_with(
    ws: &Workspace,
    out: &mut Output<'_>,
    fix_hooks: bool,
    fix_tools: bool,
    toolchain: Arc<dyn Toolchain>,
) -> anyhow::Result<()> {
    let mut findings = vec![
        config_finding(ws),
        ownership_finding(ws),
        manifest_finding(ws),
        audit_finding(ws),
        decisions_finding(ws),
    ];

    if fix_hooks {
        fix_missing_hooks(ws)?;
    }
    findings.extend(hook_findings(ws));

    match super::gate::settings(ws) {
        Ok(settings) => {
            let tools: BTreeSet<Tool> = Stage::all()
                .iter()
                .flat_map(|s| settings.checks_for(*s).iter().copied())
                .filter(|t| !t.is_builtin())
                .collect();
            for tool in tools {
                let mut present = toolchain.detect(tool).await;
                if !present && fix_tools {
                    let outcome = toolchain.install(tool).await;
                    ws.audit.append(
                        DOCTOR_FIX_TOOL,
                        json!({"tool": tool, "ok": outcome.passed, "output": outcome.output}),
                    )?;
                    present = outcome.passed && toolchain.detect(tool).await;
                }
                let detail = if present {
                    "installed".to_string()
                } else {
                    missing_tool_hint(tool)
                };
                findings.push(Finding::new(format!("tool {tool}"), present, detail));
            }
        }
        Err(e) => findings.push(Finding::new("gate settings", false, format!("{e:#}"))),
    }

    let problems = findings.iter().filter(|f| !f.ok).count();
    if out.is_json() {
        out.value(&findings)?;
    } else {
        for f in &findings {
            let mark = if f.ok { "ok" } else { "!!" };
            out.line(format!("[{mark}] {}: {}", f.name, f.detail))?;
        }
    }
    if problems > 0 {
        anyhow::bail!("doctor found {problems} problem(s)");
    }
    Ok(())
}

fn config_finding(ws: &Workspace) -> Finding {
    let detail = if ws.config_present {
        format!("{} parsed", ws.config_path.display())
    } else {
        format!("{} absent, using defaults", ws.config_path.display())
    };
    Finding::new("config", true, detail)
}

fn ownership_finding(ws: &Workspace) -> Finding {
    let path = ws.ownership_map_path();
    let rules = ws.classifier.rules().count();
    if path.is_file() {
        Finding::new("ownership map", true, format!("{rules} rules"))
    } else {
        Finding::new(
            "ownership map",
            true,
            format!("builtin rules ({rules}); run install to persist"),
        )
    }
}

fn manifest_finding(ws: &Workspace) -> Finding {
    match InstalledManifest::load(&ws.manifest_path(), &ws.classifier) {
        Ok(Some(m)) => Finding::new(
            "install manifest",
            true,
            format!("schema {}, {} files", m.schema_version, m.len()),
        ),
        Ok(None) => Finding::new(
            "install manifest",
            false,
            "not installed; run `steward install`",
        ),
        Err(e) => Finding::new("install manifest", false, e.to_string()),
    }
}

fn audit_finding(ws: &Workspace) -> Finding {
    match ws.audit.events() {
        Ok(events) => {
            let detail = format!("{} events, no gaps", events.len());
            Finding::new("audit log", true, detail)
        }
        Err(e) => Finding::new("audit log", false, e.to_string()),
    }
}

fn decisions_finding(ws: &Workspace) -> Finding {
    let store = match DecisionStore::open(ws.decision_store_path(), &ws.audit) {
        Ok(s) => s,
        Err(e) => return Finding::new("decision store", false, e.to_string()),
    };
    let replayed: DecisionIndex = match ws.audit.replay() {
        Ok(v) => v,
        Err(e) => return Finding::new("decision store", false, format!("replay failed: {e}")),
    };
    let persisted = DecisionIndex::from_decisions(store.list());
    let diverged = replayed.divergence(&persisted);
    if diverged.is_empty() {
        Finding::new(
            "decision store",
            true,
            format!("{} decisions, replay agrees", persisted.decisions.len()),
        )
    } else {
        Finding::new(
            "decision store",
            false,
            format!("replay disagrees for: {}", diverged.join(", ")),
        )
    }
}

fn hook_findings(ws: &Workspace) -> Vec<Finding> {
    let Some(dir) = git::hooks_dir(&ws.root) else {
        return vec![Finding::new("hooks", false, "not a git checkout")];
    };
    Stage::all()
        .iter()
        .map(|stage| {
            let name = format!("hook {stage}");
            match std::fs::read_to_string(dir.join(stage.name())) {
                Ok(text) if text.contains("steward gate") => Finding::new(name, true, "installed"),
                Ok(_) => Finding::new(name, false, "present but does not call `steward gate`"),
                Err(_) => Finding::new(name, false, "missing; run `steward doctor --fix-hooks`"),
            }
        })
        .collect()
}

/// Writes shims for missing hooks only; a foreign hook is left for a human.
fn fix_missing_hooks(ws: &Workspace) -> anyhow::Result<()> {
    let Some(dir) = git::hooks_dir(&ws.root) else {
        return Ok(());
    };
    for stage in Stage::all() {
        let path = dir.join(stage.name());
        if path.exists() {
            continue;
        }
        write_atomic(&path, hook_shim(*stage).as_bytes())?;
        make_executable(&path)?;
        ws.audit.append(
            DOCTOR_FIX_HOOK,
            json!({"stage": stage, "path": path.display().to_string()}),
        )?;
        tracing::info!(%stage, "hook shim written");
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn missing_tool_hint(tool: Tool) -> String {
    match tool.install_command() {
        Some(cmd) => format!("missing; install with `{cmd}` or run `steward doctor --fix-tools`"),
        None => format!("missing; {tool} has no automatic installer"),
    }
}
