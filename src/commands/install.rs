//! `install` and `update`: plan the canonical tree against the repository.

use super::Output;
use crate::workspace::Workspace;
use anyhow::Context;
use serde_json::json;
use std::path::Path;
use steward_core::fsio::write_json_atomic;
use steward_core::Error;
use steward_ownership::OwnershipMap;
use steward_update::{ApplyReport, InstalledManifest, OpKind, Plan, SourceTree, Updater};

pub const OWNERSHIP_MAP_WRITTEN: &str = "ownership.map_written";

pub fn install(
    ws: &Workspace,
    out: &mut Output<'_>,
    source: Option<&Path>,
    dry_run: bool,
) -> anyhow::Result<()> {
    if InstalledManifest::load(&ws.manifest_path(), &ws.classifier)?.is_some() {
        return Err(Error::config(
            ws.manifest_path(),
            "already installed; use `steward update`",
        )
        .into());
    }
    let (plan, report) = plan_and_apply(ws, source, !dry_run)?;
    if !dry_run {
        ensure_ownership_map(ws)?;
    }
    finish(out, &plan, &report)
}

pub fn update(
    ws: &Workspace,
    out: &mut Output<'_>,
    source: Option<&Path>,
    apply: bool,
) -> anyhow::Result<()> {
    if InstalledManifest::load(&ws.manifest_path(), &ws.classifier)?.is_none() {
        return Err(Error::config(
            ws.manifest_path(),
            "not installed; run `steward install` first",
        )
        .into());
    }
    let (plan, report) = plan_and_apply(ws, source, apply)?;
    finish(out, &plan, &report)
}

fn plan_and_apply(
    ws: &Workspace,
    source: Option<&Path>,
    confirm: bool,
) -> anyhow::Result<(Plan, ApplyReport)> {
    let canonical_dir = ws.canonical_dir(source)?;
    let state_dir = ws.state_dir_name();
    let tree = SourceTree::scan(&canonical_dir, &[state_dir.as_str()])
        .with_context(|| {
            format!("scanning canonical tree {}", canonical_dir.display())
        })?;

    let updater = Updater::new(&ws.classifier, &ws.audit, &ws.root, ws.manifest_path())
        .with_lock_wait(ws.lock_wait());
    let plan = updater.plan(&tree)?;
    let report = updater.apply(&plan, &tree, confirm)?;
    Ok((plan, report))
}

/// Persist the rules in effect so later runs classify the same way.
fn ensure_ownership_map(ws: &Workspace) -> anyhow::Result<()> {
    let path = ws.ownership_map_path();
    if path.exists() {
        return Ok(());
    }
    let map = OwnershipMap {
        rules: ws.classifier.rules().cloned().collect(),
    };
    write_json_atomic(&path, &map)?;
    ws.audit.append(
        OWNERSHIP_MAP_WRITTEN,
        json!({"path": path.display().to_string(), "rules": map.rules.len()}),
    )?;
    Ok(())
}

fn finish(out: &mut Output<'_>, plan: &Plan, report: &ApplyReport) -> anyhow::Result<()> {
    if out.is_json() {
        out.value(&json!({"plan": plan, "report": report}))?;
    } else {
        for op in &plan.operations {
            if op.op == OpKind::Skip {
                continue;
            }
            out.line(format!(
                "{:<9} {:<10} {}",
                op.op.to_string(),
                op.tier.to_string(),
                op.path
            ))?;
        }
        out.line(format!(
            "{} create, {} update, {} skip, {} conflict{}",
            plan.count(OpKind::Create),
            plan.count(OpKind::Update),
            plan.count(OpKind::Skip),
            plan.count(OpKind::Conflict),
            if report.dry_run {
                " (dry run, nothing written)"
            } else {
                ""
            },
        ))?;
    }

    if !report.dry_run && !report.conflicts.is_empty() {
        return Err(Error::MergeConflict {
            count: report.conflicts.len(),
            paths: report.conflicts.clone(),
        }
        .into());
    }
    Ok(())
}
