//! Plan and apply framework updates without clobbering local edits.
//!
//! For every canonical path:
//! - absent locally: `create`
//! - team/project tier: `skip`, whatever the content says
//! - framework/system tier, content differs, local hash == manifest hash: `update`
//! - framework/system tier, content differs, local hash != manifest hash: `conflict`
//!
//! Conflicts are never written. `apply` without `confirm` touches nothing.
//! Each write is preceded by its audit event; a write that then fails is
//! followed by `update.failed`.

use crate::manifest::{InstalledFile, InstalledManifest};
use crate::tree::SourceTree;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use steward_core::fsio::{write_atomic, FileLock, DEFAULT_LOCK_WAIT};
use steward_core::hash::content_hash;
use steward_core::{AuditLog, Error, Result, Tier};
use steward_ownership::{Classifier, WriteAction};
use tracing::{debug, info, warn};

pub const UPDATE_CREATE: &str = "update.create";
pub const UPDATE_UPDATE: &str = "update.update";
pub const UPDATE_CONFLICT: &str = "update.conflict";
pub const UPDATE_REJECTED: &str = "update.rejected";
pub const UPDATE_FAILED: &str = "update.failed";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Create,
    Skip,
    Update,
    Conflict,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Skip => write!(f, "skip"),
            Self::Update => write!(f, "update"),
            Self::Conflict => write!(f, "conflict"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    TierProtected,
    Unchanged,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub op: OpKind,
    pub path: String,
    pub tier: Tier,
    pub canonical_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub operations: Vec<Operation>,
}

impl Plan {
    pub fn count(&self, kind: OpKind) -> usize {
        self.operations.iter().filter(|o| o.op == kind).count()
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter().filter(|o| o.op == OpKind::Conflict)
    }

    pub fn has_conflicts(&self) -> bool {
        self.count(OpKind::Conflict) > 0
    }

    /// Nothing would be written.
    pub fn is_noop(&self) -> bool {
        self.count(OpKind::Create) + self.count(OpKind::Update) == 0
    }
}

/// Pure planning over already-read trees.
pub fn plan(
    classifier: &Classifier,
    canonical: &SourceTree,
    installed: &SourceTree,
    manifest: &InstalledManifest,
) -> Result<Plan> {
    let mut operations = Vec::with_capacity(canonical.len());

    for path in canonical.paths() {
        let Some(source) = canonical.get(path) else { continue };
        let tier = classifier.classify(path)?;
        let recorded = manifest.recorded_hash(path).map(str::to_string);

        let (op, installed_hash, reason) = match installed.get(path) {
            None => (OpKind::Create, None, None),
            Some(local) => {
                let local_hash = Some(local.hash.clone());
                if tier.is_user_owned() {
                    (OpKind::Skip, local_hash, Some(SkipReason::TierProtected))
                } else if local.hash == source.hash {
                    (OpKind::Skip, local_hash, Some(SkipReason::Unchanged))
                } else if recorded.as_deref() == Some(local.hash.as_str()) {
                    (OpKind::Update, local_hash, None)
                } else {
                    (OpKind::Conflict, local_hash, None)
                }
            }
        };

        operations.push(Operation {
            op,
            path: path.to_string(),
            tier,
            canonical_hash: source.hash.clone(),
            installed_hash,
            recorded_hash: recorded,
            reason,
        });
    }

    let plan = Plan { operations };
    debug!(
        create = plan.count(OpKind::Create),
        update = plan.count(OpKind::Update),
        skip = plan.count(OpKind::Skip),
        conflict = plan.count(OpKind::Conflict),
        "update plan"
    );
    Ok(plan)
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedOp {
    pub op: OpKind,
    pub path: String,
    pub tier: Tier,
    pub seq: u64,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub dry_run: bool,
    pub executed: Vec<ExecutedOp>,
    pub conflicts: Vec<String>,
    pub skipped: usize,
}

/// Plans and applies against one installed root, its manifest, and the audit log.
pub struct Updater<'a> {
    classifier: &'a Classifier,
    audit: &'a AuditLog,
    install_root: PathBuf,
    manifest_path: PathBuf,
    lock_wait: Duration,
}

impl<'a> Updater<'a> {
    pub fn new(
        classifier: &'a Classifier,
        audit: &'a AuditLog,
        install_root: impl AsRef<Path>,
        manifest_path: impl AsRef<Path>,
    ) -> Self {
        Self {
            classifier,
            audit,
            install_root: install_root.as_ref().to_path_buf(),
            manifest_path: manifest_path.as_ref().to_path_buf(),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    pub fn load_manifest(&self) -> Result<InstalledManifest> {
        let manifest = InstalledManifest::load(&self.manifest_path, self.classifier)?;
        Ok(manifest.unwrap_or_default())
    }

    pub fn plan(&self, canonical: &SourceTree) -> Result<Plan> {
        let manifest = self.load_manifest()?;
        let installed = SourceTree::read_existing(&self.install_root, canonical.paths())?;
        plan(self.classifier, canonical, &installed, &manifest)
    }

    pub fn apply(&self, plan: &Plan, canonical: &SourceTree, confirm: bool) -> Result<ApplyReport> {
        let skipped = plan.count(OpKind::Skip);
        let conflicts: Vec<String> = plan.conflicts().map(|o| o.path.clone()).collect();
        if !confirm {
            info!(ops = plan.operations.len(), "dry run, nothing written");
            return Ok(ApplyReport {
                dry_run: true,
                executed: Vec::new(),
                conflicts,
                skipped,
            });
        }

        self.validate(plan, canonical)?;

        let _lock = FileLock::acquire(&self.manifest_path, self.lock_wait)?;
        let mut manifest = self.load_manifest()?;
        let mut report = ApplyReport {
            dry_run: false,
            skipped,
            ..Default::default()
        };

        for op in &plan.operations {
            let target = self.install_root.join(&op.path);
            let current = read_hash(&target)?;
            match op.op {
                OpKind::Skip => self.adopt(op, current.as_deref(), &mut manifest),
                OpKind::Conflict => self.conflict(op, current.as_deref(), &mut report)?,
                OpKind::Create | OpKind::Update => {
                    if current != op.installed_hash {
                        // Changed on disk since planning.
                        warn!(path = %op.path, "local content moved since planning");
                        self.conflict(op, current.as_deref(), &mut report)?;
                        continue;
                    }
                    let Some(source) = canonical.get(&op.path) else { continue };

                    // The event goes first so no write ever lands without one.
                    let (event_type, payload) = match op.op {
                        OpKind::Create => (
                            UPDATE_CREATE,
                            json!({"path": op.path, "tier": op.tier, "contentHash": source.hash}),
                        ),
                        _ => (
                            UPDATE_UPDATE,
                            json!({
                                "path": op.path,
                                "tier": op.tier,
                                "fromHash": op.installed_hash,
                                "contentHash": source.hash
                            }),
                        ),
                    };
                    let event = self.audit.append(event_type, payload)?;
                    if let Err(e) = write_atomic(&target, &source.bytes) {
                        self.audit.append(
                            UPDATE_FAILED,
                            json!({"path": op.path, "seq": event.seq, "error": e.to_string()}),
                        )?;
                        manifest.save(&self.manifest_path)?;
                        return Err(e);
                    }
                    manifest.upsert(InstalledFile {
                        path: op.path.clone(),
                        content_hash: source.hash.clone(),
                        tier: op.tier,
                    });
                    manifest.save(&self.manifest_path)?;

                    report.executed.push(ExecutedOp {
                        op: op.op,
                        path: op.path.clone(),
                        tier: op.tier,
                        seq: event.seq,
                    });
                }
            }
        }

        manifest.save(&self.manifest_path)?;
        info!(
            executed = report.executed.len(),
            conflicts = report.conflicts.len(),
            "update applied"
        );
        Ok(report)
    }

    /// Refuse the whole plan before any write if it would touch a user-owned
    /// file or no longer matches the canonical tree.
    fn validate(&self, plan: &Plan, canonical: &SourceTree) -> Result<()> {
        for op in &plan.operations {
            if op.op == OpKind::Update {
                if let Err(e) = self.classifier.ensure_permits(&op.path, WriteAction::Update) {
                    self.audit.append(
                        UPDATE_REJECTED,
                        json!({"path": op.path, "op": op.op, "error": e.to_string()}),
                    )?;
                    return Err(e);
                }
            }
            if matches!(op.op, OpKind::Create | OpKind::Update) {
                let fresh = canonical.get(&op.path).map(|s| s.hash.as_str());
                if fresh != Some(op.canonical_hash.as_str()) {
                    return Err(Error::config(
                        canonical.root().join(&op.path),
                        "canonical content changed since the plan was made; re-plan",
                    ));
                }
            }
        }
        Ok(())
    }

    /// A framework/system file already identical to canonical is recorded as
    /// installed, so a later canonical change plans as `update`, not `conflict`.
    fn adopt(&self, op: &Operation, current: Option<&str>, manifest: &mut InstalledManifest) {
        if op.tier.is_user_owned() || current != Some(op.canonical_hash.as_str()) {
            return;
        }
        if manifest.recorded_hash(&op.path) == Some(op.canonical_hash.as_str()) {
            return;
        }
        debug!(path = %op.path, "recording identical file in manifest");
        manifest.upsert(InstalledFile {
            path: op.path.clone(),
            content_hash: op.canonical_hash.clone(),
            tier: op.tier,
        });
    }

    fn conflict(
        &self,
        op: &Operation,
        current: Option<&str>,
        report: &mut ApplyReport,
    ) -> Result<()> {
        self.audit.append(
            UPDATE_CONFLICT,
            json!({
                "path": op.path,
                "tier": op.tier,
                "installedHash": current,
                "recordedHash": op.recorded_hash,
                "canonicalHash": op.canonical_hash
            }),
        )?;
        report.conflicts.retain(|p| p != &op.path);
        report.conflicts.push(op.path.clone());
        Ok(())
    }
}

fn read_hash(path: &Path) -> Result<Option<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(content_hash(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
