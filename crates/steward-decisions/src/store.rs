use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use steward_core::fsio::{read_json_opt, write_json_atomic, FileLock, DEFAULT_LOCK_WAIT};
use steward_core::hash::{canonical_json, PartsHasher};
use steward_core::{AuditLog, Error, Result, Severity};
use tracing::{debug, info, warn};

pub const MAX_RENEWALS: u32 = 2;

pub const DECISION_RECORDED: &str = "decision.recorded";
pub const DECISION_RENEWED: &str = "decision.renewed";
pub const DECISION_RENEWAL_REFUSED: &str = "decision.renewal_refused";
pub const DECISION_WRITE_FAILED: &str = "decision.write_failed";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub id: String,
    pub scope: String,
    pub policy: String,
    pub severity: Severity,
    pub context_hash: String,
    pub decided_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub renewal_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewed_at: Option<DateTime<Utc>>,
}

impl Decision {
    /// `expiresAt` is always derivable: last (re)decision time + severity TTL.
    pub fn derived_expiry(&self) -> DateTime<Utc> {
        self.renewed_at.unwrap_or(self.decided_at) + self.severity.ttl()
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Does this decision cover `context` under its own scope, policy and severity?
    pub fn binds(&self, context: &Value) -> bool {
        self.context_hash == context_hash(&self.scope, &self.policy, self.severity, context)
    }
}

/// `SHA-256(scope ‖ policy ‖ severity ‖ canonical-json(context))`, length-prefixed parts.
pub fn context_hash(scope: &str, policy: &str, severity: Severity, context: &Value) -> String {
    PartsHasher::new()
        .part(scope.as_bytes())
        .part(policy.as_bytes())
        .part(severity.name().as_bytes())
        .part(canonical_json(context).as_bytes())
        .finish()
}

#[derive(Clone, Debug, PartialEq)]
pub enum LookupOutcome {
    Valid(Decision),
    Expired(Decision),
    /// Decisions exist for scope/policy, none for this context or severity.
    Mismatch { candidates: usize },
    Missing,
}

impl LookupOutcome {
    pub fn into_decision(self) -> Option<Decision> {
        match self {
            Self::Valid(d) => Some(d),
            _ => None,
        }
    }

    /// The re-prompt error for outcomes that are not valid.
    pub fn into_result(self, scope: &str, policy: &str) -> Result<Option<Decision>> {
        match self {
            Self::Valid(d) => Ok(Some(d)),
            Self::Missing => Ok(None),
            Self::Expired(d) => Err(Error::DecisionExpired {
                scope: scope.into(),
                policy: policy.into(),
                expired_at: d.expires_at.to_rfc3339(),
            }),
            Self::Mismatch { .. } => Err(Error::DecisionMismatch {
                scope: scope.into(),
                policy: policy.into(),
            }),
        }
    }
}

/// On-disk shape of `decision-store.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DecisionFile {
    pub decisions: Vec<Decision>,
}

/// Decision store for one invocation. Loaded once; every mutation re-reads the
/// file under its lock, applies the change, persists atomically, and audits.
pub struct DecisionStore<'a> {
    path: PathBuf,
    audit: &'a AuditLog,
    lock_wait: Duration,
    decisions: Vec<Decision>,
}

impl<'a> DecisionStore<'a> {
    pub fn open(path: impl AsRef<Path>, audit: &'a AuditLog) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let decisions = read_json_opt::<DecisionFile>(&path)?
            .unwrap_or_default()
            .decisions;
        debug!(path = %path.display(), count = decisions.len(), "decision store loaded");
        Ok(Self {
            path,
            audit,
            lock_wait: DEFAULT_LOCK_WAIT,
            decisions,
        })
    }

    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All decisions, oldest first.
    pub fn list(&self) -> Vec<&Decision> {
        let mut all: Vec<&Decision> = self.decisions.iter().collect();
        all.sort_by_key(|d| d.decided_at);
        all
    }

    pub fn get(&self, id: &str) -> Option<&Decision> {
        self.decisions.iter().find(|d| d.id == id)
    }

    pub fn record(
        &mut self,
        scope: &str,
        policy: &str,
        severity: Severity,
        context: &Value,
    ) -> Result<Decision> {
        self.record_at(Utc::now(), scope, policy, severity, context)
    }

    pub fn record_at(
        &mut self,
        now: DateTime<Utc>,
        scope: &str,
        policy: &str,
        severity: Severity,
        context: &Value,
    ) -> Result<Decision> {
        let decision = Decision {
            id: uuid::Uuid::new_v4().to_string(),
            scope: scope.to_string(),
            policy: policy.to_string(),
            severity,
            context_hash: context_hash(scope, policy, severity, context),
            decided_at: now,
            expires_at: now + severity.ttl(),
            renewal_count: 0,
            renewed_at: None,
        };

        let snapshot = decision.clone();
        self.mutate(DECISION_RECORDED, &decision, move |all| {
            all.push(snapshot);
            Ok(())
        })?;
        info!(id = %decision.id, scope, policy, %severity, "decision recorded");
        Ok(decision)
    }

    pub fn lookup(&self, scope: &str, policy: &str, context: &Value) -> Option<Decision> {
        self.check_at(Utc::now(), scope, policy, None, context).into_decision()
    }

    pub fn lookup_with_severity(
        &self,
        scope: &str,
        policy: &str,
        severity: Severity,
        context: &Value,
    ) -> Option<Decision> {
        self.check_at(Utc::now(), scope, policy, Some(severity), context).into_decision()
    }

    pub fn check(&self, scope: &str, policy: &str, context: &Value) -> LookupOutcome {
        self.check_at(Utc::now(), scope, policy, None, context)
    }

    /// Detailed lookup. A decision is valid only if it was recorded for this
    /// scope and policy, its stored hash equals the hash recomputed from the
    /// given context and its own severity, and `now < expiresAt`.
    pub fn check_at(
        &self,
        now: DateTime<Utc>,
        scope: &str,
        policy: &str,
        severity: Option<Severity>,
        context: &Value,
    ) -> LookupOutcome {
        let candidates: Vec<&Decision> = self
            .decisions
            .iter()
            .filter(|d| d.scope == scope && d.policy == policy)
            .collect();
        if candidates.is_empty() {
            return LookupOutcome::Missing;
        }

        let bound = candidates
            .iter()
            .filter(|d| severity.map_or(true, |s| d.severity == s))
            .filter(|d| d.binds(context))
            .max_by_key(|d| d.expires_at);

        match bound {
            Some(d) if d.is_live_at(now) => LookupOutcome::Valid((*d).clone()),
            Some(d) => LookupOutcome::Expired((*d).clone()),
            None => LookupOutcome::Mismatch {
                candidates: candidates.len(),
            },
        }
    }

    pub fn renew(&mut self, id: &str) -> Result<Decision> {
        self.renew_at(Utc::now(), id)
    }

    /// Extend a decision from `now`. Refused, without mutation, after
    /// `MAX_RENEWALS` renewals; the caller must record a fresh decision.
    pub fn renew_at(&mut self, now: DateTime<Utc>, id: &str) -> Result<Decision> {
        self.refresh()?;
        let current = self
            .get(id)
            .cloned()
            .ok_or_else(|| Error::DecisionNotFound(id.to_string()))?;

        if current.renewal_count >= MAX_RENEWALS {
            warn!(id, renewals = current.renewal_count, "renewal refused");
            self.audit.append(
                DECISION_RENEWAL_REFUSED,
                json!({"id": id, "renewalCount": current.renewal_count, "limit": MAX_RENEWALS}),
            )?;
            return Err(Error::RenewalLimit {
                id: id.to_string(),
                count: current.renewal_count,
            });
        }

        let mut renewed = current;
        renewed.renewal_count += 1;
        renewed.renewed_at = Some(now);
        renewed.expires_at = now + renewed.severity.ttl();

        let snapshot = renewed.clone();
        self.mutate(DECISION_RENEWED, &renewed, move |all| {
            match all.iter_mut().find(|d| d.id == snapshot.id) {
                Some(slot) => {
                    *slot = snapshot;
                    Ok(())
                }
                None => Err(Error::DecisionNotFound(snapshot.id)),
            }
        })?;
        info!(id, renewals = renewed.renewal_count, "decision renewed");
        Ok(renewed)
    }

    /// Reload from disk (another session may have written since open).
    pub fn refresh(&mut self) -> Result<()> {
        self.decisions = read_json_opt::<DecisionFile>(&self.path)?
            .unwrap_or_default()
            .decisions;
        Ok(())
    }

    fn mutate(
        &mut self,
        event_type: &str,
        decision: &Decision,
        change: impl FnOnce(&mut Vec<Decision>) -> Result<()>,
    ) -> Result<()> {
        let _lock = FileLock::acquire(&self.path, self.lock_wait)?;
        let mut file = read_json_opt::<DecisionFile>(&self.path)?.unwrap_or_default();
        let previous = file.decisions.iter().find(|d| d.id == decision.id).cloned();
        change(&mut file.decisions)?;

        // Event first: the store never holds a decision the log does not.
        let event = self.audit.append(event_type, json!({ "decision": decision }))?;
        if let Err(e) = write_json_atomic(&self.path, &file) {
            warn!(id = %decision.id, error = %e, "decision store write failed after audit");
            self.audit.append(
                DECISION_WRITE_FAILED,
                json!({"id": decision.id, "seq": event.seq, "previous": previous}),
            )?;
            return Err(e);
        }
        self.decisions = file.decisions;
        Ok(())
    }
}
