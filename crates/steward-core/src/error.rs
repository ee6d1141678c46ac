//! Error types for Steward

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error in {}: {message}", path.display())]
    Configuration { path: PathBuf, message: String },

    #[error("unclassified path: {0} (no ownership rule matches and strict mode is on)")]
    UnclassifiedPath(String),

    #[error("ownership violation: {action} on {path} is not permitted for tier {tier}")]
    OwnershipViolation {
        path: String,
        tier: String,
        action: String,
    },

    #[error("merge conflict: {count} path(s) diverged locally and need manual resolution: {}", paths.join(", "))]
    MergeConflict { count: usize, paths: Vec<String> },

    #[error("decision expired: {scope}/{policy} (expired {expired_at})")]
    DecisionExpired {
        scope: String,
        policy: String,
        expired_at: String,
    },

    #[error("decision mismatch: {scope}/{policy} was decided for a different context")]
    DecisionMismatch { scope: String, policy: String },

    #[error("renewal limit reached for decision {id}: {count} renewals, record a fresh decision")]
    RenewalLimit { id: String, count: u32 },

    #[error("decision not found: {0}")]
    DecisionNotFound(String),

    #[error("gate check failed: {check} at {stage} - {message}")]
    GateCheckFailure {
        check: String,
        stage: String,
        message: String,
    },

    #[error("protected branch: {stage} on {branch} is blocked")]
    ProtectedBranchViolation { branch: String, stage: String },

    #[error("lock timeout: could not lock {} within {waited_ms}ms", path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("audit write failed for {}: {source}", path.display())]
    AuditWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("audit log corrupt at line {line}: {message}")]
    AuditCorrupt { line: usize, message: String },

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Configuration {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn ownership_violation(
        path: impl Into<String>,
        tier: impl std::fmt::Display,
        action: impl Into<String>,
    ) -> Self {
        Self::OwnershipViolation {
            path: path.into(),
            tier: tier.to_string(),
            action: action.into(),
        }
    }

    pub fn gate_failure(
        check: impl Into<String>,
        stage: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::GateCheckFailure {
            check: check.into(),
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error when it reaches the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::ProtectedBranchViolation { .. } | Self::GateCheckFailure { .. } => 2,
            Self::MergeConflict { .. } => 3,
            _ => 1,
        }
    }

    /// Errors that only mean "ask again": the caller re-prompts instead of aborting.
    pub fn is_reprompt(&self) -> bool {
        matches!(self, Self::DecisionExpired { .. } | Self::DecisionMismatch { .. })
    }
}
