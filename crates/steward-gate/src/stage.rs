//! Git lifecycle stages and per-check status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    PreCommit,
    CommitMsg,
    PrePush,
}

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[Stage::PreCommit, Stage::CommitMsg, Stage::PrePush]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::PreCommit => "pre-commit",
            Stage::CommitMsg => "commit-msg",
            Stage::PrePush => "pre-push",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre-commit" => Ok(Stage::PreCommit),
            "commit-msg" => Ok(Stage::CommitMsg),
            "pre-push" => Ok(Stage::PrePush),
            _ => Err(format!(
                "unknown stage: {s} (expected pre-commit, commit-msg or pre-push)"
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Remediated,
    Blocked,
    Overridden,
}

impl CheckStatus {
    /// The stage may proceed past a check in this status.
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Passed | Self::Remediated | Self::Overridden)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Remediated => "REMEDIATED",
            Self::Blocked => "BLOCKED",
            Self::Overridden => "OVERRIDDEN",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one check in one invocation. Only ever surfaced through audit events.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GateCheckResult {
    pub check_name: String,
    pub stage: Stage,
    pub status: CheckStatus,
    pub remediation_attempted: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<String>,
}
