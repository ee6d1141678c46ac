//! Core types for Steward

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Ownership tier of a repository path.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Framework,
    Team,
    Project,
    System,
}

impl Tier {
    pub fn all() -> &'static [Tier] {
        &[Tier::Framework, Tier::Team, Tier::Project, Tier::System]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tier::Framework => "framework",
            Tier::Team => "team",
            Tier::Project => "project",
            Tier::System => "system",
        }
    }

    /// Tie-break rank when two rules are equally specific: system > project > team > framework.
    pub fn precedence(&self) -> u8 {
        match self {
            Tier::Framework => 0,
            Tier::Team => 1,
            Tier::Project => 2,
            Tier::System => 3,
        }
    }

    /// Team and project files belong to people, not to the framework.
    pub fn is_user_owned(&self) -> bool {
        matches!(self, Tier::Team | Tier::Project)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "framework" => Ok(Tier::Framework),
            "team" => Ok(Tier::Team),
            "project" => Ok(Tier::Project),
            "system" => Ok(Tier::System),
            _ => Err(format!("unknown tier: {s}")),
        }
    }
}

/// Severity of a risk decision. Drives decision lifetime.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    pub fn ttl_days(&self) -> i64 {
        match self {
            Severity::Critical => 15,
            Severity::High => 30,
            Severity::Medium => 60,
            Severity::Low => 90,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::days(self.ttl_days())
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}
