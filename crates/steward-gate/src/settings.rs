//! Gate settings read from the resolved standards.
//!
//! Keys (all optional):
//! - `gates.protectedBranches`: list, default `["main", "master"]`
//! - `gates.stages.<stage>`: list of tool names, default from the detected stack
//! - `gates.checkTimeoutSecs`: default 300
//! - `gates.failFast`: default false
//! - `gates.remediation`: default true

use crate::stage::Stage;
use crate::tool::{Stack, Tool};
use std::collections::BTreeMap;
use std::time::Duration;
use steward_core::{Error, Result};
use steward_standards::Resolution;

pub const DEFAULT_PROTECTED_BRANCHES: &[&str] = &["main", "master"];
pub const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 300;

#[derive(Clone, Debug, PartialEq)]
pub struct GateSettings {
    pub protected_branches: Vec<String>,
    pub stages: BTreeMap<Stage, Vec<Tool>>,
    pub check_timeout: Duration,
    pub fail_fast: bool,
    pub remediation: bool,
}

impl GateSettings {
    /// Defaults for `stack` with no standards applied.
    pub fn defaults(stack: Stack) -> Self {
        Self {
            protected_branches: DEFAULT_PROTECTED_BRANCHES.iter().map(|b| b.to_string()).collect(),
            stages: Stage::all().iter().map(|s| (*s, stack.default_checks(*s))).collect(),
            check_timeout: Duration::from_secs(DEFAULT_CHECK_TIMEOUT_SECS),
            fail_fast: false,
            remediation: true,
        }
    }

    pub fn from_resolution(resolution: &Resolution, stack: Stack) -> Result<Self> {
        let mut settings = Self::defaults(stack);

        if let Some(branches) = resolution.get_str_list("gates.protectedBranches") {
            settings.protected_branches = dedup(branches);
        }
        for stage in Stage::all() {
            let key = format!("gates.stages.{stage}");
            let Some(names) = resolution.get_str_list(&key) else { continue };
            let mut tools = Vec::with_capacity(names.len());
            for name in dedup(names) {
                let tool = name.parse::<Tool>().map_err(|msg| {
                    Error::config(
                        format!("standards:{}", resolution.attribution(&key).unwrap_or("?")),
                        format!("{key}: {msg}"),
                    )
                })?;
                tools.push(tool);
            }
            settings.stages.insert(*stage, tools);
        }
        if let Some(secs) = resolution.get_u64("gates.checkTimeoutSecs") {
            settings.check_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(fail_fast) = resolution.get_bool("gates.failFast") {
            settings.fail_fast = fail_fast;
        }
        if let Some(remediation) = resolution.get_bool("gates.remediation") {
            settings.remediation = remediation;
        }
        Ok(settings)
    }

    pub fn checks_for(&self, stage: Stage) -> &[Tool] {
        self.stages.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_protected(&self, branch: &str) -> bool {
        self.protected_branches.iter().any(|b| b == branch)
    }
}

/// Lists concatenate across layers, so the same name can arrive twice.
fn dedup(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
