//! One bounded remediation cycle for a failed check:
//! detect, install if missing, configure, re-run.

use crate::tool::Tool;
use crate::toolchain::{CheckOutcome, Toolchain};
use serde::Serialize;
use tracing::{debug, info};

/// Re-runs allowed per failed check.
pub const MAX_REMEDIATION_ATTEMPTS: u32 = 1;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemediationStep {
    Detect,
    Install,
    Configure,
    Rerun,
    Done,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step: RemediationStep,
    pub ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RemediationReport {
    pub steps: Vec<StepRecord>,
    pub attempts: u32,
    /// Outcome of the re-run, if the cycle got that far.
    pub rerun: Option<CheckOutcome>,
}

impl RemediationReport {
    pub fn recovered(&self) -> bool {
        self.rerun.as_ref().is_some_and(|o| o.passed)
    }

    /// What to show the user when the cycle did not recover the check.
    pub fn failure_detail(&self) -> String {
        if let Some(rerun) = &self.rerun {
            return rerun.output.clone();
        }
        self.steps
            .iter()
            .rev()
            .find(|s| !s.ok)
            .map(|s| s.detail.clone())
            .unwrap_or_default()
    }
}

pub struct Remediation {
    tool: Tool,
    step: RemediationStep,
    attempts: u32,
    steps: Vec<StepRecord>,
    rerun: Option<CheckOutcome>,
}

impl Remediation {
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            step: RemediationStep::Detect,
            attempts: 0,
            steps: Vec::new(),
            rerun: None,
        }
    }

    pub async fn run(mut self, toolchain: &dyn Toolchain) -> RemediationReport {
        loop {
            self.step = match self.step {
                RemediationStep::Detect => {
                    let present = toolchain.detect(self.tool).await;
                    let detail = if present { "present" } else { "missing" };
                    self.record(RemediationStep::Detect, true, detail);
                    if present {
                        RemediationStep::Configure
                    } else {
                        RemediationStep::Install
                    }
                }
                RemediationStep::Install => {
                    info!(tool = %self.tool, "installing missing gate tool");
                    let out = toolchain.install(self.tool).await;
                    let next = if out.passed {
                        RemediationStep::Configure
                    } else {
                        RemediationStep::Done
                    };
                    self.record(RemediationStep::Install, out.passed, out.output);
                    next
                }
                RemediationStep::Configure => {
                    if self.tool.configure_command().is_some() {
                        let out = toolchain.configure(self.tool).await;
                        let next = if out.passed {
                            RemediationStep::Rerun
                        } else {
                            RemediationStep::Done
                        };
                        self.record(RemediationStep::Configure, out.passed, out.output);
                        next
                    } else {
                        RemediationStep::Rerun
                    }
                }
                RemediationStep::Rerun if self.attempts < MAX_REMEDIATION_ATTEMPTS => {
                    self.attempts += 1;
                    let out = toolchain.run_check(self.tool).await;
                    self.record(RemediationStep::Rerun, out.passed, String::new());
                    self.rerun = Some(out);
                    RemediationStep::Done
                }
                RemediationStep::Rerun | RemediationStep::Done => break,
            };
            debug!(tool = %self.tool, step = ?self.step, "remediation step");
        }

        RemediationReport {
            steps: self.steps,
            attempts: self.attempts,
            rerun: self.rerun,
        }
    }

    fn record(&mut self, step: RemediationStep, ok: bool, detail: impl Into<String>) {
        self.steps.push(StepRecord {
            step,
            ok,
            detail: detail.into(),
        });
    }
}
