//! Gate orchestration for one stage invocation.
//!
//! Order of business:
//! 1. protected branch: the stage is blocked before any check runs
//! 2. every configured check runs (concurrently, or one by one with `failFast`)
//! 3. a failed check gets one remediation cycle
//! 4. a blocked check named in `--override` passes only with a live decision
//!
//! Check tasks never touch the audit log. They send transitions over a channel
//! and the engine is the only writer.

use crate::commit;
use crate::remediation::{Remediation, StepRecord};
use crate::settings::GateSettings;
use crate::stage::{CheckStatus, GateCheckResult, Stage};
use crate::tool::Tool;
use crate::toolchain::{CheckOutcome, Toolchain};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use steward_core::{AuditLog, Error, Result};
use steward_decisions::{DecisionStore, LookupOutcome};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub const GATE_CHECK_TRANSITION: &str = "gate.check.transition";
pub const GATE_STAGE_VERDICT: &str = "gate.stage.verdict";
pub const GATE_OVERRIDE_REFUSED: &str = "gate.override.refused";

pub const OVERRIDE_POLICY: &str = "override";
pub const PROTECTED_BRANCH_REASON: &str = "protected-branch";

pub fn override_scope(stage: Stage, tool: Tool) -> String {
    format!("gate:{stage}:{tool}")
}

pub fn override_context(stage: Stage, tool: Tool) -> Value {
    json!({"check": tool.name(), "stage": stage.name()})
}

/// The exact command that records an accepted risk for `tool` at `stage`.
pub fn accept_command(stage: Stage, tool: Tool) -> String {
    format!(
        "steward decision accept --scope {} --policy {OVERRIDE_POLICY} --severity high --context '{}'",
        override_scope(stage, tool),
        override_context(stage, tool)
    )
}

#[derive(Clone, Debug)]
pub struct GateRequest {
    pub stage: Stage,
    pub branch: String,
    pub commit_message: Option<String>,
    pub overrides: Vec<Tool>,
}

impl GateRequest {
    pub fn new(stage: Stage, branch: impl Into<String>) -> Self {
        Self {
            stage,
            branch: branch.into(),
            commit_message: None,
            overrides: Vec::new(),
        }
    }

    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = Some(message.into());
        self
    }

    pub fn with_override(mut self, tool: Tool) -> Self {
        self.overrides.push(tool);
        self
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Passed,
    Blocked,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: Stage,
    pub branch: String,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub checks: Vec<GateCheckResult>,
    pub not_run: Vec<Tool>,
    pub messages: Vec<String>,
    pub seq: u64,
}

impl StageReport {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }

    pub fn remediation_attempts(&self) -> usize {
        self.checks.iter().filter(|c| c.remediation_attempted).count()
    }

    /// The blocking error for a blocked stage, carrying the remediation message.
    pub fn into_result(self) -> Result<StageReport> {
        if self.passed() {
            return Ok(self);
        }
        if self.reason.as_deref() == Some(PROTECTED_BRANCH_REASON) {
            return Err(Error::ProtectedBranchViolation {
                branch: self.branch,
                stage: self.stage.to_string(),
            });
        }
        let check = self
            .checks
            .iter()
            .find(|c| !c.status.is_pass())
            .map(|c| c.check_name.clone())
            .unwrap_or_default();
        Err(Error::gate_failure(
            check,
            self.stage.name(),
            self.messages.join("\n"),
        ))
    }
}

#[derive(Debug)]
struct Transition {
    tool: Tool,
    from: CheckStatus,
    to: CheckStatus,
    detail: Value,
}

pub struct GateEngine<'a> {
    toolchain: Arc<dyn Toolchain>,
    settings: GateSettings,
    audit: &'a AuditLog,
    decisions: &'a DecisionStore<'a>,
}

impl<'a> GateEngine<'a> {
    pub fn new(
        toolchain: Arc<dyn Toolchain>,
        settings: GateSettings,
        audit: &'a AuditLog,
        decisions: &'a DecisionStore<'a>,
    ) -> Self {
        Self {
            toolchain,
            settings,
            audit,
            decisions,
        }
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    pub async fn run(&self, request: GateRequest) -> Result<StageReport> {
        let stage = request.stage;
        info!(%stage, branch = %request.branch, "gate stage");

        if self.settings.is_protected(&request.branch) {
            warn!(%stage, branch = %request.branch, "protected branch, stage blocked");
            let event = self.audit.append(
                GATE_STAGE_VERDICT,
                json!({
                    "stage": stage,
                    "branch": request.branch,
                    "verdict": Verdict::Blocked,
                    "reason": PROTECTED_BRANCH_REASON,
                    "checks": []
                }),
            )?;
            return Ok(StageReport {
                stage,
                messages: vec![format!(
                    "{stage} is not allowed on protected branch {}; switch to a feature branch",
                    request.branch
                )],
                branch: request.branch,
                verdict: Verdict::Blocked,
                reason: Some(PROTECTED_BRANCH_REASON.to_string()),
                checks: Vec::new(),
                not_run: Vec::new(),
                seq: event.seq,
            });
        }

        let checks = self.settings.checks_for(stage).to_vec();
        let message: Option<Arc<str>> = request.commit_message.as_deref().map(Arc::from);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut finished: Vec<(Tool, GateCheckResult)> = Vec::with_capacity(checks.len());
        let mut not_run = Vec::new();
        let mut messages = Vec::new();

        if self.settings.fail_fast {
            for (i, tool) in checks.iter().enumerate() {
                let mut result = run_check(
                    self.toolchain.clone(),
                    *tool,
                    stage,
                    message.clone(),
                    self.settings.remediation,
                    tx.clone(),
                )
                .await;
                self.drain(&mut rx, stage)?;
                self.settle(&request, *tool, &mut result, &mut messages)?;
                let blocked = !result.status.is_pass();
                finished.push((*tool, result));
                if blocked {
                    not_run = checks[i + 1..].to_vec();
                    break;
                }
            }
            drop(tx);
        } else {
            let mut set = JoinSet::new();
            for (i, tool) in checks.iter().enumerate() {
                let task = run_check(
                    self.toolchain.clone(),
                    *tool,
                    stage,
                    message.clone(),
                    self.settings.remediation,
                    tx.clone(),
                );
                set.spawn(async move { (i, task.await) });
            }
            drop(tx);

            // Closes once every task has dropped its sender.
            while let Some(transition) = rx.recv().await {
                self.write_transition(stage, &transition)?;
            }

            let mut indexed = Vec::with_capacity(checks.len());
            while let Some(joined) = set.join_next().await {
                let (i, result) = joined.map_err(|e| {
                    Error::gate_failure("engine", stage.name(), format!("check task failed: {e}"))
                })?;
                indexed.push((i, result));
            }
            indexed.sort_by_key(|(i, _)| *i);
            for (i, mut result) in indexed {
                let tool = checks[i];
                self.settle(&request, tool, &mut result, &mut messages)?;
                finished.push((tool, result));
            }
        }

        let passed = finished.iter().all(|(_, r)| r.status.is_pass()) && not_run.is_empty();
        let verdict = if passed {
            Verdict::Passed
        } else {
            Verdict::Blocked
        };
        let checks: Vec<GateCheckResult> = finished.into_iter().map(|(_, r)| r).collect();

        let summary: Vec<Value> = checks
            .iter()
            .map(|c| {
                json!({
                    "check": c.check_name,
                    "status": c.status,
                    "remediationAttempted": c.remediation_attempted,
                    "decisionId": c.decision_id,
                })
            })
            .collect();
        let event = self.audit.append(
            GATE_STAGE_VERDICT,
            json!({
                "stage": stage,
                "branch": request.branch,
                "verdict": verdict,
                "checks": summary,
                "notRun": not_run,
            }),
        )?;
        info!(%stage, ?verdict, checks = checks.len(), "gate verdict");

        Ok(StageReport {
            stage,
            branch: request.branch,
            verdict,
            reason: None,
            checks,
            not_run,
            messages,
            seq: event.seq,
        })
    }

    /// Apply a requested override to a check that did not pass, or explain it.
    fn settle(
        &self,
        request: &GateRequest,
        tool: Tool,
        result: &mut GateCheckResult,
        messages: &mut Vec<String>,
    ) -> Result<()> {
        if result.status.is_pass() {
            return Ok(());
        }
        let stage = request.stage;
        let headline = first_line(&result.output);

        if !request.overrides.contains(&tool) {
            messages.push(format!(
                "{tool} {status} {stage}: {headline}\n  to accept the risk: {}\n  then re-run with --override {tool}",
                accept_command(stage, tool),
                status = result.status,
            ));
            return Ok(());
        }

        let scope = override_scope(stage, tool);
        let context = override_context(stage, tool);
        let refused = |reason: &str, messages: &mut Vec<String>, note: String| -> Result<()> {
            self.audit.append(
                GATE_OVERRIDE_REFUSED,
                json!({"stage": stage, "check": tool, "reason": reason}),
            )?;
            messages.push(format!(
                "override of {tool} refused ({note}); record one with: {}",
                accept_command(stage, tool)
            ));
            Ok(())
        };

        match self.decisions.check(&scope, OVERRIDE_POLICY, &context) {
            LookupOutcome::Valid(decision) => {
                // The true result stays recorded in the RUNNING->FAILED transition.
                let from = result.status;
                self.write_transition(
                    stage,
                    &Transition {
                        tool,
                        from,
                        to: CheckStatus::Overridden,
                        detail: json!({
                            "decisionId": decision.id,
                            "severity": decision.severity,
                            "expiresAt": decision.expires_at,
                        }),
                    },
                )?;
                result.status = CheckStatus::Overridden;
                result.timestamp = Utc::now();
                messages.push(format!(
                    "{tool} overridden by decision {} (expires {})",
                    decision.id,
                    decision.expires_at.to_rfc3339()
                ));
                result.decision_id = Some(decision.id);
                Ok(())
            }
            LookupOutcome::Expired(decision) => refused(
                "expired",
                messages,
                format!(
                    "decision {} expired {}",
                    decision.id,
                    decision.expires_at.to_rfc3339()
                ),
            ),
            LookupOutcome::Mismatch { .. } => {
                let detail = "decision was made for a different context".to_string();
                refused("mismatch", messages, detail)
            }
            LookupOutcome::Missing => {
                refused("missing", messages, "no accepted-risk decision".into())
            }
        }
    }

    fn drain(&self, rx: &mut UnboundedReceiver<Transition>, stage: Stage) -> Result<()> {
        while let Ok(transition) = rx.try_recv() {
            self.write_transition(stage, &transition)?;
        }
        Ok(())
    }

    fn write_transition(&self, stage: Stage, t: &Transition) -> Result<()> {
        debug!(%stage, check = %t.tool, from = %t.from, to = %t.to, "check transition");
        let mut payload = json!({
            "stage": stage,
            "check": t.tool,
            "from": t.from,
            "to": t.to,
        });
        if !t.detail.is_null() {
            payload["detail"] = t.detail.clone();
        }
        self.audit.append(GATE_CHECK_TRANSITION, payload)?;
        Ok(())
    }
}

/// Runs one check to a terminal status, reporting each transition on `tx`.
async fn run_check(
    toolchain: Arc<dyn Toolchain>,
    tool: Tool,
    stage: Stage,
    message: Option<Arc<str>>,
    remediation: bool,
    tx: UnboundedSender<Transition>,
) -> GateCheckResult {
    let send = |from, to, detail| {
        let _ = tx.send(Transition {
            tool,
            from,
            to,
            detail,
        });
    };

    send(CheckStatus::Pending, CheckStatus::Running, Value::Null);
    let first = if tool.is_builtin() {
        builtin_check(tool, message.as_deref())
    } else {
        toolchain.run_check(tool).await
    };

    if first.passed {
        send(CheckStatus::Running, CheckStatus::Passed, Value::Null);
        return result(tool, stage, CheckStatus::Passed, false, &first);
    }

    send(
        CheckStatus::Running,
        CheckStatus::Failed,
        json!({
            "exitCode": first.exit_code,
            "timedOut": first.timed_out,
            "output": first.output,
        }),
    );

    if !remediation {
        return result(tool, stage, CheckStatus::Failed, false, &first);
    }
    if tool.is_builtin() {
        // Nothing to install or configure for an in-process check.
        send(
            CheckStatus::Failed,
            CheckStatus::Blocked,
            json!({"remediation": []}),
        );
        return result(tool, stage, CheckStatus::Blocked, false, &first);
    }

    let report = Remediation::new(tool).run(toolchain.as_ref()).await;
    let steps: &[StepRecord] = &report.steps;
    if report.recovered() {
        send(
            CheckStatus::Failed,
            CheckStatus::Remediated,
            json!({"remediation": steps}),
        );
        let rerun = report.rerun.clone().unwrap_or_else(|| first.clone());
        result(tool, stage, CheckStatus::Remediated, true, &rerun)
    } else {
        send(
            CheckStatus::Failed,
            CheckStatus::Blocked,
            json!({"remediation": steps, "output": report.failure_detail()}),
        );
        let last = report.rerun.clone().unwrap_or_else(|| {
            CheckOutcome::fail(first.exit_code, report.failure_detail())
        });
        result(tool, stage, CheckStatus::Blocked, true, &last)
    }
}

fn builtin_check(tool: Tool, message: Option<&str>) -> CheckOutcome {
    match tool {
        Tool::ConventionalCommit => match message {
            Some(msg) => match commit::check_message(msg) {
                Ok(()) => CheckOutcome::pass(""),
                Err(why) => CheckOutcome::fail(Some(1), why),
            },
            None => CheckOutcome::fail(None, "no commit message supplied"),
        },
        other => CheckOutcome::fail(None, format!("{other} is not a built-in check")),
    }
}

fn result(
    tool: Tool,
    stage: Stage,
    status: CheckStatus,
    remediation_attempted: bool,
    outcome: &CheckOutcome,
) -> GateCheckResult {
    GateCheckResult {
        check_name: tool.name().to_string(),
        stage,
        status,
        remediation_attempted,
        timestamp: Utc::now(),
        exit_code: outcome.exit_code,
        output: outcome.output.clone(),
        decision_id: None,
    }
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or("check failed")
}
