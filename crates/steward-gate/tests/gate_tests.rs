//! Tests for steward-gate: protected branches, remediation, overrides, audit trail

use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use steward_core::{AuditEvent, AuditLog, Error, Severity};
use steward_decisions::DecisionStore;
use steward_gate::*;
use tempfile::TempDir;

/// Scripted toolchain: each tool's check results are popped in order,
/// the last one repeats.
#[derive(Default)]
struct FakeToolchain {
    results: Mutex<HashMap<Tool, Vec<bool>>>,
    missing: Mutex<Vec<Tool>>,
    hangs: Mutex<Vec<Tool>>,
    delay: Option<Duration>,
    runs: AtomicU32,
    installs: AtomicU32,
}

impl FakeToolchain {
    fn with(mut self, tool: Tool, results: &[bool]) -> Self {
        self.results.get_mut().unwrap().insert(tool, results.to_vec());
        self
    }

    fn missing(self, tool: Tool) -> Self {
        self.missing.lock().unwrap().push(tool);
        self
    }

    /// The next run of `tool` times out; later runs follow the script.
    fn hangs_once(self, tool: Tool) -> Self {
        self.hangs.lock().unwrap().push(tool);
        self
    }
}

#[async_trait::async_trait]
impl Toolchain for FakeToolchain {
    async fn run_check(&self, tool: Tool) -> CheckOutcome {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        {
            let mut hangs = self.hangs.lock().unwrap();
            if let Some(i) = hangs.iter().position(|t| *t == tool) {
                hangs.remove(i);
                return CheckOutcome::timeout(Duration::from_secs(300));
            }
        }
        let passed = {
            let mut results = self.results.lock().unwrap();
            let script = results.entry(tool).or_insert_with(|| vec![true]);
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0]
            }
        };
        if passed {
            CheckOutcome::pass("ok")
        } else {
            CheckOutcome::fail(Some(1), format!("{tool} found problems"))
        }
    }

    async fn detect(&self, tool: Tool) -> bool {
        !self.missing.lock().unwrap().contains(&tool)
    }

    async fn install(&self, tool: Tool) -> CheckOutcome {
        self.installs.fetch_add(1, Ordering::SeqCst);
        self.missing.lock().unwrap().retain(|t| *t != tool);
        CheckOutcome::pass("installed")
    }

    async fn configure(&self, _tool: Tool) -> CheckOutcome {
        CheckOutcome::pass("")
    }
}

struct Fixture {
    _dir: TempDir,
    audit: AuditLog,
    decisions_path: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    Fixture {
        audit: AuditLog::open(dir.path().join("audit-log.ndjson"), "tester"),
        decisions_path: dir.path().join("decision-store.json"),
        _dir: dir,
    }
}

fn settings(stage: Stage, tools: &[Tool]) -> GateSettings {
    let mut s = GateSettings::defaults(Stack::Generic);
    s.stages.insert(stage, tools.to_vec());
    s
}

fn events_of(audit: &AuditLog, event_type: &str) -> Vec<AuditEvent> {
    audit.events().unwrap().into_iter().filter(|e| e.event_type == event_type).collect()
}

fn transitions(audit: &AuditLog, check: &str) -> Vec<(String, String)> {
    events_of(audit, GATE_CHECK_TRANSITION)
        .into_iter()
        .filter(|e| e.payload["check"] == check)
        .map(|e| {
            (
                e.payload["from"].as_str().unwrap().to_string(),
                e.payload["to"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
}

// ===========================================================================
// Protected branches
// ===========================================================================

#[tokio::test]
async fn push_to_main_is_blocked_without_remediation() {
    let fx = fixture();
    let store = DecisionStore::open(&fx.decisions_path, &fx.audit).unwrap();
    let tc = Arc::new(FakeToolchain::default().with(Tool::Semgrep, &[false]));
    let engine = GateEngine::new(
        tc.clone(),
        settings(Stage::PrePush, &[Tool::Semgrep]),
        &fx.audit,
        &store,
    );

    let report = engine.run(GateRequest::new(Stage::PrePush, "main")).await.unwrap();
    assert_eq!(report.verdict, Verdict::Blocked);
    assert_eq!(report.reason.as_deref(), Some(PROTECTED_BRANCH_REASON));
    assert_eq!(report.remediation_attempts(), 0);
    assert!(report.checks.is_empty());
    assert_eq!(tc.runs.load(Ordering::SeqCst), 0);

    let events = fx.audit.events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, GATE_STAGE_VERDICT);
    assert_eq!(events[0].payload["reason"], "protected-branch");
    assert_eq!(events[0].payload["checks"], json!([]));

    let err = report.into_result().unwrap_err();
    assert!(matches!(err, Error::ProtectedBranchViolation { .. }));
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn protected_branch_list_comes_from_settings() {
    let fx = fixture();
    let store = DecisionStore::open(&fx.decisions_path, &fx.audit).unwrap();
    let mut s = settings(Stage::PrePush, &[]);
    s.protected_branches = vec!["release".into()];
    let engine = GateEngine::new(Arc::new(FakeToolchain::default()), s, &fx.audit, &store);

    assert!(engine.run(GateRequest::new(Stage::PrePush, "main")).await.unwrap().passed());
    assert!(!engine.run(GateRequest::new(Stage::PrePush, "release")).await.unwrap().passed());
}

// ===========================================================================
// Checks + remediation
// ===========================================================================

#[tokio::test]
async fn passing_checks_pass_the_stage() {
    let fx = fixture();
    let store = DecisionStore::open(&fx.decisions_path, &fx.audit).unwrap();
    let engine = GateEngine::new(
        Arc::new(FakeToolchain::default()),
        settings(Stage::PreCommit, &[Tool::Gitleaks, Tool::Ruff]),
        &fx.audit,
        &store,
    );
    let report = engine.run(GateRequest::new(Stage::PreCommit, "feature/x")).await.unwrap();
    assert!(report.passed());
    assert!(report.checks.iter().all(|c| c.status == CheckStatus::Passed));
    assert_eq!(
        transitions(&fx.audit, "gitleaks"),
        pairs(&[("PENDING", "RUNNING"), ("RUNNING", "PASSED")])
    );

    // Transitions plus one verdict, nothing else.
    assert_eq!(fx.audit.events().unwrap().len(), 5);
    let verdict = events_of(&fx.audit, GATE_STAGE_VERDICT).pop().unwrap();
    assert_eq!(verdict.payload["verdict"], "passed");
    assert_eq!(verdict.seq, report.seq);
}

#[tokio::test]
async fn missing_tool_is_installed_and_remediated() {
    let fx = fixture();
    let store = DecisionStore::open(&fx.decisions_path, &fx.audit).unwrap();
    let tc = Arc::new(
        FakeToolchain::default()
            .with(Tool::Gitleaks, &[false, true])
            .missing(Tool::Gitleaks),
    );
    let engine = GateEngine::new(
        tc.clone(),
        settings(Stage::PreCommit, &[Tool::Gitleaks]),
        &fx.audit,
        &store,
    );

    let report = engine.run(GateRequest::new(Stage::PreCommit, "feature/x")).await.unwrap();
    assert!(report.passed());
    assert_eq!(report.checks[0].status, CheckStatus::Remediated);
    assert!(report.checks[0].remediation_attempted);
    assert_eq!(tc.installs.load(Ordering::SeqCst), 1);
    assert_eq!(
        transitions(&fx.audit, "gitleaks"),
        pairs(&[("PENDING", "RUNNING"), ("RUNNING", "FAILED"), ("FAILED", "REMEDIATED")])
    );
}

#[tokio::test]
async fn persistent_failure_blocks_after_one_rerun() {
    let fx = fixture();
    let store = DecisionStore::open(&fx.decisions_path, &fx.audit).unwrap();
    let tc = Arc::new(FakeToolchain::default().with(Tool::CargoAudit, &[false]));
    let engine = GateEngine::new(
        tc.clone(),
        settings(Stage::PrePush, &[Tool::CargoAudit]),
        &fx.audit,
        &store,
    );

    let report = engine.run(GateRequest::new(Stage::PrePush, "feature/x")).await.unwrap();
    assert_eq!(report.verdict, Verdict::Blocked);
    assert_eq!(report.checks[0].status, CheckStatus::Blocked);
    assert_eq!(tc.runs.load(Ordering::SeqCst), 2);
    let hint = "steward decision accept --scope gate:pre-push:cargo-audit";
    assert!(report.messages[0].contains(hint));

    let err = report.into_result().unwrap_err();
    assert!(matches!(err, Error::GateCheckFailure { ref check, .. } if check == "cargo-audit"));
}

#[tokio::test]
async fn timed_out_check_fails_then_remediates() {
    let fx = fixture();
    let store = DecisionStore::open(&fx.decisions_path, &fx.audit).unwrap();
    let tc = Arc::new(FakeToolchain::default().hangs_once(Tool::Semgrep));
    let engine = GateEngine::new(
        tc.clone(),
        settings(Stage::PrePush, &[Tool::Semgrep]),
        &fx.audit,
        &store,
    );

    let report = engine.run(GateRequest::new(Stage::PrePush, "feature/x")).await.unwrap();
    assert!(report.passed());
    assert_eq!(report.checks[0].status, CheckStatus::Remediated);
    assert_eq!(tc.runs.load(Ordering::SeqCst), 2);
    assert_eq!(
        transitions(&fx.audit, "semgrep"),
        pairs(&[("PENDING", "RUNNING"), ("RUNNING", "FAILED"), ("FAILED", "REMEDIATED")])
    );
    let failed = events_of(&fx.audit, GATE_CHECK_TRANSITION)
        .into_iter()
        .find(|e| e.payload["to"] == "FAILED")
        .unwrap();
    assert_eq!(failed.payload["detail"]["timedOut"], true);
}

#[tokio::test]
async fn timed_out_check_that_keeps_failing_blocks() {
    let fx = fixture();
    let store = DecisionStore::open(&fx.decisions_path, &fx.audit).unwrap();
    let tc = Arc::new(
        FakeToolchain::default()
            .with(Tool::Pytest, &[false])
            .hangs_once(Tool::Pytest),
    );
    let engine = GateEngine::new(tc, settings(Stage::PrePush, &[Tool::Pytest]), &fx.audit, &store);

    let report = engine.run(GateRequest::new(Stage::PrePush, "feature/x")).await.unwrap();
    assert_eq!(report.verdict, Verdict::Blocked);
    assert_eq!(
        transitions(&fx.audit, "pytest"),
        pairs(&[("PENDING", "RUNNING"), ("RUNNING", "FAILED"), ("FAILED", "BLOCKED")])
    );
}

#[tokio::test]
async fn remediation_disabled_ends_failed() {
    let fx = fixture();
    let store = DecisionStore::open(&fx.decisions_path, &fx.audit).unwrap();
    let tc = Arc::new(FakeToolchain::default().with(Tool::Ruff, &[false, true]));
    let mut s = settings(Stage::PreCommit, &[Tool::Ruff]);
    s.remediation = false;
    let engine = GateEngine::new(tc.clone(), s, &fx.audit, &store);

    let report = engine.run(GateRequest::new(Stage::PreCommit, "feature/x")).await.unwrap();
    assert_eq!(report.checks[0].status, CheckStatus::Failed);
    assert!(!report.passed());
    assert_eq!(tc.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn commit_message_is_checked_in_process() {
    let fx = fixture();
    let store = DecisionStore::open(&fx.decisions_path, &fx.audit).unwrap();
    let tc = Arc::new(FakeToolchain::default());
    let engine = GateEngine::new(
        tc.clone(),
        settings(Stage::CommitMsg, &[Tool::ConventionalCommit]),
        &fx.audit,
        &store,
    );

    let ok = engine
        .run(
            GateRequest::new(Stage::CommitMsg, "feature/x")
                .with_commit_message("feat(gate): add engine\n"),
        )
        .await
        .unwrap();
    assert!(ok.passed());

    let bad = engine
        .run(GateRequest::new(Stage::CommitMsg, "feature/x").with_commit_message("stuff"))
        .await
        .unwrap();
    assert_eq!(bad.checks[0].status, CheckStatus::Blocked);
    assert!(!bad.checks[0].remediation_attempted);
    assert_eq!(tc.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn checks_run_concurrently_and_report_in_config_order() {
    let fx = fixture();
    let store = DecisionStore::open(&fx.decisions_path, &fx.audit).unwrap();
    let tc = Arc::new(FakeToolchain {
        delay: Some(Duration::from_millis(200)),
        ..Default::default()
    });
    let tools = [Tool::Gitleaks, Tool::Semgrep, Tool::Ruff, Tool::Pytest];
    let engine = GateEngine::new(tc, settings(Stage::PrePush, &tools), &fx.audit, &store);

    let started = std::time::Instant::now();
    let report = engine.run(GateRequest::new(Stage::PrePush, "feature/x")).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(700));
    let names: Vec<_> = report.checks.iter().map(|c| c.check_name.as_str()).collect();
    assert_eq!(names, vec!["gitleaks", "semgrep", "ruff", "pytest"]);
}

#[tokio::test]
async fn fail_fast_stops_after_first_block() {
    let fx = fixture();
    let store = DecisionStore::open(&fx.decisions_path, &fx.audit).unwrap();
    let tc = Arc::new(FakeToolchain::default().with(Tool::Semgrep, &[false]));
    let mut s = settings(Stage::PrePush, &[Tool::Gitleaks, Tool::Semgrep, Tool::Ruff]);
    s.fail_fast = true;
    let engine = GateEngine::new(tc, s, &fx.audit, &store);

    let report = engine.run(GateRequest::new(Stage::PrePush, "feature/x")).await.unwrap();
    assert_eq!(report.checks.len(), 2);
    assert_eq!(report.not_run, vec![Tool::Ruff]);
    assert!(transitions(&fx.audit, "ruff").is_empty());
    let verdict = events_of(&fx.audit, GATE_STAGE_VERDICT).pop().unwrap();
    assert_eq!(verdict.payload["notRun"], json!(["ruff"]));
}

// ===========================================================================
// Overrides
// ===========================================================================

#[tokio::test]
async fn override_with_live_decision_passes_and_keeps_true_result() {
    let fx = fixture();
    let mut store = DecisionStore::open(&fx.decisions_path, &fx.audit).unwrap();
    let d = store
        .record(
            &override_scope(Stage::PrePush, Tool::CargoAudit),
            OVERRIDE_POLICY,
            Severity::High,
            &override_context(Stage::PrePush, Tool::CargoAudit),
        )
        .unwrap();

    let tc = Arc::new(FakeToolchain::default().with(Tool::CargoAudit, &[false]));
    let engine = GateEngine::new(
        tc,
        settings(Stage::PrePush, &[Tool::CargoAudit]),
        &fx.audit,
        &store,
    );
    let report = engine
        .run(GateRequest::new(Stage::PrePush, "feature/x").with_override(Tool::CargoAudit))
        .await
        .unwrap();

    assert!(report.passed());
    assert_eq!(report.checks[0].status, CheckStatus::Overridden);
    assert_eq!(report.checks[0].decision_id.as_deref(), Some(d.id.as_str()));
    assert_eq!(
        transitions(&fx.audit, "cargo-audit"),
        pairs(&[
            ("PENDING", "RUNNING"),
            ("RUNNING", "FAILED"),
            ("FAILED", "BLOCKED"),
            ("BLOCKED", "OVERRIDDEN"),
        ])
    );
}

#[tokio::test]
async fn override_without_decision_stays_blocked() {
    let fx = fixture();
    let store = DecisionStore::open(&fx.decisions_path, &fx.audit).unwrap();
    let tc = Arc::new(FakeToolchain::default().with(Tool::Gitleaks, &[false]));
    let engine = GateEngine::new(
        tc,
        settings(Stage::PreCommit, &[Tool::Gitleaks]),
        &fx.audit,
        &store,
    );

    let report = engine
        .run(GateRequest::new(Stage::PreCommit, "feature/x").with_override(Tool::Gitleaks))
        .await
        .unwrap();
    assert_eq!(report.checks[0].status, CheckStatus::Blocked);
    assert!(report.messages[0].contains("refused"));
    let refused = events_of(&fx.audit, GATE_OVERRIDE_REFUSED);
    assert_eq!(refused.len(), 1);
    assert_eq!(refused[0].payload["reason"], "missing");
}

#[tokio::test]
async fn decision_for_other_stage_does_not_override() {
    let fx = fixture();
    let mut store = DecisionStore::open(&fx.decisions_path, &fx.audit).unwrap();
    store
        .record(
            &override_scope(Stage::PrePush, Tool::Gitleaks),
            OVERRIDE_POLICY,
            Severity::Low,
            &override_context(Stage::PrePush, Tool::Gitleaks),
        )
        .unwrap();

    let tc = Arc::new(FakeToolchain::default().with(Tool::Gitleaks, &[false]));
    let engine = GateEngine::new(
        tc,
        settings(Stage::PreCommit, &[Tool::Gitleaks]),
        &fx.audit,
        &store,
    );
    let report = engine
        .run(GateRequest::new(Stage::PreCommit, "feature/x").with_override(Tool::Gitleaks))
        .await
        .unwrap();
    assert!(!report.passed());
}

#[tokio::test]
async fn expired_override_decision_is_refused() {
    let fx = fixture();
    let mut store = DecisionStore::open(&fx.decisions_path, &fx.audit).unwrap();
    let long_ago = chrono::Utc::now() - chrono::Duration::days(60);
    store
        .record_at(
            long_ago,
            &override_scope(Stage::PreCommit, Tool::Gitleaks),
            OVERRIDE_POLICY,
            Severity::Critical,
            &override_context(Stage::PreCommit, Tool::Gitleaks),
        )
        .unwrap();

    let tc = Arc::new(FakeToolchain::default().with(Tool::Gitleaks, &[false]));
    let engine = GateEngine::new(
        tc,
        settings(Stage::PreCommit, &[Tool::Gitleaks]),
        &fx.audit,
        &store,
    );
    let report = engine
        .run(GateRequest::new(Stage::PreCommit, "feature/x").with_override(Tool::Gitleaks))
        .await
        .unwrap();

    assert_eq!(report.checks[0].status, CheckStatus::Blocked);
    let refused = events_of(&fx.audit, GATE_OVERRIDE_REFUSED);
    assert_eq!(refused.len(), 1);
    assert_eq!(refused[0].payload["reason"], "expired");
    assert!(transitions(&fx.audit, "gitleaks").iter().all(|(_, to)| to != "OVERRIDDEN"));
}
