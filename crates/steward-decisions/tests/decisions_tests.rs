//! Tests for steward-decisions: record/lookup/renew lifecycle and replay agreement

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use std::time::Duration as StdDuration;
use steward_core::fsio::FileLock;
use steward_core::{AuditLog, Error, Severity};
use steward_decisions::*;
use tempfile::TempDir;

fn setup(dir: &TempDir) -> AuditLog {
    AuditLog::open(dir.path().join("audit-log.ndjson"), "tester")
}

// ===========================================================================
// Record + expiry
// ===========================================================================

#[test]
fn high_severity_expires_after_thirty_days() {
    let dir = TempDir::new().unwrap();
    let audit = setup(&dir);
    let mut store = DecisionStore::open(dir.path().join("decision-store.json"), &audit).unwrap();

    let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
    let ctx = json!({"check": "gitleaks", "stage": "pre-commit"});
    let d = store
        .record_at(t0, "gate:pre-commit:gitleaks", "override", Severity::High, &ctx)
        .unwrap();

    assert_eq!(d.expires_at, t0 + Duration::days(30));
    assert_eq!(d.renewal_count, 0);
    assert_eq!(d.derived_expiry(), d.expires_at);

    let day29 = t0 + Duration::days(29);
    let day31 = t0 + Duration::days(31);
    assert!(matches!(
        store.check_at(day29, "gate:pre-commit:gitleaks", "override", None, &ctx),
        LookupOutcome::Valid(_)
    ));
    assert!(matches!(
        store.check_at(day31, "gate:pre-commit:gitleaks", "override", None, &ctx),
        LookupOutcome::Expired(_)
    ));
}

#[test]
fn every_severity_follows_the_ttl_table() {
    let dir = TempDir::new().unwrap();
    let audit = setup(&dir);
    let mut store = DecisionStore::open(dir.path().join("decision-store.json"), &audit).unwrap();
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    for (sev, days) in [
        (Severity::Critical, 15),
        (Severity::High, 30),
        (Severity::Medium, 60),
        (Severity::Low, 90),
    ] {
        let d = store.record_at(t0, "s", "p", sev, &json!({"sev": sev.name()})).unwrap();
        assert_eq!(d.expires_at - d.decided_at, Duration::days(days));
    }
}

#[test]
fn lookup_misses_on_any_context_change() {
    let dir = TempDir::new().unwrap();
    let audit = setup(&dir);
    let mut store = DecisionStore::open(dir.path().join("decision-store.json"), &audit).unwrap();
    store
        .record("skill-source:acme", "allowlist", Severity::Medium, &json!({"sha": "abc"}))
        .unwrap();

    assert!(store.lookup("skill-source:acme", "allowlist", &json!({"sha": "abc"})).is_some());
    assert!(store.lookup("skill-source:acme", "allowlist", &json!({"sha": "abd"})).is_none());
    assert!(store.lookup("skill-source:acme", "checksum", &json!({"sha": "abc"})).is_none());
    assert!(store.lookup("skill-source:other", "allowlist", &json!({"sha": "abc"})).is_none());
    assert!(store
        .lookup_with_severity(
            "skill-source:acme",
            "allowlist",
            Severity::Critical,
            &json!({"sha": "abc"}),
        )
        .is_none());
    assert!(matches!(
        store.check("skill-source:acme", "allowlist", &json!({"sha": "zzz"})),
        LookupOutcome::Mismatch { candidates: 1 }
    ));
    assert_eq!(store.check("nothing", "here", &json!({})), LookupOutcome::Missing);
}

#[test]
fn context_key_order_does_not_matter() {
    let dir = TempDir::new().unwrap();
    let audit = setup(&dir);
    let mut store = DecisionStore::open(dir.path().join("decision-store.json"), &audit).unwrap();
    store.record("s", "p", Severity::Low, &json!({"a": 1, "b": 2})).unwrap();
    let reordered: serde_json::Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
    assert!(store.lookup("s", "p", &reordered).is_some());
}

#[test]
fn tampered_hash_does_not_validate() {
    let dir = TempDir::new().unwrap();
    let audit = setup(&dir);
    let path = dir.path().join("decision-store.json");
    {
        let mut store = DecisionStore::open(&path, &audit).unwrap();
        store.record("s", "p", Severity::High, &json!({"x": 1})).unwrap();
    }
    // Severity edited by hand: the stored hash no longer binds.
    let text = std::fs::read_to_string(&path).unwrap().replace("\"high\"", "\"low\"");
    std::fs::write(&path, text).unwrap();

    let store = DecisionStore::open(&path, &audit).unwrap();
    assert!(store.lookup("s", "p", &json!({"x": 1})).is_none());
}

#[test]
fn expired_and_mismatch_map_to_reprompt_errors() {
    let expired = LookupOutcome::Expired(Decision {
        id: "1".into(),
        scope: "s".into(),
        policy: "p".into(),
        severity: Severity::Low,
        context_hash: "h".into(),
        decided_at: Utc::now(),
        expires_at: Utc::now(),
        renewal_count: 0,
        renewed_at: None,
    });
    let err = expired.into_result("s", "p").unwrap_err();
    assert!(err.is_reprompt());
    let err = LookupOutcome::Mismatch { candidates: 2 }.into_result("s", "p").unwrap_err();
    assert!(matches!(err, Error::DecisionMismatch { .. }));
    assert!(LookupOutcome::Missing.into_result("s", "p").unwrap().is_none());
}

// ===========================================================================
// Renewal
// ===========================================================================

#[test]
fn two_renewals_succeed_third_fails_without_mutation() {
    let dir = TempDir::new().unwrap();
    let audit = setup(&dir);
    let path = dir.path().join("decision-store.json");
    let mut store = DecisionStore::open(&path, &audit).unwrap();
    let t0 = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
    let d = store.record_at(t0, "s", "p", Severity::High, &json!({})).unwrap();

    let t1 = t0 + Duration::days(10);
    let r1 = store.renew_at(t1, &d.id).unwrap();
    assert_eq!(r1.renewal_count, 1);
    assert_eq!(r1.expires_at, t1 + Duration::days(30));
    assert_eq!(r1.derived_expiry(), r1.expires_at);

    let t2 = t0 + Duration::days(20);
    let r2 = store.renew_at(t2, &d.id).unwrap();
    assert_eq!(r2.renewal_count, 2);

    let before = std::fs::read(&path).unwrap();
    let err = store.renew_at(t0 + Duration::days(25), &d.id).unwrap_err();
    assert!(matches!(err, Error::RenewalLimit { count: 2, .. }));
    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert_eq!(store.get(&d.id).unwrap().renewal_count, 2);

    let types: Vec<String> = audit.events().unwrap().into_iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![DECISION_RECORDED, DECISION_RENEWED, DECISION_RENEWED, DECISION_RENEWAL_REFUSED]
    );
}

#[test]
fn renew_unknown_id_fails() {
    let dir = TempDir::new().unwrap();
    let audit = setup(&dir);
    let mut store = DecisionStore::open(dir.path().join("decision-store.json"), &audit).unwrap();
    assert!(matches!(store.renew("missing"), Err(Error::DecisionNotFound(_))));
}

// ===========================================================================
// Persistence + replay
// ===========================================================================

#[test]
fn persisted_file_uses_camel_case_keys() {
    let dir = TempDir::new().unwrap();
    let audit = setup(&dir);
    let path = dir.path().join("decision-store.json");
    let mut store = DecisionStore::open(&path, &audit).unwrap();
    store.record("s", "p", Severity::Medium, &json!({})).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let raw: serde_json::Value = serde_json::from_str(&text).unwrap();
    let d = &raw["decisions"][0];
    for key in [
        "id",
        "scope",
        "policy",
        "severity",
        "contextHash",
        "decidedAt",
        "expiresAt",
        "renewalCount",
    ] {
        assert!(d.get(key).is_some(), "missing {key}");
    }
}

#[test]
fn two_stores_on_one_file_do_not_lose_writes() {
    let dir = TempDir::new().unwrap();
    let audit = setup(&dir);
    let path = dir.path().join("decision-store.json");
    let mut a = DecisionStore::open(&path, &audit).unwrap();
    let mut b = DecisionStore::open(&path, &audit).unwrap();
    a.record("a", "p", Severity::Low, &json!({})).unwrap();
    b.record("b", "p", Severity::Low, &json!({})).unwrap();

    let fresh = DecisionStore::open(&path, &audit).unwrap();
    assert_eq!(fresh.list().len(), 2);
}

#[test]
fn replay_matches_persisted_store() {
    let dir = TempDir::new().unwrap();
    let audit = setup(&dir);
    let path = dir.path().join("decision-store.json");
    let mut store = DecisionStore::open(&path, &audit).unwrap();

    let d1 = store
        .record("gate:pre-push:cargo-audit", "override", Severity::Critical, &json!({"n": 1}))
        .unwrap();
    store.record("skill-source:x", "allowlist", Severity::Low, &json!({"n": 2})).unwrap();
    store.renew(&d1.id).unwrap();
    audit.append("unrelated.event", json!({"noise": true})).unwrap();

    let replayed: DecisionIndex = audit.replay().unwrap();
    let reopened = DecisionStore::open(&path, &audit).unwrap();
    let persisted = DecisionIndex::from_decisions(reopened.list());
    assert_eq!(replayed, persisted);
    assert!(replayed.divergence(&persisted).is_empty());
}

#[test]
fn record_with_audit_log_locked_persists_nothing() {
    let dir = TempDir::new().unwrap();
    let audit = setup(&dir).with_lock_wait(StdDuration::from_millis(50));
    let path = dir.path().join("decision-store.json");
    let mut store = DecisionStore::open(&path, &audit).unwrap();

    let held = FileLock::acquire(audit.path(), StdDuration::from_secs(1)).unwrap();
    let err = store.record("s", "p", Severity::High, &json!({})).unwrap_err();
    drop(held);

    assert!(matches!(err, Error::LockTimeout { .. }));
    assert!(store.list().is_empty());
    let reopened = DecisionStore::open(&path, &audit).unwrap();
    let persisted = DecisionIndex::from_decisions(reopened.list());
    assert!(persisted.decisions.is_empty());
    let replayed: DecisionIndex = audit.replay().unwrap();
    assert!(replayed.divergence(&persisted).is_empty());
}

#[test]
fn write_failure_event_reverts_the_replayed_decision() {
    let dir = TempDir::new().unwrap();
    let audit = setup(&dir);
    let path = dir.path().join("decision-store.json");
    let mut store = DecisionStore::open(&path, &audit).unwrap();
    let kept = store.record("s", "p", Severity::Medium, &json!({"n": 1})).unwrap();

    // A renewal whose store write was lost, then a record whose write was lost.
    let mut renewed = kept.clone();
    renewed.renewal_count = 1;
    audit.append(DECISION_RENEWED, json!({"decision": renewed})).unwrap();
    audit.append(DECISION_WRITE_FAILED, json!({"id": kept.id, "previous": kept})).unwrap();
    let mut lost = kept.clone();
    lost.id = "lost".into();
    audit.append(DECISION_RECORDED, json!({"decision": lost})).unwrap();
    audit.append(DECISION_WRITE_FAILED, json!({"id": "lost", "previous": null})).unwrap();

    let replayed: DecisionIndex = audit.replay().unwrap();
    let reopened = DecisionStore::open(&path, &audit).unwrap();
    let persisted = DecisionIndex::from_decisions(reopened.list());
    assert_eq!(replayed, persisted);
    assert_eq!(replayed.decisions[&kept.id].renewal_count, 0);
}
