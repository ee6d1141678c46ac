//! Decision index rebuilt from the audit log.

use crate::store::{Decision, DECISION_RECORDED, DECISION_RENEWED, DECISION_WRITE_FAILED};
use std::collections::BTreeMap;
use steward_core::{AuditEvent, AuditView};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DecisionIndex {
    pub decisions: BTreeMap<String, Decision>,
}

impl AuditView for DecisionIndex {
    fn apply(&mut self, event: &AuditEvent) {
        if event.event_type == DECISION_WRITE_FAILED {
            self.revert(&event.payload);
            return;
        }
        if event.event_type != DECISION_RECORDED && event.event_type != DECISION_RENEWED {
            return;
        }
        let Some(raw) = event.payload.get("decision") else {
            return;
        };
        if let Ok(decision) = serde_json::from_value::<Decision>(raw.clone()) {
            self.decisions.insert(decision.id.clone(), decision);
        }
    }
}

impl DecisionIndex {
    /// Undo the preceding event for a decision whose store write failed.
    fn revert(&mut self, payload: &serde_json::Value) {
        let Some(id) = payload.get("id").and_then(|v| v.as_str()) else {
            return;
        };
        match payload
            .get("previous")
            .and_then(|raw| serde_json::from_value::<Decision>(raw.clone()).ok())
        {
            Some(previous) => {
                self.decisions.insert(id.to_string(), previous);
            }
            None => {
                self.decisions.remove(id);
            }
        }
    }

    pub fn from_decisions<'d>(decisions: impl IntoIterator<Item = &'d Decision>) -> Self {
        Self {
            decisions: decisions.into_iter().map(|d| (d.id.clone(), d.clone())).collect(),
        }
    }

    /// Ids whose replayed state differs from the persisted snapshot, either way.
    pub fn divergence(&self, persisted: &DecisionIndex) -> Vec<String> {
        let mut ids: Vec<String> = self
            .decisions
            .iter()
            .filter(|(id, d)| persisted.decisions.get(*id) != Some(*d))
            .map(|(id, _)| id.clone())
            .chain(
                persisted
                    .decisions
                    .keys()
                    .filter(|id| !self.decisions.contains_key(*id))
                    .cloned(),
            )
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}
