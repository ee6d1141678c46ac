//! Key-level difference between two layers (`standards diff`).

use crate::layer::StandardsLayer;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "change", rename_all = "lowercase")]
pub enum KeyChange {
    Added { value: Value },
    Removed { value: Value },
    Changed { from: Value, to: Value },
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct KeyDiff {
    pub key: String,
    #[serde(flatten)]
    pub change: KeyChange,
}

fn leaves(value: &Value, prefix: &str, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                leaves(v, &key, out);
            }
        }
        other => {
            if !prefix.is_empty() {
                out.insert(prefix.to_string(), other.clone());
            }
        }
    }
}

/// Keys `b` adds, removes, or changes relative to `a`, sorted by key.
pub fn diff_layers(a: &StandardsLayer, b: &StandardsLayer) -> Vec<KeyDiff> {
    let mut left = BTreeMap::new();
    let mut right = BTreeMap::new();
    leaves(&a.content, "", &mut left);
    leaves(&b.content, "", &mut right);

    let mut out = Vec::new();
    for (key, from) in &left {
        match right.get(key) {
            None => out.push(KeyDiff {
                key: key.clone(),
                change: KeyChange::Removed {
                    value: from.clone(),
                },
            }),
            Some(to) if to != from => out.push(KeyDiff {
                key: key.clone(),
                change: KeyChange::Changed {
                    from: from.clone(),
                    to: to.clone(),
                },
            }),
            Some(_) => {}
        }
    }
    for (key, value) in &right {
        if !left.contains_key(key) {
            out.push(KeyDiff {
                key: key.clone(),
                change: KeyChange::Added {
                    value: value.clone(),
                },
            });
        }
    }
    out.sort_by(|x, y| x.key.cmp(&y.key));
    out
}
