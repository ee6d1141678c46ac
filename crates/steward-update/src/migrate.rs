//! Manifest schema migrations, keyed by `(from, to)`.
//!
//! Each step is a plain function over the raw JSON so old layouts never need
//! a Rust type. Every step is idempotent: applying it to its own output
//! returns that output unchanged.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use steward_core::{Error, Result};
use steward_ownership::Classifier;
use tracing::info;

use crate::manifest::CURRENT_SCHEMA;

pub type MigrationFn = fn(Value, &Classifier) -> Result<Value>;

pub fn registry() -> BTreeMap<(u32, u32), MigrationFn> {
    let mut steps: BTreeMap<(u32, u32), MigrationFn> = BTreeMap::new();
    steps.insert((1, 2), v1_to_v2);
    steps
}

pub fn schema_version(value: &Value) -> Option<u32> {
    value.get("schemaVersion").and_then(Value::as_u64).map(|v| v as u32)
}

/// Walk `value` forward one registered step at a time until `CURRENT_SCHEMA`.
pub fn migrate_to_current(
    mut value: Value,
    classifier: &Classifier,
    origin: &Path,
) -> Result<Value> {
    let steps = registry();
    loop {
        let version = schema_version(&value)
            .ok_or_else(|| Error::config(origin, "manifest has no schemaVersion"))?;
        if version == CURRENT_SCHEMA {
            return Ok(value);
        }
        if version > CURRENT_SCHEMA {
            return Err(Error::config(
                origin,
                format!(
                    "manifest schema {version} is newer than supported {CURRENT_SCHEMA}; refusing to downgrade"
                ),
            ));
        }
        let step = steps.get(&(version, version + 1)).ok_or_else(|| {
            Error::config(origin, format!("no migration path from schema {version}"))
        })?;
        info!(from = version, to = version + 1, "migrating install manifest");
        value = step(value, classifier)?;
    }
}

/// v1 `{schemaVersion:1, files:{path: hash}}` -> v2 `installedFiles` with tiers.
fn v1_to_v2(value: Value, classifier: &Classifier) -> Result<Value> {
    if schema_version(&value) == Some(2) && value.get("installedFiles").is_some() {
        return Ok(value);
    }

    let files = value
        .get("files")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_else(Map::new);

    let mut installed = Vec::with_capacity(files.len());
    for (path, hash) in files {
        let hash = hash.as_str().unwrap_or_default();
        let content_hash = if hash.starts_with("sha256:") {
            hash.to_string()
        } else {
            format!("sha256:{hash}")
        };
        installed.push(json!({
            "path": path,
            "contentHash": content_hash,
            "tier": classifier.classify(&path)?,
        }));
    }

    // `files` is a sorted map, so `installed` is already in path order.
    Ok(json!({ "schemaVersion": 2, "installedFiles": installed }))
}
