//! `install-manifest.json`: what the framework installed and the hash it left behind.

use serde::{Deserialize, Serialize};
use std::path::Path;
use steward_core::fsio::{read_json_opt, write_json_atomic};
use steward_core::{Error, Result, Tier};
use steward_ownership::Classifier;

use crate::migrate::migrate_to_current;

pub const CURRENT_SCHEMA: u32 = 2;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstalledFile {
    pub path: String,
    pub content_hash: String,
    pub tier: Tier,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstalledManifest {
    pub schema_version: u32,
    pub installed_files: Vec<InstalledFile>,
}

impl Default for InstalledManifest {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA,
            installed_files: Vec::new(),
        }
    }
}

impl InstalledManifest {
    /// Load and migrate to the current schema. `Ok(None)` if not installed yet.
    pub fn load(path: &Path, classifier: &Classifier) -> Result<Option<Self>> {
        let Some(raw) = read_json_opt::<serde_json::Value>(path)? else {
            return Ok(None);
        };
        let migrated = migrate_to_current(raw, classifier, path)?;
        serde_json::from_value(migrated)
            .map(Some)
            .map_err(|e| Error::config(path, e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn get(&self, path: &str) -> Option<&InstalledFile> {
        self.installed_files.iter().find(|f| f.path == path)
    }

    pub fn recorded_hash(&self, path: &str) -> Option<&str> {
        self.get(path).map(|f| f.content_hash.as_str())
    }

    /// Insert or replace the entry for `file.path`, keeping path order.
    pub fn upsert(&mut self, file: InstalledFile) {
        match self.installed_files.binary_search_by(|f| f.path.cmp(&file.path)) {
            Ok(i) => self.installed_files[i] = file,
            Err(i) => self.installed_files.insert(i, file),
        }
    }

    pub fn len(&self) -> usize {
        self.installed_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed_files.is_empty()
    }
}
