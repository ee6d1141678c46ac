//! Steward configuration
//!
//! Loaded from `<root>/.steward/config.toml`. Every field has a default, so a
//! missing file is a valid configuration; a file that exists but does not
//! parse is a configuration error naming it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use steward_core::fsio::DEFAULT_LOCK_WAIT;
use steward_core::{Error, Result};

pub const DEFAULT_STATE_DIR: &str = ".steward";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct StewardConfig {
    /// Name recorded on audit events.
    pub actor: Option<String>,
    pub paths: PathsConfig,
    pub ownership: OwnershipConfig,
    pub locks: LocksConfig,
    pub standards: StandardsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PathsConfig {
    /// State directory, relative to the repository root.
    pub state_dir: PathBuf,
    /// Canonical framework tree used by `install` and `update`.
    pub canonical_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            canonical_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OwnershipConfig {
    /// Unclassified paths are an error instead of framework-owned.
    pub strict: bool,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self { strict: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LocksConfig {
    pub wait_ms: u64,
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            wait_ms: DEFAULT_LOCK_WAIT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StandardsConfig {
    /// Ordered low to high precedence.
    pub layers: Vec<LayerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerConfig {
    pub id: String,
    pub path: PathBuf,
}

impl Default for StandardsConfig {
    fn default() -> Self {
        let layer = |id: &str| LayerConfig {
            id: id.to_string(),
            path: PathBuf::from(format!("standards/{id}/standards.yaml")),
        };
        Self {
            layers: vec![layer("framework"), layer("team"), layer("project")],
        }
    }
}

impl StewardConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let config: Self =
            toml::from_str(&content).map_err(|e| Error::config(path, e.to_string()))?;
        config.validate(path)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let mut seen = Vec::new();
        for layer in &self.standards.layers {
            if layer.id.is_empty() {
                return Err(Error::config(path, "standards layer with empty id"));
            }
            if seen.contains(&layer.id.as_str()) {
                return Err(Error::config(
                    path,
                    format!("duplicate standards layer id: {}", layer.id),
                ));
            }
            seen.push(layer.id.as_str());
        }
        Ok(())
    }

    /// Config `actor`, then `STEWARD_ACTOR`, then `USER`, then `steward`.
    pub fn resolve_actor(&self) -> String {
        self.actor
            .clone()
            .filter(|a| !a.is_empty())
            .or_else(|| std::env::var("STEWARD_ACTOR").ok().filter(|a| !a.is_empty()))
            .or_else(|| std::env::var("USER").ok().filter(|a| !a.is_empty()))
            .unwrap_or_else(|| "steward".to_string())
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.locks.wait_ms)
    }
}
