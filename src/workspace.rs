//! Per-invocation context: config, state paths, and the shared audit log.
//!
//! Built once in `run` and passed by reference to every command.

use crate::config::{StewardConfig, CONFIG_FILE};
use std::path::{Path, PathBuf};
use std::time::Duration;
use steward_core::{AuditLog, Error, Result};
use steward_decisions::DecisionStore;
use steward_ownership::Classifier;
use steward_standards::{CacheStatus, Resolution, ResolutionCache, StandardsLayer};

pub const MANIFEST_FILE: &str = "install-manifest.json";
pub const OWNERSHIP_MAP_FILE: &str = "ownership-map.json";
pub const DECISION_STORE_FILE: &str = "decision-store.json";
pub const AUDIT_LOG_FILE: &str = "audit-log.ndjson";
pub const STANDARDS_CACHE_FILE: &str = "standards-cache.json";

pub struct Workspace {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub config_present: bool,
    pub config: StewardConfig,
    pub state_dir: PathBuf,
    pub audit: AuditLog,
    pub classifier: Classifier,
}

impl Workspace {
    pub fn open(root: &Path, config_path: Option<&Path>) -> Result<Self> {
        let root = root.to_path_buf();
        let config_path = match config_path {
            Some(p) => p.to_path_buf(),
            None => root.join(crate::config::DEFAULT_STATE_DIR).join(CONFIG_FILE),
        };
        let config = StewardConfig::load(&config_path)?;
        let state_dir = root.join(&config.paths.state_dir);
        let audit = AuditLog::open(state_dir.join(AUDIT_LOG_FILE), config.resolve_actor())
            .with_lock_wait(config.lock_wait());
        let classifier =
            Classifier::load(&state_dir.join(OWNERSHIP_MAP_FILE), config.ownership.strict)?;

        tracing::debug!(root = %root.display(), actor = audit.actor(), "workspace opened");
        Ok(Self {
            config_present: config_path.is_file(),
            root,
            config_path,
            config,
            state_dir,
            audit,
            classifier,
        })
    }

    pub fn lock_wait(&self) -> Duration {
        self.config.lock_wait()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir.join(MANIFEST_FILE)
    }

    pub fn ownership_map_path(&self) -> PathBuf {
        self.state_dir.join(OWNERSHIP_MAP_FILE)
    }

    pub fn decision_store_path(&self) -> PathBuf {
        self.state_dir.join(DECISION_STORE_FILE)
    }

    pub fn standards_cache_path(&self) -> PathBuf {
        self.state_dir.join(STANDARDS_CACHE_FILE)
    }

    pub fn decisions(&self) -> Result<DecisionStore<'_>> {
        Ok(DecisionStore::open(self.decision_store_path(), &self.audit)?
            .with_lock_wait(self.lock_wait()))
    }

    /// Top-level directory name of the state dir, skipped when scanning trees.
    pub fn state_dir_name(&self) -> String {
        self.config
            .paths
            .state_dir
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .unwrap_or_else(|| crate::config::DEFAULT_STATE_DIR.to_string())
    }

    /// `--source` wins over `paths.canonicalDir`.
    pub fn canonical_dir(&self, source: Option<&Path>) -> Result<PathBuf> {
        let dir = match (source, &self.config.paths.canonical_dir) {
            (Some(s), _) => s.to_path_buf(),
            (None, Some(c)) => self.root.join(c),
            (None, None) => {
                return Err(Error::config(
                    &self.config_path,
                    "no canonical tree: set paths.canonicalDir or pass --source",
                ))
            }
        };
        if !dir.is_dir() {
            return Err(Error::config(&dir, "canonical tree is not a directory"));
        }
        Ok(dir)
    }

    /// Configured layers in precedence order; absent files are empty layers.
    pub fn standards_layers(&self) -> Result<Vec<StandardsLayer>> {
        self.config
            .standards
            .layers
            .iter()
            .enumerate()
            .map(|(rank, layer)| {
                StandardsLayer::load_or_empty(layer.id.clone(), rank, &self.root.join(&layer.path))
            })
            .collect()
    }

    pub fn standards_layer(&self, id: &str) -> Result<StandardsLayer> {
        let (rank, layer) = self
            .config
            .standards
            .layers
            .iter()
            .enumerate()
            .find(|(_, l)| l.id == id)
            .ok_or_else(|| {
                let known: Vec<_> =
                    self.config.standards.layers.iter().map(|l| l.id.as_str()).collect();
                Error::config(
                    &self.config_path,
                    format!("unknown standards layer {id} (known: {})", known.join(", ")),
                )
            })?;
        StandardsLayer::load_or_empty(layer.id.clone(), rank, &self.root.join(&layer.path))
    }

    pub fn resolve_standards(&self) -> Result<(Resolution, CacheStatus)> {
        let layers = self.standards_layers()?;
        ResolutionCache::new(self.standards_cache_path()).get_or_resolve(&layers)
    }
}
