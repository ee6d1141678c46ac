//! One configuration layer, read from a JSON, YAML, or TOML file.

use serde_json::Value;
use std::path::{Path, PathBuf};
use steward_core::{Error, Result};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct StandardsLayer {
    pub layer_id: String,
    pub precedence_rank: usize,
    pub content: Value,
    /// Raw file bytes; the cache key is computed over these.
    pub raw: Vec<u8>,
    pub source: Option<PathBuf>,
}

impl StandardsLayer {
    /// In-memory layer. `raw` is the canonical JSON of `content`.
    pub fn new(layer_id: impl Into<String>, precedence_rank: usize, content: Value) -> Self {
        let raw = steward_core::hash::canonical_json(&content).into_bytes();
        Self {
            layer_id: layer_id.into(),
            precedence_rank,
            content,
            raw,
            source: None,
        }
    }

    pub fn load(layer_id: impl Into<String>, precedence_rank: usize, path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .map_err(|e| {
                Error::config(path, format!("cannot read standards layer: {e}"))
            })?;
        let content = parse(path, &raw)?;
        if !content.is_object() {
            return Err(Error::config(
                path,
                "standards layer must be a mapping at the top level",
            ));
        }
        let layer_id = layer_id.into();
        debug!(layer = %layer_id, path = %path.display(), "standards layer loaded");
        Ok(Self {
            layer_id,
            precedence_rank,
            content,
            raw,
            source: Some(path.to_path_buf()),
        })
    }

    /// `load`, except a missing file yields an empty layer.
    pub fn load_or_empty(
        layer_id: impl Into<String>,
        precedence_rank: usize,
        path: &Path,
    ) -> Result<Self> {
        if path.exists() {
            Self::load(layer_id, precedence_rank, path)
        } else {
            let mut layer = Self::new(layer_id, precedence_rank, Value::Object(Default::default()));
            layer.source = Some(path.to_path_buf());
            Ok(layer)
        }
    }
}

fn parse(path: &Path, raw: &[u8]) -> Result<Value> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "yaml" | "yml" => {
            serde_yaml::from_slice(raw).map_err(|e| Error::config(path, e.to_string()))
        }
        "toml" => {
            let text = std::str::from_utf8(raw).map_err(|e| Error::config(path, e.to_string()))?;
            toml::from_str(text).map_err(|e| Error::config(path, e.to_string()))
        }
        "json" => serde_json::from_slice(raw).map_err(|e| Error::config(path, e.to_string())),
        other => Err(Error::config(
            path,
            format!("unsupported standards format: {other:?}"),
        )),
    }
}
