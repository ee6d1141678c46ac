//! On-disk resolution cache, keyed by a hash of every layer's bytes.

use crate::layer::StandardsLayer;
use crate::resolve::{cache_key, resolve, Resolution};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use steward_core::fsio::{read_json_opt, write_json_atomic};
use steward_core::Result;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    key: String,
    resolution: Resolution,
}

pub struct ResolutionCache {
    path: PathBuf,
}

impl ResolutionCache {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the cached resolution when every layer is byte-identical to the
    /// last run, otherwise resolve and overwrite the cache.
    pub fn get_or_resolve(&self, layers: &[StandardsLayer]) -> Result<(Resolution, CacheStatus)> {
        let key = cache_key(layers);

        // An unreadable cache is only a miss.
        match read_json_opt::<CacheFile>(&self.path) {
            Ok(Some(cached)) if cached.key == key => {
                debug!(key = %key, "standards cache hit");
                return Ok((cached.resolution, CacheStatus::Hit));
            }
            Ok(_) => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "ignoring unreadable standards cache"
            ),
        }

        let resolution = resolve(layers);
        write_json_atomic(
            &self.path,
            &CacheFile {
                key: key.clone(),
                resolution: resolution.clone(),
            },
        )?;
        debug!(key = %key, "standards cache refreshed");
        Ok((resolution, CacheStatus::Miss))
    }

    pub fn invalidate(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
