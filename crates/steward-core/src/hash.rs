//! SHA-256 helpers shared by the manifest, the decision store, and the standards cache.

use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Manifest content hash: `sha256:<hex>` of the raw bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("sha256:{}", sha256_hex(bytes))
}

/// Serialize a JSON value with object keys sorted, so equal values hash equally.
pub fn canonical_json(value: &serde_json::Value) -> String {
    // serde_json's default Map is a BTreeMap, so re-serializing sorts keys.
    serde_json::to_string(value).unwrap_or_default()
}

/// Incremental hasher over length-prefixed parts. `a‖bc` and `ab‖c` never collide.
#[derive(Default)]
pub struct PartsHasher {
    inner: Sha256,
}

impl PartsHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part(mut self, bytes: &[u8]) -> Self {
        self.inner.update((bytes.len() as u64).to_be_bytes());
        self.inner.update(bytes);
        self
    }

    pub fn finish(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn content_hash_prefixed() {
        assert!(content_hash(b"x").starts_with("sha256:"));
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let a = json!({"b": 1, "a": {"d": 2, "c": 3}});
        assert_eq!(canonical_json(&a), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn parts_are_length_prefixed() {
        let x = PartsHasher::new().part(b"a").part(b"bc").finish();
        let y = PartsHasher::new().part(b"ab").part(b"c").finish();
        assert_ne!(x, y);
    }
}
