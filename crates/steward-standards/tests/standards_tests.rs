//! Tests for steward-standards: on-disk layers, merge semantics, cache invalidation

use serde_json::json;
use steward_standards::*;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let p = dir.path().join(name);
    std::fs::write(&p, body).unwrap();
    p
}

// ===========================================================================
// Merge semantics
// ===========================================================================

#[test]
fn two_layer_round_trip_from_files() {
    let dir = TempDir::new().unwrap();
    let low = write(&dir, "framework.json", r#"{"a":1,"b":[1],"c":{"x":1}}"#);
    let high = write(&dir, "team.yaml", "a: 2\nb: [2]\nc:\n  y: 2\n");

    let layers = vec![
        StandardsLayer::load("framework", 0, &low).unwrap(),
        StandardsLayer::load("team", 1, &high).unwrap(),
    ];
    let r = resolve(&layers);
    assert_eq!(r.tree, json!({"a": 2, "b": [1, 2], "c": {"x": 1, "y": 2}}));

    let keys: Vec<_> = r.entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["a", "b", "c.x", "c.y"]);
}

#[test]
fn three_layers_list_prefix_order_is_preserved() {
    let layers = vec![
        StandardsLayer::new("framework", 0, json!({"gates": {"protectedBranches": ["main"]}})),
        StandardsLayer::new("team", 1, json!({"gates": {"protectedBranches": ["release"]}})),
        StandardsLayer::new("project", 2, json!({"gates": {"protectedBranches": ["prod"]}})),
    ];
    let r = resolve(&layers);
    assert_eq!(
        r.get_str_list("gates.protectedBranches").unwrap(),
        vec!["main", "release", "prod"]
    );
    assert_eq!(r.attribution("gates.protectedBranches"), Some("project"));
}

#[test]
fn resolution_is_deterministic() {
    let layers = vec![
        StandardsLayer::new("framework", 0, json!({"z": 1, "a": {"m": 1, "b": 2}})),
        StandardsLayer::new("team", 1, json!({"a": {"c": 3}})),
    ];
    let first = serde_json::to_string(&resolve(&layers)).unwrap();
    for _ in 0..10 {
        assert_eq!(serde_json::to_string(&resolve(&layers)).unwrap(), first);
    }
}

// ===========================================================================
// Cache
// ===========================================================================

#[test]
fn editing_any_layer_file_invalidates_cache() {
    let dir = TempDir::new().unwrap();
    let low = write(&dir, "framework.toml", "[gates]\ncheckTimeoutSecs = 300\n");
    let high = write(&dir, "project.json", r#"{"gates":{"failFast":false}}"#);
    let cache = ResolutionCache::new(dir.path().join("cache").join("standards-cache.json"));

    let load = || {
        vec![
            StandardsLayer::load("framework", 0, &low).unwrap(),
            StandardsLayer::load("project", 1, &high).unwrap(),
        ]
    };

    assert_eq!(cache.get_or_resolve(&load()).unwrap().1, CacheStatus::Miss);
    assert_eq!(cache.get_or_resolve(&load()).unwrap().1, CacheStatus::Hit);

    std::fs::write(&high, r#"{"gates":{"failFast":true}}"#).unwrap();
    let (r, status) = cache.get_or_resolve(&load()).unwrap();
    assert_eq!(status, CacheStatus::Miss);
    assert_eq!(r.get_bool("gates.failFast"), Some(true));
    assert_eq!(r.get_u64("gates.checkTimeoutSecs"), Some(300));

    cache.invalidate().unwrap();
    assert_eq!(cache.get_or_resolve(&load()).unwrap().1, CacheStatus::Miss);
}

// ===========================================================================
// Diff
// ===========================================================================

#[test]
fn diff_between_loaded_layers() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "team.json", r#"{"review":{"required":1}}"#);
    let b = write(&dir, "project.json", r#"{"review":{"required":2},"lint":{"strict":true}}"#);
    let d = diff_layers(
        &StandardsLayer::load("team", 1, &a).unwrap(),
        &StandardsLayer::load("project", 2, &b).unwrap(),
    );
    assert_eq!(d.len(), 2);
    assert_eq!(d[0].key, "lint.strict");
    assert!(matches!(d[0].change, KeyChange::Added { .. }));
    assert_eq!(d[1].key, "review.required");
}
