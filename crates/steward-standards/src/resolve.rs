//! Layer merge with per-key attribution.
//!
//! Layers are applied low to high precedence:
//! - scalar: the higher layer replaces the lower value
//! - list: higher items are appended after the lower items
//! - mapping: recursive merge, higher keys win, other keys survive
//!
//! A kind mismatch (e.g. scalar below, mapping above) is a replacement.

use crate::layer::StandardsLayer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use steward_core::hash::PartsHasher;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStandard {
    pub key: String,
    pub value: Value,
    pub contributing_layer_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub cache_key: String,
    pub layer_ids: Vec<String>,
    pub tree: Value,
    pub entries: Vec<ResolvedStandard>,
}

enum Node {
    Leaf { value: Value, layer: String },
    Dict(BTreeMap<String, Node>),
}

fn merge(existing: Option<Node>, incoming: &Value, layer: &str) -> Node {
    match incoming {
        Value::Object(map) => {
            let mut children = match existing {
                Some(Node::Dict(children)) => children,
                _ => BTreeMap::new(),
            };
            for (k, v) in map {
                let prev = children.remove(k);
                children.insert(k.clone(), merge(prev, v, layer));
            }
            Node::Dict(children)
        }
        Value::Array(items) => match existing {
            Some(Node::Leaf { value: Value::Array(mut prefix), .. }) => {
                prefix.extend(items.iter().cloned());
                Node::Leaf {
                    value: Value::Array(prefix),
                    layer: layer.to_string(),
                }
            }
            _ => Node::Leaf {
                value: incoming.clone(),
                layer: layer.to_string(),
            },
        },
        scalar => Node::Leaf {
            value: scalar.clone(),
            layer: layer.to_string(),
        },
    }
}

fn flatten(node: &Node, prefix: &str, out: &mut Vec<ResolvedStandard>) {
    match node {
        Node::Leaf { value, layer } => out.push(ResolvedStandard {
            key: prefix.to_string(),
            value: value.clone(),
            contributing_layer_id: layer.clone(),
        }),
        Node::Dict(children) => {
            for (k, child) in children {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(child, &key, out);
            }
        }
    }
}

fn to_value(node: &Node) -> Value {
    match node {
        Node::Leaf { value, .. } => value.clone(),
        Node::Dict(children) => {
            let map: Map<String, Value> =
                children.iter().map(|(k, v)| (k.clone(), to_value(v))).collect();
            Value::Object(map)
        }
    }
}

/// Cache key over every layer's id and raw bytes, in order.
pub fn cache_key(layers: &[StandardsLayer]) -> String {
    layers
        .iter()
        .fold(PartsHasher::new(), |h, l| {
            h.part(l.layer_id.as_bytes()).part(&l.raw)
        })
        .finish()
}

/// Merge `layers`, ordered low to high precedence (ties keep input order).
pub fn resolve(layers: &[StandardsLayer]) -> Resolution {
    let mut ordered: Vec<&StandardsLayer> = layers.iter().collect();
    ordered.sort_by_key(|l| l.precedence_rank);

    let mut root = Node::Dict(BTreeMap::new());
    for layer in &ordered {
        root = merge(Some(root), &layer.content, &layer.layer_id);
    }

    let mut entries = Vec::new();
    flatten(&root, "", &mut entries);

    Resolution {
        cache_key: cache_key(layers),
        layer_ids: ordered.iter().map(|l| l.layer_id.clone()).collect(),
        tree: to_value(&root),
        entries,
    }
}

impl Resolution {
    /// Value at a dotted key, leaf or subtree.
    pub fn get(&self, key: &str) -> Option<&Value> {
        key.split('.').try_fold(&self.tree, |node, part| node.get(part))
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    /// A list of strings; non-string items are skipped.
    pub fn get_str_list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).and_then(Value::as_array).map(|items| {
            items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
        })
    }

    pub fn attribution(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.contributing_layer_id.as_str())
    }
}
