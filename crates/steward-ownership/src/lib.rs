//! Ownership classification: path -> tier by most-specific glob match.
//!
//! Rules come from `ownership-map.json` and are compiled once. `classify` is a
//! pure function over the compiled set. Specificity is the length of the
//! literal prefix before the first wildcard; equally specific matches resolve
//! by tier precedence (system > project > team > framework).

use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::path::Path;
use steward_core::{Error, Result, Tier};
use tracing::{debug, warn};

const WILDCARDS: &[char] = &['*', '?', '[', '{'];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipRule {
    pub glob_pattern: String,
    pub tier: Tier,
}

impl OwnershipRule {
    pub fn new(glob_pattern: impl Into<String>, tier: Tier) -> Self {
        Self {
            glob_pattern: glob_pattern.into(),
            tier,
        }
    }
}

/// On-disk shape of `ownership-map.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OwnershipMap {
    pub rules: Vec<OwnershipRule>,
}

impl OwnershipMap {
    /// Rules used when a repository has no ownership map of its own.
    pub fn builtin() -> Self {
        Self {
            rules: vec![
                OwnershipRule::new("**", Tier::Framework),
                OwnershipRule::new("standards/framework/**", Tier::Framework),
                OwnershipRule::new("standards/team/**", Tier::Team),
                OwnershipRule::new("standards/project/**", Tier::Project),
                OwnershipRule::new("context/**", Tier::Project),
                OwnershipRule::new(".steward/**", Tier::System),
                OwnershipRule::new("hooks/**", Tier::System),
            ],
        }
    }
}

/// Which write is being attempted on a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteAction {
    /// Seeding a file that does not exist yet.
    Create,
    /// Replacing existing content with the canonical version.
    Update,
}

impl std::fmt::Display for WriteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Update => f.write_str("update"),
        }
    }
}

struct CompiledRule {
    rule: OwnershipRule,
    matcher: GlobMatcher,
    specificity: usize,
}

pub struct Classifier {
    rules: Vec<CompiledRule>,
    strict: bool,
}

impl Classifier {
    pub fn new(map: OwnershipMap, strict: bool) -> Result<Self> {
        Self::compile(map, strict, Path::new("<ownership-map>"))
    }

    /// Load `ownership-map.json`. A missing file falls back to the builtin rules;
    /// a malformed file or an invalid glob is a configuration error.
    pub fn load(path: &Path, strict: bool) -> Result<Self> {
        let map = match steward_core::fsio::read_json_opt::<OwnershipMap>(path)? {
            Some(map) => map,
            None => {
                warn!(path = %path.display(), "no ownership map, using builtin rules");
                OwnershipMap::builtin()
            }
        };
        Self::compile(map, strict, path)
    }

    fn compile(map: OwnershipMap, strict: bool, origin: &Path) -> Result<Self> {
        let mut rules = Vec::with_capacity(map.rules.len());
        for rule in map.rules {
            let glob = GlobBuilder::new(&rule.glob_pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    Error::config(origin, format!("invalid glob {:?}: {e}", rule.glob_pattern))
                })?;
            rules.push(CompiledRule {
                specificity: specificity(&rule.glob_pattern),
                matcher: glob.compile_matcher(),
                rule,
            });
        }
        debug!(rules = rules.len(), strict, "ownership rules compiled");
        Ok(Self { rules, strict })
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn rules(&self) -> impl Iterator<Item = &OwnershipRule> {
        self.rules.iter().map(|r| &r.rule)
    }

    /// The winning rule for `path`, if any rule covers it.
    pub fn matching_rule(&self, path: &str) -> Option<&OwnershipRule> {
        let path = normalize(path);
        self.rules
            .iter()
            .filter(|r| r.matcher.is_match(&path))
            .max_by_key(|r| (r.specificity, r.rule.tier.precedence()))
            .map(|r| &r.rule)
    }

    pub fn classify(&self, path: &str) -> Result<Tier> {
        match self.matching_rule(path) {
            Some(rule) => Ok(rule.tier),
            None if self.strict => Err(Error::UnclassifiedPath(normalize(path))),
            None => Ok(Tier::Framework),
        }
    }

    /// Classify `path` and reject framework-driven updates of user-owned files.
    pub fn ensure_permits(&self, path: &str, action: WriteAction) -> Result<Tier> {
        let tier = self.classify(path)?;
        if action == WriteAction::Update && tier.is_user_owned() {
            return Err(Error::ownership_violation(
                normalize(path),
                tier,
                action.to_string(),
            ));
        }
        Ok(tier)
    }
}

/// Length of the literal prefix before the first wildcard.
pub fn specificity(pattern: &str) -> usize {
    pattern.find(WILDCARDS).unwrap_or(pattern.len())
}

/// Forward slashes, no leading `./`.
pub fn normalize(path: &str) -> String {
    let p = path.replace('\\', "/");
    let mut s = p.as_str();
    while let Some(rest) = s.strip_prefix("./") {
        s = rest;
    }
    s.to_string()
}
