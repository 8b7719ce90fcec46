use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use meridian_core::errors::StoreError;
use meridian_core::{KeyPath, PolicyKind, SyncConfig};

use super::handler::ConflictHandler;

/// The policy bound to a path prefix.
#[derive(Clone)]
pub enum ConflictPolicy {
    Builtin(PolicyKind),
    Custom(Arc<dyn ConflictHandler>),
}

impl ConflictPolicy {
    pub fn is_custom(&self) -> bool {
        matches!(self, ConflictPolicy::Custom(_))
    }
}

impl fmt::Debug for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Builtin(kind) => f.debug_tuple("Builtin").field(kind).finish(),
            ConflictPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Path-prefix policy table. Lookup picks the most specific registered
/// prefix of the operation's path and falls back to the default.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    default: PolicyKind,
    overrides: BTreeMap<KeyPath, ConflictPolicy>,
}

impl PolicyRegistry {
    pub fn new(default: PolicyKind) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    /// Registry seeded with `default_policy` and `path_policies`.
    pub fn from_config(config: &SyncConfig) -> Result<Self, StoreError> {
        let mut registry = Self::new(config.default_policy);
        for (prefix, &kind) in &config.path_policies {
            registry.set_policy(KeyPath::parse(prefix)?, kind);
        }
        Ok(registry)
    }

    pub fn default_policy(&self) -> PolicyKind {
        self.default
    }

    /// Bind a built-in policy to `prefix`, replacing any earlier binding.
    pub fn set_policy(&mut self, prefix: KeyPath, kind: PolicyKind) {
        self.overrides.insert(prefix, ConflictPolicy::Builtin(kind));
    }

    /// Bind a custom handler to `prefix`, replacing any earlier binding.
    pub fn register_handler(&mut self, prefix: KeyPath, handler: Arc<dyn ConflictHandler>) {
        self.overrides.insert(prefix, ConflictPolicy::Custom(handler));
    }

    pub fn policy_for(&self, path: &KeyPath) -> ConflictPolicy {
        self.overrides
            .iter()
            .filter(|(prefix, _)| prefix.is_prefix_of(path))
            .max_by_key(|(prefix, _)| prefix.depth())
            .map(|(_, policy)| policy.clone())
            .unwrap_or(ConflictPolicy::Builtin(self.default))
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new(PolicyKind::default())
    }
}
