//! Operations, the unit of mutation exchanged between nodes.
//!
//! An [`Operation`] is immutable once built: fields are private and only the
//! builder methods on an owned value can set them. The serde representation is
//! the wire record consumed by the transport layer:
//!
//! ```json
//! { "op_id": "…", "kind": "set", "path": "users.alice.status",
//!   "value": "online", "origin": "node-a", "version": 3,
//!   "timestamp": 1717171717.25, "dependencies": [] }
//! ```

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path::KeyPath;
use crate::time::now_secs;
use crate::value::Value;

/// The four mutation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Set,
    Delete,
    Append,
    Increment,
}

impl OperationKind {
    /// Set and delete replace whatever the path held.
    pub fn overwrites(self) -> bool {
        matches!(self, OperationKind::Set | OperationKind::Delete)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Set => "set",
            OperationKind::Delete => "delete",
            OperationKind::Append => "append",
            OperationKind::Increment => "increment",
        };
        f.write_str(name)
    }
}

/// A single mutation of the shared document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "op_id")]
    id: String,
    kind: OperationKind,
    path: KeyPath,
    #[serde(default)]
    value: Value,
    origin: String,
    version: u64,
    timestamp: f64,
    #[serde(default)]
    dependencies: Vec<String>,
}

impl Operation {
    /// Create an operation with a fresh UUID and the current wall-clock time.
    pub fn new(
        kind: OperationKind,
        path: KeyPath,
        value: Value,
        origin: impl Into<String>,
        version: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            path,
            value,
            origin: origin.into(),
            version,
            timestamp: now_secs(),
            dependencies: Vec::new(),
        }
    }

    /// Override the generated id (replay from durable storage, tests).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn path(&self) -> &KeyPath {
        &self.path
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn depends_on(&self, op_id: &str) -> bool {
        self.dependencies.iter().any(|d| d == op_id)
    }

    /// Structural validation independent of any store state.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("operation id is empty".to_string());
        }
        if self.origin.is_empty() {
            return Err("origin is empty".to_string());
        }
        if self.version == 0 {
            return Err("version must be at least 1".to_string());
        }
        if !self.timestamp.is_finite() {
            return Err(format!("timestamp {} is not finite", self.timestamp));
        }
        if self.kind == OperationKind::Increment {
            match self.value.as_number() {
                Some(delta) if delta.is_finite() => {}
                Some(delta) => return Err(format!("increment delta {delta} is not finite")),
                None => {
                    return Err(format!(
                        "increment delta must be a number, got {}",
                        self.value.kind_name()
                    ))
                }
            }
        }
        // JSON cannot encode NaN or infinities.
        if !self.value.is_finite() {
            return Err("value contains a non-finite number".to_string());
        }
        if self.depends_on(&self.id) {
            return Err("operation depends on itself".to_string());
        }
        Ok(())
    }

    /// Total order used for deterministic conflict resolution:
    /// timestamp, then origin, then id.
    pub fn cmp_write_order(&self, other: &Self) -> Ordering {
        self.timestamp
            .total_cmp(&other.timestamp)
            .then_with(|| self.origin.cmp(&other.origin))
            .then_with(|| self.id.cmp(&other.id))
    }
}
