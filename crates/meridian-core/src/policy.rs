//! Built-in conflict resolution policies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Policies selectable from configuration. Custom handlers are registered at
/// runtime and have no config representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Greatest `(timestamp, origin)` wins.
    #[default]
    LastWriteWins,
    /// Smallest `(timestamp, origin)` wins.
    FirstWriteWins,
    /// Shallow-merge incoming mapping over the existing mapping.
    Merge,
}

impl PolicyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::LastWriteWins => "last_write_wins",
            PolicyKind::FirstWriteWins => "first_write_wins",
            PolicyKind::Merge => "merge",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last_write_wins" | "lww" => Ok(PolicyKind::LastWriteWins),
            "first_write_wins" | "fww" => Ok(PolicyKind::FirstWriteWins),
            "merge" => Ok(PolicyKind::Merge),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}
