//! Configuration for a replicated node.
//!
//! Resolution order (highest priority first):
//! 1. Environment variables (`MERIDIAN_*`)
//! 2. TOML file passed to [`SyncConfig::load`]
//! 3. Compiled defaults
//!
//! # Examples
//!
//! ```
//! use meridian_core::{PolicyKind, SyncConfig};
//!
//! let config = SyncConfig::default();
//! assert!((config.conflict_window_secs - 1.0).abs() < f64::EPSILON);
//! assert_eq!(config.default_policy, PolicyKind::LastWriteWins);
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults;
use crate::constants::CONFIG_ENV_PREFIX;
use crate::errors::ConfigError;
use crate::path::KeyPath;
use crate::policy::PolicyKind;

/// Configuration for a single `NodeState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Timestamp distance within which same-path writes from different
    /// origins are treated as concurrent. Approximate: this is a wall-clock
    /// heuristic, not a causality proof. Default: 1.0.
    pub conflict_window_secs: f64,
    /// Policy used when no path-specific override matches. Default: last_write_wins.
    pub default_policy: PolicyKind,
    /// Path-prefix policy overrides, e.g. `"users" = "first_write_wins"`.
    pub path_policies: BTreeMap<String, PolicyKind>,
    /// Maximum operations held while waiting for dependencies. Default: 1024.
    pub max_pending_operations: usize,
    /// Seconds an operation may wait for dependencies before it is discarded. Default: 30.
    pub max_pending_wait_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            conflict_window_secs: defaults::DEFAULT_CONFLICT_WINDOW_SECS,
            default_policy: defaults::DEFAULT_POLICY,
            path_policies: BTreeMap::new(),
            max_pending_operations: defaults::DEFAULT_MAX_PENDING_OPERATIONS,
            max_pending_wait_secs: defaults::DEFAULT_MAX_PENDING_WAIT_SECS,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file, then apply `MERIDIAN_*` overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let mut config: SyncConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (for testing and embedding).
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply `MERIDIAN_*` overrides from an arbitrary key/value source.
    /// Unknown keys are ignored.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(CONFIG_ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref();
            match name {
                "CONFLICT_WINDOW_SECS" => {
                    self.conflict_window_secs = parse_field("conflict_window_secs", value)?;
                }
                "DEFAULT_POLICY" => {
                    self.default_policy =
                        value
                            .parse()
                            .map_err(|message| ConfigError::ValidationFailed {
                                field: "default_policy".to_string(),
                                message,
                            })?;
                }
                "MAX_PENDING_OPERATIONS" => {
                    self.max_pending_operations = parse_field("max_pending_operations", value)?;
                }
                "MAX_PENDING_WAIT_SECS" => {
                    self.max_pending_wait_secs = parse_field("max_pending_wait_secs", value)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.conflict_window_secs.is_finite() || self.conflict_window_secs < 0.0 {
            return Err(ConfigError::ValidationFailed {
                field: "conflict_window_secs".to_string(),
                message: "must be a finite, non-negative number".to_string(),
            });
        }
        for prefix in self.path_policies.keys() {
            KeyPath::parse(prefix).map_err(|e| ConfigError::ValidationFailed {
                field: format!("path_policies.{prefix}"),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    pub fn max_pending_wait(&self) -> Duration {
        Duration::from_secs(self.max_pending_wait_secs)
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::ValidationFailed {
            field: field.to_string(),
            message: format!("cannot parse {raw:?}"),
        })
}
