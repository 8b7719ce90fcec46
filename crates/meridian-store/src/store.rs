use meridian_core::errors::StoreError;
use meridian_core::value::Mapping;
use meridian_core::{KeyPath, OperationKind, Value};
use tracing::trace;

/// The replicated document: a mapping at the root, arbitrary values below.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueStore {
    root: Mapping,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a full document. The root must be a mapping.
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Mapping(root) => Ok(Self { root }),
            other => Err(StoreError::PathTypeError {
                path: "<root>".to_string(),
                expected: "mapping".to_string(),
                found: other.kind_name().to_string(),
            }),
        }
    }

    /// Deep copy of the full document.
    pub fn to_value(&self) -> Value {
        Value::Mapping(self.root.clone())
    }

    pub fn root(&self) -> &Mapping {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Canonical serialization: JSON with key-ordered mappings.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.root)
    }

    /// Look up a value. Missing paths (or paths through non-mappings) yield `None`.
    pub fn get(&self, path: &KeyPath) -> Option<&Value> {
        let (leaf, parents) = split(path);
        let mut current = &self.root;
        for segment in parents {
            current = current.get(segment)?.as_mapping()?;
        }
        current.get(leaf)
    }

    /// Look up a value, falling back to `default` when absent.
    pub fn get_or(&self, path: &KeyPath, default: Value) -> Value {
        self.get(path).cloned().unwrap_or(default)
    }

    pub fn contains(&self, path: &KeyPath) -> bool {
        self.get(path).is_some()
    }

    /// Replace the value at `path`, creating intermediate mappings.
    pub fn set(&mut self, path: &KeyPath, value: Value) -> Result<(), StoreError> {
        let parent = self.parent_mut(path)?;
        parent.insert(path.leaf().to_string(), value);
        trace!(%path, "store set");
        Ok(())
    }

    /// Shallow-merge `partial` into the mapping at `path` (created if absent).
    pub fn update(&mut self, path: &KeyPath, partial: &Mapping) -> Result<(), StoreError> {
        let parent = self.parent_mut(path)?;
        match parent.get_mut(path.leaf()) {
            None => {
                parent.insert(path.leaf().to_string(), Value::Mapping(partial.clone()));
            }
            Some(Value::Mapping(existing)) => {
                existing.extend(partial.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Some(other) => {
                return Err(StoreError::PathTypeError {
                    path: path.to_string(),
                    expected: "mapping".to_string(),
                    found: other.kind_name().to_string(),
                })
            }
        }
        trace!(%path, keys = partial.len(), "store update");
        Ok(())
    }

    /// Remove the value at `path`, returning it. Missing paths are not an error.
    pub fn delete(&mut self, path: &KeyPath) -> Option<Value> {
        let (leaf, parents) = split(path);
        let mut current = &mut self.root;
        for segment in parents {
            current = match current.get_mut(segment) {
                Some(Value::Mapping(child)) => child,
                _ => return None,
            };
        }
        let removed = current.remove(leaf);
        trace!(%path, removed = removed.is_some(), "store delete");
        removed
    }

    /// Push `value` onto the sequence at `path` (created if absent).
    /// Returns the index the value landed at.
    pub fn append(&mut self, path: &KeyPath, value: Value) -> Result<usize, StoreError> {
        self.insert_at(path, usize::MAX, value)
    }

    /// Insert `value` into the sequence at `path` at `index`, clamped to the
    /// sequence length. Creates the sequence if absent.
    pub fn insert_at(
        &mut self,
        path: &KeyPath,
        index: usize,
        value: Value,
    ) -> Result<usize, StoreError> {
        let parent = self.parent_mut(path)?;
        let slot = parent
            .entry(path.leaf().to_string())
            .or_insert_with(|| Value::Sequence(Vec::new()));
        match slot {
            Value::Sequence(items) => {
                let index = index.min(items.len());
                items.insert(index, value);
                Ok(index)
            }
            other => Err(StoreError::AppendOnNonSequence {
                path: path.to_string(),
                found: other.kind_name().to_string(),
            }),
        }
    }

    /// Add `delta` to the number at `path`; an absent value counts as 0.
    /// Returns the new value.
    pub fn increment(&mut self, path: &KeyPath, delta: f64) -> Result<f64, StoreError> {
        let parent = self.parent_mut(path)?;
        match parent.get_mut(path.leaf()) {
            None => {
                parent.insert(path.leaf().to_string(), Value::Number(delta));
                Ok(delta)
            }
            Some(Value::Number(n)) => {
                *n += delta;
                Ok(*n)
            }
            Some(other) => Err(StoreError::IncrementOnNonNumeric {
                path: path.to_string(),
                found: other.kind_name().to_string(),
            }),
        }
    }

    /// Apply the effect of an operation kind at `path`. Appends go to the end.
    pub fn apply(
        &mut self,
        kind: OperationKind,
        path: &KeyPath,
        value: &Value,
    ) -> Result<(), StoreError> {
        match kind {
            OperationKind::Set => self.set(path, value.clone()),
            OperationKind::Delete => {
                self.delete(path);
                Ok(())
            }
            OperationKind::Append => self.append(path, value.clone()).map(|_| ()),
            OperationKind::Increment => {
                let delta = value.as_number().ok_or_else(|| StoreError::PathTypeError {
                    path: path.to_string(),
                    expected: "number delta".to_string(),
                    found: value.kind_name().to_string(),
                })?;
                self.increment(path, delta).map(|_| ())
            }
        }
    }

    /// Dry-run shape check for a write of `kind` at `path`, without mutating.
    pub fn check_write(&self, kind: OperationKind, path: &KeyPath) -> Result<(), StoreError> {
        let (leaf, parents) = split(path);
        let mut current = &self.root;
        let mut walked = Vec::with_capacity(parents.len());
        for segment in parents {
            walked.push(segment.as_str());
            match current.get(segment) {
                None => return Ok(()),
                Some(Value::Mapping(child)) => current = child,
                Some(_) if kind == OperationKind::Delete => return Ok(()),
                Some(other) => {
                    return Err(StoreError::PathTypeError {
                        path: walked.join("."),
                        expected: "mapping".to_string(),
                        found: other.kind_name().to_string(),
                    })
                }
            }
        }
        match (kind, current.get(leaf)) {
            (OperationKind::Append, Some(existing)) if existing.as_sequence().is_none() => {
                Err(StoreError::AppendOnNonSequence {
                    path: path.to_string(),
                    found: existing.kind_name().to_string(),
                })
            }
            (OperationKind::Increment, Some(existing)) if existing.as_number().is_none() => {
                Err(StoreError::IncrementOnNonNumeric {
                    path: path.to_string(),
                    found: existing.kind_name().to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Walk to the mapping that holds the leaf of `path`, creating missing
    /// intermediate mappings.
    fn parent_mut(&mut self, path: &KeyPath) -> Result<&mut Mapping, StoreError> {
        let (_, parents) = split(path);
        let mut current = &mut self.root;
        for (depth, segment) in parents.iter().enumerate() {
            let child = current
                .entry(segment.clone())
                .or_insert_with(Value::empty_mapping);
            current = match child {
                Value::Mapping(map) => map,
                other => {
                    return Err(StoreError::PathTypeError {
                        path: parents[..=depth].join("."),
                        expected: "mapping".to_string(),
                        found: other.kind_name().to_string(),
                    })
                }
            };
        }
        Ok(current)
    }
}

/// Split a path into its leaf segment and the segments leading to it.
fn split(path: &KeyPath) -> (&str, &[String]) {
    match path.segments().split_last() {
        Some((leaf, parents)) => (leaf.as_str(), parents),
        None => ("", &[][..]),
    }
}
