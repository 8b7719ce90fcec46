//! Append-only operation log.
//!
//! Every operation the node has adjudicated is kept here, whether or not its
//! effect reached the store, so replays are recognised by id and
//! dependencies can be satisfied by losing writes too. Resolution records
//! are interleaved with the operations they decided.
//!
//! Logged operations never change. What an entry contributes to the store
//! does: a later overwrite of the path clears it, a write to an ancestor
//! supersedes it, and a re-derived conflict can reinstate or drop it. The
//! `effect` field always describes the store as it is now.

use std::collections::HashMap;

use meridian_core::{KeyPath, Operation, OperationKind};
use serde::{Deserialize, Serialize};

use crate::conflict::ResolutionRecord;

/// A logged operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEntry {
    pub operation: Operation,
    /// Kind of the effect this entry currently contributes to the store,
    /// `None` when it lost its conflict or was overwritten since.
    pub effect: Option<OperationKind>,
    /// Set once a write to an ancestor path replaced this entry's subtree.
    /// Superseded entries take no further part in detection or replay.
    #[serde(default)]
    pub superseded: bool,
    /// Operation a custom handler synthesized in place of `operation`. Its
    /// effect, not the logged operation's, is the one in the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<Operation>,
    /// Position among logged operations, starting at 0.
    pub sequence: u64,
}

impl OperationEntry {
    pub fn applied(&self) -> bool {
        self.effect.is_some()
    }

    /// The operation whose effect this entry stands for.
    pub fn effective_operation(&self) -> &Operation {
        self.replacement.as_ref().unwrap_or(&self.operation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum LogEntry {
    Operation(OperationEntry),
    Resolution(ResolutionRecord),
}

#[derive(Debug, Default)]
pub struct OperationLog {
    entries: Vec<LogEntry>,
    by_id: HashMap<String, usize>,
    /// Replacement ids, which are not operation ids and never deduplicate.
    by_replacement: HashMap<String, usize>,
    by_path: HashMap<KeyPath, Vec<usize>>,
    resolution_count: usize,
    /// Entries below this index predate the current store contents.
    barrier: usize,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation. Returns `false` (and logs nothing) if the id is
    /// already present.
    pub fn append_operation(
        &mut self,
        operation: Operation,
        effect: Option<OperationKind>,
    ) -> bool {
        self.push_entry(operation, effect, None)
    }

    /// Append an operation whose store effect came from `replacement`.
    pub fn append_replaced(&mut self, operation: Operation, replacement: Operation) -> bool {
        let effect = Some(replacement.kind());
        self.push_entry(operation, effect, Some(replacement))
    }

    fn push_entry(
        &mut self,
        operation: Operation,
        effect: Option<OperationKind>,
        replacement: Option<Operation>,
    ) -> bool {
        if self.by_id.contains_key(operation.id()) {
            return false;
        }
        let index = self.entries.len();
        let sequence = self.by_id.len() as u64;
        self.by_id.insert(operation.id().to_string(), index);
        if let Some(replacement) = &replacement {
            self.by_replacement
                .insert(replacement.id().to_string(), index);
        }
        self.by_path
            .entry(operation.path().clone())
            .or_default()
            .push(index);
        self.entries.push(LogEntry::Operation(OperationEntry {
            operation,
            effect,
            superseded: false,
            replacement,
            sequence,
        }));
        true
    }

    pub fn record_resolution(&mut self, record: ResolutionRecord) {
        self.resolution_count += 1;
        self.entries.push(LogEntry::Resolution(record));
    }

    pub fn contains(&self, op_id: &str) -> bool {
        self.by_id.contains_key(op_id)
    }

    pub fn get(&self, op_id: &str) -> Option<&OperationEntry> {
        self.by_id.get(op_id).and_then(|&index| self.operation_at(index))
    }

    /// The entry for `id`, which may be a logged operation or a replacement
    /// a custom handler synthesized.
    pub fn find(&self, id: &str) -> Option<&OperationEntry> {
        self.get(id).or_else(|| {
            self.by_replacement
                .get(id)
                .and_then(|&index| self.operation_at(index))
        })
    }

    /// Dependencies of `operation` that are not in the log yet.
    pub fn missing_dependencies(&self, operation: &Operation) -> Vec<String> {
        operation
            .dependencies()
            .iter()
            .filter(|id| !self.contains(id))
            .cloned()
            .collect()
    }

    /// All logged operations on exactly `path`, oldest first.
    pub fn operations_on<'a>(
        &'a self,
        path: &KeyPath,
    ) -> impl Iterator<Item = &'a OperationEntry> + 'a {
        self.entries_on(path, 0)
    }

    /// Operations on `path` logged since the last snapshot import.
    pub fn current_operations_on<'a>(
        &'a self,
        path: &KeyPath,
    ) -> impl Iterator<Item = &'a OperationEntry> + 'a {
        self.entries_on(path, self.barrier)
    }

    /// Current operations on `path` that no ancestor write has superseded.
    pub fn live_operations_on<'a>(
        &'a self,
        path: &KeyPath,
    ) -> impl Iterator<Item = &'a OperationEntry> + 'a {
        self.current_operations_on(path)
            .filter(|entry| !entry.superseded)
    }

    /// Applied appends on `path` since the sequence there was last replaced.
    /// Their items make up the tail of the stored sequence.
    pub fn appends_since_reset<'a>(
        &'a self,
        path: &KeyPath,
    ) -> impl Iterator<Item = &'a Operation> + 'a {
        self.live_operations_on(path)
            .filter(|entry| entry.effect == Some(OperationKind::Append))
            .map(|entry| &entry.operation)
    }

    /// Record that `path` was replaced wholesale: entries on it no longer
    /// contribute, and entries below it are superseded.
    pub fn mark_overwritten(&mut self, path: &KeyPath) {
        for index in self.live_indexes(path) {
            if let Some(entry) = self.operation_at_mut(index) {
                entry.effect = None;
            }
        }
        self.supersede_descendants(path);
    }

    /// Supersede every current entry strictly below `path`.
    pub fn supersede_descendants(&mut self, path: &KeyPath) {
        let below: Vec<usize> = self
            .by_path
            .iter()
            .filter(|(other, _)| *other != path && path.is_prefix_of(other))
            .flat_map(|(_, indexes)| indexes.iter().copied())
            .filter(|&index| index >= self.barrier)
            .collect();
        for index in below {
            if let Some(entry) = self.operation_at_mut(index) {
                entry.effect = None;
                entry.superseded = true;
            }
        }
    }

    /// After `path` was re-derived, exactly the live entries named in
    /// `applied` contribute to it.
    pub fn revise_effects(&mut self, path: &KeyPath, applied: &[String]) {
        for index in self.live_indexes(path) {
            if let Some(entry) = self.operation_at_mut(index) {
                let kind = entry.effective_operation().kind();
                let in_effect = applied.iter().any(|id| id == entry.operation.id());
                entry.effect = in_effect.then_some(kind);
            }
        }
    }

    /// Overwrite the effect of one logged operation.
    pub fn set_effect(&mut self, op_id: &str, effect: Option<OperationKind>) {
        if let Some(&index) = self.by_id.get(op_id) {
            if let Some(entry) = self.operation_at_mut(index) {
                entry.effect = effect;
            }
        }
    }

    pub fn resolutions(&self) -> impl Iterator<Item = &ResolutionRecord> {
        self.entries.iter().filter_map(|entry| match entry {
            LogEntry::Resolution(record) => Some(record),
            LogEntry::Operation(_) => None,
        })
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Total entries, resolutions included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn operation_count(&self) -> usize {
        self.by_id.len()
    }

    pub fn resolution_count(&self) -> usize {
        self.resolution_count
    }

    /// Mark everything logged so far as predating the current store contents.
    pub fn mark_barrier(&mut self) {
        self.barrier = self.entries.len();
    }

    fn operation_at(&self, index: usize) -> Option<&OperationEntry> {
        match self.entries.get(index) {
            Some(LogEntry::Operation(entry)) => Some(entry),
            _ => None,
        }
    }

    fn operation_at_mut(&mut self, index: usize) -> Option<&mut OperationEntry> {
        match self.entries.get_mut(index) {
            Some(LogEntry::Operation(entry)) => Some(entry),
            _ => None,
        }
    }

    fn entries_on<'a>(
        &'a self,
        path: &KeyPath,
        floor: usize,
    ) -> impl Iterator<Item = &'a OperationEntry> + 'a {
        self.by_path
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter(move |&&index| index >= floor)
            .filter_map(move |&index| self.operation_at(index))
    }

    fn live_indexes(&self, path: &KeyPath) -> Vec<usize> {
        self.by_path
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(|&index| index >= self.barrier)
            .filter(|&index| self.operation_at(index).is_some_and(|entry| !entry.superseded))
            .collect()
    }
}
