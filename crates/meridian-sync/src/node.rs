//! NodeState: one replica of the shared document.
//!
//! A node exclusively owns its store, operation log, vector clock, outbound
//! queue, pending buffer and policy table. All of it sits behind a single
//! task-fair `parking_lot::RwLock`: mutations (local writes, received
//! batches, snapshot imports) take the write lock and run start to finish
//! inside it, reads take the read lock. Nothing inside the lock performs I/O
//! or blocks on anything else.
//!
//! Every store change is logged inside the same write section that makes
//! it, so no reader can observe state the log does not explain. Sync
//! subscribers are notified after the lock is released.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use meridian_core::errors::{ConfigError, StoreError, SyncError};
use meridian_core::time::now_secs;
use meridian_core::value::Mapping;
use meridian_core::{
    KeyPath, MeridianResult, Operation, OperationKind, PolicyKind, SyncConfig, Value,
};
use meridian_crdt::conflict::append::ordered_position;
use meridian_crdt::{
    ConflictDetector, ConflictHandler, ConflictResolver, OperationEntry, OperationLog,
    PolicyRegistry, Resolution, ResolutionRecord, ResolutionStrategy, VectorClock,
};
use meridian_store::ValueStore;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::notify::SyncNotifier;
use crate::pending::PendingBuffer;
use crate::report::{ApplyStatus, BatchReport, OperationResult};
use crate::snapshot::{SnapshotManager, SyncSnapshot};

/// Wall-clock source for local operation timestamps.
pub type TimeSource = Arc<dyn Fn() -> f64 + Send + Sync>;

pub struct NodeState {
    origin: String,
    config: SyncConfig,
    detector: ConflictDetector,
    time_source: TimeSource,
    inner: RwLock<NodeInner>,
    notifier: SyncNotifier,
}

struct NodeInner {
    store: ValueStore,
    log: OperationLog,
    clock: VectorClock,
    /// Number of applied state changes.
    version: u64,
    outbound: Vec<Operation>,
    pending: PendingBuffer,
    policies: PolicyRegistry,
    /// Clock of the last imported snapshot; operations it covers are
    /// already reflected in the store.
    imported: VectorClock,
}

impl NodeState {
    /// A node with the default configuration.
    pub fn new(origin: impl Into<String>) -> MeridianResult<Self> {
        Self::with_config(origin, SyncConfig::default())
    }

    pub fn with_config(origin: impl Into<String>, config: SyncConfig) -> MeridianResult<Self> {
        let origin = origin.into();
        if origin.is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "origin".to_string(),
                message: "node origin must not be empty".to_string(),
            }
            .into());
        }
        config.validate()?;
        let policies = PolicyRegistry::from_config(&config)?;
        let inner = NodeInner {
            store: ValueStore::new(),
            log: OperationLog::new(),
            clock: VectorClock::new(),
            version: 0,
            outbound: Vec::new(),
            pending: PendingBuffer::new(config.max_pending_operations, config.max_pending_wait()),
            policies,
            imported: VectorClock::new(),
        };
        debug!(%origin, window = config.conflict_window_secs, "node created");
        Ok(Self {
            detector: ConflictDetector::new(config.conflict_window_secs),
            origin,
            config,
            time_source: Arc::new(now_secs),
            inner: RwLock::new(inner),
            notifier: SyncNotifier::new(),
        })
    }

    /// Replace the clock used to timestamp local operations.
    pub fn with_time_source<F>(mut self, source: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.time_source = Arc::new(source);
        self
    }

    // -------------------------------------------------------------------------
    // Local mutations
    // -------------------------------------------------------------------------

    pub fn set(&self, path: &str, value: impl Into<Value>) -> MeridianResult<Operation> {
        self.commit_local(OperationKind::Set, path, value.into())
    }

    /// Shallow-merge `partial` into the mapping at `path`. Recorded and
    /// relayed as a set of the merged mapping.
    pub fn update(&self, path: &str, partial: Mapping) -> MeridianResult<Operation> {
        let _span = meridian_core::local_write_span!(self.origin, OperationKind::Set, path).entered();
        let path = KeyPath::parse(path)?;
        let mut inner = self.inner.write();
        let merged = match inner.store.get(&path) {
            None => partial,
            Some(Value::Mapping(existing)) => {
                let mut merged = existing.clone();
                merged.extend(partial);
                merged
            }
            Some(other) => {
                return Err(StoreError::PathTypeError {
                    path: path.to_string(),
                    expected: "mapping".to_string(),
                    found: other.kind_name().to_string(),
                }
                .into())
            }
        };
        self.commit_locked(&mut inner, OperationKind::Set, path, Value::Mapping(merged))
    }

    pub fn delete(&self, path: &str) -> MeridianResult<Operation> {
        self.commit_local(OperationKind::Delete, path, Value::Null)
    }

    pub fn append(&self, path: &str, value: impl Into<Value>) -> MeridianResult<Operation> {
        self.commit_local(OperationKind::Append, path, value.into())
    }

    pub fn increment(&self, path: &str, delta: f64) -> MeridianResult<Operation> {
        self.commit_local(OperationKind::Increment, path, Value::Number(delta))
    }

    fn commit_local(
        &self,
        kind: OperationKind,
        path: &str,
        value: Value,
    ) -> MeridianResult<Operation> {
        let _span = meridian_core::local_write_span!(self.origin, kind, path).entered();
        let path = KeyPath::parse(path)?;
        let mut inner = self.inner.write();
        self.commit_locked(&mut inner, kind, path, value)
    }

    /// Build, integrate and queue a local operation. Fails before the
    /// operation exists (and before a version is taken) if the write cannot
    /// apply.
    fn commit_locked(
        &self,
        inner: &mut NodeInner,
        kind: OperationKind,
        path: KeyPath,
        value: Value,
    ) -> MeridianResult<Operation> {
        inner.store.check_write(kind, &path)?;
        let dependencies = inner.causal_dependencies(&path, &self.origin);
        let version = inner.clock.get(&self.origin) + 1;
        let operation = Operation::new(kind, path, value, self.origin.as_str(), version)
            .with_timestamp((self.time_source)())
            .with_dependencies(dependencies);
        operation
            .validate()
            .map_err(|reason| SyncError::InvalidOperation {
                op_id: operation.id().to_string(),
                reason,
            })?;

        inner.integrate(operation.clone(), &self.detector)?;
        inner.clock.record_local(&self.origin);
        inner.outbound.push(operation.clone());
        debug!(
            op_id = operation.id(),
            kind = %operation.kind(),
            path = %operation.path(),
            version,
            "local operation committed"
        );
        Ok(operation)
    }

    // -------------------------------------------------------------------------
    // Transport boundary
    // -------------------------------------------------------------------------

    /// Local operations not yet harvested for relay. `clear` empties the queue.
    pub fn get_pending_operations(&self, clear: bool) -> Vec<Operation> {
        if clear {
            std::mem::take(&mut self.inner.write().outbound)
        } else {
            self.inner.read().outbound.clone()
        }
    }

    /// Integrate a batch of remote operations.
    ///
    /// Each operation is handled independently: a failure is recorded in the
    /// report and processing continues. Subscribers are notified once, after
    /// the batch, outside the lock.
    pub fn receive_operations(&self, batch: Vec<Operation>) -> BatchReport {
        self.receive_items(batch.into_iter().map(Ok).collect())
    }

    /// Decode a JSON array of operation wire records and integrate it.
    /// Elements that do not decode are rejected individually.
    pub fn receive_wire_batch(&self, json: &str) -> MeridianResult<BatchReport> {
        let elements: Vec<serde_json::Value> = serde_json::from_str(json)?;
        let items = elements.into_iter().map(decode_wire_record).collect();
        Ok(self.receive_items(items))
    }

    fn receive_items(&self, items: Vec<Result<Operation, OperationResult>>) -> BatchReport {
        let _span = meridian_core::sync_batch_span!(self.origin, items.len()).entered();
        let mut report = BatchReport::default();
        {
            let mut inner = self.inner.write();
            report.discarded = inner.evict_expired();
            for item in items {
                let operation = match item {
                    Ok(operation) => operation,
                    Err(undecodable) => {
                        report.results.push(undecodable);
                        continue;
                    }
                };
                let op_id = operation.id().to_string();
                let status = inner.process_remote(operation, &self.detector);
                let progressed =
                    matches!(status, ApplyStatus::Applied | ApplyStatus::Resolved { .. });
                report.results.push(OperationResult::new(op_id, status));
                if progressed {
                    let released = inner.release_ready(&self.detector);
                    report.released.extend(released);
                }
            }
            info!(
                origin = %self.origin,
                received = report.results.len(),
                logged = report.logged_count(),
                released = report.released.len(),
                discarded = report.discarded.len(),
                pending = inner.pending.len(),
                "batch received"
            );
            if self.notifier.subscriber_count() > 0 {
                self.notifier.enqueue(inner.store.to_value());
            }
        }
        self.notifier.drain();
        report
    }

    /// Bind a custom handler to every path under `path_prefix`.
    pub fn register_conflict_handler<H>(&self, path_prefix: &str, handler: H) -> MeridianResult<()>
    where
        H: ConflictHandler + 'static,
    {
        let prefix = KeyPath::parse(path_prefix)?;
        self.inner
            .write()
            .policies
            .register_handler(prefix, Arc::new(handler));
        Ok(())
    }

    /// Bind a built-in policy to every path under `path_prefix`.
    pub fn set_path_policy(&self, path_prefix: &str, kind: PolicyKind) -> MeridianResult<()> {
        let prefix = KeyPath::parse(path_prefix)?;
        self.inner.write().policies.set_policy(prefix, kind);
        Ok(())
    }

    /// Subscribe to sync completion. Called with the store contents after
    /// every received batch, with no lock held.
    pub fn on_sync<F>(&self, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.notifier.subscribe(Arc::new(callback));
    }

    // -------------------------------------------------------------------------
    // Snapshots
    // -------------------------------------------------------------------------

    pub fn export_snapshot(&self) -> MeridianResult<SyncSnapshot> {
        let inner = self.inner.read();
        SnapshotManager::export(&inner.store, inner.version, &inner.clock)
    }

    /// Replace store, version and clock with the snapshot's, as one unit.
    ///
    /// On any failure the node is untouched. The log is kept so replays stay
    /// idempotent, and received operations the snapshot's clock already
    /// covers are reported as already applied. History before the import no
    /// longer drives conflict detection or append placement. This node's own
    /// clock entry never moves backwards.
    pub fn import_snapshot(&self, snapshot: &SyncSnapshot) -> MeridianResult<()> {
        let _span = meridian_core::snapshot_import_span!(self.origin, snapshot.version).entered();
        let store = SnapshotManager::restore(snapshot).inspect_err(|err| {
            warn!(origin = %self.origin, error = %err, "snapshot import rejected");
        })?;
        let mut inner = self.inner.write();
        let mut clock = snapshot.vector_clock.clone();
        clock.observe(&self.origin, inner.clock.get(&self.origin));
        inner.store = store;
        inner.version = snapshot.version;
        inner.clock = clock;
        inner.imported = snapshot.vector_clock.clone();
        inner.log.mark_barrier();
        info!(
            origin = %self.origin,
            version = snapshot.version,
            origins = inner.clock.len(),
            "snapshot imported"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Value at `path`, or `default` when absent or when `path` is malformed.
    pub fn get(&self, path: &str, default: Value) -> Value {
        let Ok(path) = KeyPath::parse(path) else {
            return default;
        };
        self.inner.read().store.get_or(&path, default)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn version(&self) -> u64 {
        self.inner.read().version
    }

    pub fn vector_clock(&self) -> VectorClock {
        self.inner.read().clock.clone()
    }

    /// Deep copy of the whole document.
    pub fn state(&self) -> Value {
        self.inner.read().store.to_value()
    }

    /// Log entries, resolution records included.
    pub fn log_len(&self) -> usize {
        self.inner.read().log.len()
    }

    pub fn operation_count(&self) -> usize {
        self.inner.read().log.operation_count()
    }

    /// Log entry for an operation id, or for a replacement a custom handler
    /// synthesized.
    pub fn log_entry(&self, op_id: &str) -> Option<OperationEntry> {
        self.inner.read().log.find(op_id).cloned()
    }

    pub fn contains_operation(&self, op_id: &str) -> bool {
        self.inner.read().log.contains(op_id)
    }

    pub fn resolutions(&self) -> Vec<ResolutionRecord> {
        self.inner.read().log.resolutions().cloned().collect()
    }

    /// Operations parked waiting for dependencies.
    pub fn pending_dependency_count(&self) -> usize {
        self.inner.read().pending.len()
    }

    /// True iff every dependency of `operation` is already logged.
    pub fn is_causally_ready(&self, operation: &Operation) -> bool {
        self.inner.read().log.missing_dependencies(operation).is_empty()
    }

    /// Fold a remote clock into this node's clock.
    pub fn merge_clock(&self, remote: &VectorClock) {
        self.inner.write().clock.merge(remote);
    }
}

impl NodeInner {
    /// Full pipeline for one remote operation.
    fn process_remote(&mut self, operation: Operation, detector: &ConflictDetector) -> ApplyStatus {
        if self.log.contains(operation.id()) {
            debug!(op_id = operation.id(), "operation already applied");
            return ApplyStatus::AlreadyApplied;
        }
        if let Err(reason) = operation.validate() {
            debug!(op_id = operation.id(), %reason, "rejecting invalid operation");
            return ApplyStatus::Rejected {
                reason: SyncError::InvalidOperation {
                    op_id: operation.id().to_string(),
                    reason,
                }
                .into(),
            };
        }
        if operation.version() <= self.imported.get(operation.origin()) {
            debug!(op_id = operation.id(), "operation covered by imported snapshot");
            return ApplyStatus::AlreadyApplied;
        }
        if self.pending.contains(operation.id()) {
            return ApplyStatus::Buffered {
                missing: self.log.missing_dependencies(&operation),
            };
        }

        let missing = self.log.missing_dependencies(&operation);
        if !missing.is_empty() {
            let op_id = operation.id().to_string();
            return match self.pending.push(operation) {
                Ok(()) => ApplyStatus::Buffered { missing },
                Err(_) => {
                    warn!(
                        %op_id,
                        ?missing,
                        capacity = self.pending.capacity(),
                        "pending buffer full, discarding operation"
                    );
                    ApplyStatus::Rejected {
                        reason: SyncError::DependencyNotSatisfied { op_id, missing }.into(),
                    }
                }
            };
        }

        let origin = operation.origin().to_string();
        let version = operation.version();
        let op_id = operation.id().to_string();
        match self.integrate(operation, detector) {
            Ok(status) => {
                self.clock.observe(&origin, version);
                debug!(%op_id, %origin, version, "remote operation integrated");
                status
            }
            Err(err) => {
                debug!(%op_id, error = %err, "remote operation does not fit the store");
                ApplyStatus::Rejected { reason: err.into() }
            }
        }
    }

    /// Conflict detection, resolution, store write and log append for a
    /// causally ready operation. Does not touch the clock.
    fn integrate(
        &mut self,
        operation: Operation,
        detector: &ConflictDetector,
    ) -> Result<ApplyStatus, StoreError> {
        self.store.check_write(operation.kind(), operation.path())?;
        let conflicts = detector.find_conflicts(&self.log, &operation);

        if conflicts.is_empty() {
            self.write_effect(&operation, &operation)?;
            if operation.kind().overwrites() {
                self.log.mark_overwritten(operation.path());
            }
            let concurrent = detector.concurrent_appends(&self.log, &operation);
            let record = (!concurrent.is_empty()).then(|| {
                ResolutionRecord::new(
                    &operation,
                    &concurrent,
                    operation.id(),
                    ResolutionStrategy::OrderedAppend,
                )
            });
            let kind = operation.kind();
            self.log.append_operation(operation, Some(kind));
            self.version += 1;
            return Ok(match record {
                Some(record) => {
                    self.log.record_resolution(record.clone());
                    ApplyStatus::Resolved {
                        record,
                        applied: true,
                    }
                }
                None => ApplyStatus::Applied,
            });
        }

        let outcome = {
            let store = &self.store;
            ConflictResolver::new(&self.policies, detector).resolve(
                &self.log,
                &operation,
                &conflicts,
                |candidate| {
                    store
                        .check_write(candidate.kind(), candidate.path())
                        .map_err(|err| err.to_string())
                },
            )
        };
        let path = operation.path().clone();
        let (applied, changed) = match outcome.resolution {
            Resolution::Settle(settlement) => {
                let applied = settlement.is_applied(operation.id());
                let before: BTreeSet<&str> = self
                    .log
                    .live_operations_on(&path)
                    .filter(|entry| entry.applied())
                    .map(|entry| entry.operation.id())
                    .collect();
                let after: BTreeSet<&str> = settlement
                    .applied
                    .iter()
                    .map(String::as_str)
                    .filter(|id| *id != operation.id())
                    .collect();
                let changed = applied || before != after;
                if changed {
                    match settlement.value {
                        Some(value) => self.store.set(&path, value)?,
                        None => {
                            self.store.delete(&path);
                        }
                    }
                    self.log.supersede_descendants(&path);
                }
                let kind = operation.kind();
                self.log
                    .append_operation(operation, applied.then_some(kind));
                self.log.revise_effects(&path, &settlement.applied);
                (applied, changed)
            }
            Resolution::ApplyIncoming => {
                self.write_effect(&operation, &operation)?;
                if operation.kind().overwrites() {
                    self.log.mark_overwritten(&path);
                }
                let kind = operation.kind();
                self.log.append_operation(operation, Some(kind));
                (true, true)
            }
            Resolution::KeepExisting { winner } => {
                let reinstate = self
                    .log
                    .get(&winner)
                    .filter(|entry| !entry.applied())
                    .map(|entry| (entry.operation.clone(), entry.effective_operation().clone()));
                let changed = match reinstate {
                    Some((ordering, effect)) => {
                        self.write_effect(&ordering, &effect)?;
                        if effect.kind().overwrites() {
                            self.log.mark_overwritten(&path);
                        }
                        self.log.set_effect(&winner, Some(effect.kind()));
                        true
                    }
                    None => false,
                };
                self.log.append_operation(operation, None);
                (false, changed)
            }
            Resolution::Replace(replacement) => {
                self.write_effect(&operation, &replacement)?;
                if replacement.kind().overwrites() {
                    self.log.mark_overwritten(&path);
                }
                self.log.append_replaced(operation, replacement);
                (true, true)
            }
        };

        info!(
            %path,
            incoming = %outcome.record.incoming,
            winner = %outcome.record.winner,
            strategy = %outcome.record.strategy,
            applied,
            "conflict recorded"
        );
        self.log.record_resolution(outcome.record.clone());
        if changed {
            self.version += 1;
        }
        Ok(ApplyStatus::Resolved {
            record: outcome.record,
            applied,
        })
    }

    /// Write `effect` to the store. Appends are placed relative to the other
    /// logged appends using `ordering`, which must not be logged yet.
    fn write_effect(&mut self, ordering: &Operation, effect: &Operation) -> Result<(), StoreError> {
        match effect.kind() {
            OperationKind::Append => {
                let len = self
                    .store
                    .get(effect.path())
                    .and_then(Value::as_sequence)
                    .map_or(0, Vec::len);
                let index = ordered_position(&self.log, ordering, len);
                self.store
                    .insert_at(effect.path(), index, effect.value().clone())
                    .map(|_| ())
            }
            kind => self.store.apply(kind, effect.path(), effect.value()),
        }
    }

    /// Integrate buffered operations whose dependencies are now logged,
    /// repeating until a pass releases nothing.
    fn release_ready(&mut self, detector: &ConflictDetector) -> Vec<OperationResult> {
        let mut released = Vec::new();
        loop {
            let log = &self.log;
            let ready = self.pending.take_ready(|id| log.contains(id));
            if ready.is_empty() {
                break;
            }
            for operation in ready {
                let op_id = operation.id().to_string();
                let status = self.process_remote(operation, detector);
                released.push(OperationResult::new(op_id, status));
            }
        }
        released
    }

    fn evict_expired(&mut self) -> Vec<OperationResult> {
        self.pending
            .evict_expired(Instant::now())
            .into_iter()
            .map(|operation| {
                let op_id = operation.id().to_string();
                let missing = self.log.missing_dependencies(&operation);
                warn!(%op_id, ?missing, "dependencies not satisfied in time, discarding operation");
                OperationResult::new(
                    op_id.clone(),
                    ApplyStatus::Rejected {
                        reason: SyncError::DependencyNotSatisfied { op_id, missing }.into(),
                    },
                )
            })
            .collect()
    }

    /// The latest logged operation on `path` from each other origin. A local
    /// write on `path` is causally after all of them.
    fn causal_dependencies(&self, path: &KeyPath, origin: &str) -> Vec<String> {
        let mut latest: BTreeMap<&str, &Operation> = BTreeMap::new();
        for entry in self.log.current_operations_on(path) {
            let operation = &entry.operation;
            if operation.origin() == origin {
                continue;
            }
            latest
                .entry(operation.origin())
                .and_modify(|current| {
                    if operation.version() > current.version() {
                        *current = operation;
                    }
                })
                .or_insert(operation);
        }
        latest.values().map(|op| op.id().to_string()).collect()
    }
}

fn decode_wire_record(element: serde_json::Value) -> Result<Operation, OperationResult> {
    let op_id = element
        .get("op_id")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    serde_json::from_value(element).map_err(|err| {
        OperationResult::new(
            op_id.clone(),
            ApplyStatus::Rejected {
                reason: SyncError::InvalidOperation {
                    op_id,
                    reason: err.to_string(),
                }
                .into(),
            },
        )
    })
}
