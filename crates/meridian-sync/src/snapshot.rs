//! Checksummed point-in-time exports of a node.
//!
//! The checksum is a BLAKE3 hex digest over the canonical JSON encoding of
//! `{state, version, vector_clock, timestamp}`. Mappings and clocks are
//! key-ordered, so the encoding, and therefore the digest, is deterministic.
//! Tampering with any of those fields, or with the checksum itself, makes
//! import fail with `ChecksumMismatch`.

use meridian_core::errors::SyncError;
use meridian_core::time::now_secs;
use meridian_core::{MeridianResult, Value};
use meridian_crdt::VectorClock;
use meridian_store::ValueStore;
use serde::{Deserialize, Serialize};

/// The snapshot export record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub state: Value,
    pub version: u64,
    pub checksum: String,
    pub vector_clock: VectorClock,
    pub timestamp: f64,
}

#[derive(Serialize)]
struct ChecksumInput<'a> {
    state: &'a Value,
    version: u64,
    vector_clock: &'a VectorClock,
    timestamp: f64,
}

impl SyncSnapshot {
    /// Digest over the checksummed fields. Ignores `self.checksum`.
    pub fn compute_checksum(&self) -> MeridianResult<String> {
        let canonical = serde_json::to_vec(&ChecksumInput {
            state: &self.state,
            version: self.version,
            vector_clock: &self.vector_clock,
            timestamp: self.timestamp,
        })?;
        Ok(blake3::hash(&canonical).to_hex().to_string())
    }

    /// Recompute the checksum and compare it with the embedded one.
    pub fn verify(&self) -> MeridianResult<()> {
        let actual = self.compute_checksum()?;
        if actual != self.checksum {
            return Err(SyncError::ChecksumMismatch {
                expected: self.checksum.clone(),
                actual,
            }
            .into());
        }
        Ok(())
    }

    pub fn to_json(&self) -> MeridianResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> MeridianResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> MeridianResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Builds and checks snapshots. Holds no state of its own.
pub struct SnapshotManager;

impl SnapshotManager {
    /// Deep-copy `store` into a checksummed snapshot.
    pub fn export(
        store: &ValueStore,
        version: u64,
        vector_clock: &VectorClock,
    ) -> MeridianResult<SyncSnapshot> {
        let mut snapshot = SyncSnapshot {
            state: store.to_value(),
            version,
            checksum: String::new(),
            vector_clock: vector_clock.clone(),
            timestamp: now_secs(),
        };
        snapshot.checksum = snapshot.compute_checksum()?;
        Ok(snapshot)
    }

    /// Verify `snapshot` and rebuild its store. Touches nothing else.
    pub fn restore(snapshot: &SyncSnapshot) -> MeridianResult<ValueStore> {
        snapshot.verify()?;
        ValueStore::from_value(snapshot.state.clone()).map_err(|err| {
            SyncError::InvalidSnapshot {
                reason: err.to_string(),
            }
            .into()
        })
    }
}
