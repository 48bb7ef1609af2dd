#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # aecflow in-memory repository
//!
//! [`AecRepo`] backed by a `DashMap`. Each save is a compare-and-swap on
//! the aggregate's version under the map's shard lock, which gives the
//! per-document atomicity the coordinator relies on.

use aecflow_contract::Aec;
use aecflow_core::AecId;
use aecflow_ports::{AecRepo, PortsError};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

const ENTITY: &str = "aec";

/// In-memory AEC store.
#[derive(Debug, Default)]
pub struct MemoryAecRepo {
    store: DashMap<AecId, Aec>,
}

impl MemoryAecRepo {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored AECs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[async_trait]
impl AecRepo for MemoryAecRepo {
    async fn find_by_id(&self, id: AecId) -> Result<Option<Aec>, PortsError> {
        Ok(self.store.get(&id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, aec: &Aec) -> Result<u64, PortsError> {
        let expected = aec.version();
        let mut next = aec.clone();
        match self.store.entry(aec.id()) {
            Entry::Occupied(mut slot) => {
                let actual = slot.get().version();
                if actual != expected {
                    tracing::debug!(aec_id = %aec.id(), expected, actual, "version conflict");
                    return Err(PortsError::conflict(ENTITY, aec.id(), expected, actual));
                }
                next.set_version(actual + 1);
                slot.insert(next);
                Ok(actual + 1)
            }
            Entry::Vacant(slot) => {
                if expected != 0 {
                    return Err(PortsError::conflict(ENTITY, aec.id(), expected, 0));
                }
                next.set_version(1);
                slot.insert(next);
                Ok(1)
            }
        }
    }
}
