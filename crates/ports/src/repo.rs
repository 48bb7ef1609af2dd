//! AEC repository port.

use aecflow_contract::Aec;
use aecflow_core::AecId;
use async_trait::async_trait;

use crate::error::PortsError;

/// Versioned persistence for the AEC aggregate.
///
/// `save` is a compare-and-swap on [`Aec::version`]: it succeeds only when
/// the stored version equals the aggregate's (0 means the AEC must not
/// exist yet) and returns the new version. A mismatch is
/// [`PortsError::Conflict`].
#[async_trait]
pub trait AecRepo: Send + Sync {
    /// Load an AEC, or `None` if it does not exist.
    async fn find_by_id(&self, id: AecId) -> Result<Option<Aec>, PortsError>;

    /// Create or update atomically. Returns the new version.
    async fn save(&self, aec: &Aec) -> Result<u64, PortsError>;
}
