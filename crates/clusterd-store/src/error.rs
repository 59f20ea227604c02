//! Failure modes the store's callers must be able to distinguish.

use crate::types::ReplicaId;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The replica handling the call is not the current leader. Carries
    /// the last leader it observed, if any, so the caller can redirect
    /// without another round trip through the membership manager.
    #[error("not leader{}", .hint.map(|r| format!(", try {r}")).unwrap_or_default())]
    NotLeader { hint: Option<ReplicaId> },

    /// Fewer than a majority of voters are reachable; the write cannot
    /// be safely committed.
    #[error("no quorum available")]
    NoQuorum,

    /// The transaction's precondition was violated by an interleaving
    /// write and was aborted before commit.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The transaction closure itself returned an error, or a
    /// schema_upgrade was attempted while one was already in flight.
    #[error("aborted: {0}")]
    Aborted(String),
}

impl StoreError {
    pub fn not_leader() -> Self {
        StoreError::NotLeader { hint: None }
    }

    pub fn not_leader_hint(hint: ReplicaId) -> Self {
        StoreError::NotLeader { hint: Some(hint) }
    }
}

impl From<StoreError> for clusterd_types::ClusterError {
    fn from(err: StoreError) -> Self {
        use clusterd_types::ClusterError;
        match err {
            StoreError::NotLeader { hint } => {
                ClusterError::not_leader(hint.map(|r| r.to_string()).unwrap_or_default())
            }
            StoreError::NoQuorum => ClusterError::no_quorum(),
            StoreError::Conflict(msg) => ClusterError::conflict(msg),
            StoreError::Aborted(msg) => ClusterError::internal(msg),
        }
    }
}
