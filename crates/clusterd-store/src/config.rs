//! Stable cluster configuration for quorum arithmetic.
//!
//! The membership manager serializes configuration changes through the
//! store's leader one at a time, so the store never needs joint
//! consensus: it only ever reasons about a single, stable replica set.

use crate::types::ReplicaId;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    replicas: BTreeSet<ReplicaId>,
}

impl ClusterConfig {
    pub fn new(replicas: impl IntoIterator<Item = ReplicaId>) -> Self {
        Self {
            replicas: replicas.into_iter().collect(),
        }
    }

    pub fn contains(&self, replica: ReplicaId) -> bool {
        self.replicas.contains(&replica)
    }

    pub fn replicas(&self) -> impl Iterator<Item = ReplicaId> + '_ {
        self.replicas.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Majority of the configured replica set.
    pub fn quorum_size(&self) -> usize {
        self.replicas.len() / 2 + 1
    }

    pub fn has_quorum(&self, reachable: impl IntoIterator<Item = ReplicaId>) -> bool {
        let reachable: BTreeSet<_> = reachable.into_iter().collect();
        self.replicas.intersection(&reachable).count() >= self.quorum_size()
    }

    pub fn with_added(&self, replica: ReplicaId) -> Self {
        let mut replicas = self.replicas.clone();
        replicas.insert(replica);
        Self { replicas }
    }

    pub fn with_removed(&self, replica: ReplicaId) -> Self {
        let mut replicas = self.replicas.clone();
        replicas.remove(&replica);
        Self { replicas }
    }
}
