//! Replica and log position identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one replica of the store, one per cluster member that
/// holds a voting database role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaId(pub u64);

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replica-{}", self.0)
    }
}

/// Monotonic log position. Every committed write advances this by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct OpNumber(pub u64);

impl OpNumber {
    pub const ZERO: OpNumber = OpNumber(0);

    pub fn next(self) -> Self {
        OpNumber(self.0 + 1)
    }
}

impl fmt::Display for OpNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Term during which a replica held leadership. Bumped on every
/// leadership change so stale leaders can recognize they have been
/// superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct ViewNumber(pub u64);

impl ViewNumber {
    pub fn next(self) -> Self {
        ViewNumber(self.0 + 1)
    }
}

impl fmt::Display for ViewNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
