use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Lifecycle state of a composite entity that must exist identically on
/// every member (storage pools, managed networks, certain profiles).
///
/// Transitions are monotonic except that `Errored` can be cleared only
/// by a successful retry of the two-phase operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositeState {
    Pending,
    Created,
    Errored,
}

impl CompositeState {
    pub fn can_retry(self) -> bool {
        matches!(self, CompositeState::Pending | CompositeState::Errored)
    }
}

impl Display for CompositeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompositeState::Pending => "pending",
            CompositeState::Created => "created",
            CompositeState::Errored => "errored",
        };
        f.write_str(s)
    }
}
