//! Cluster-wide two-phase create/update/delete protocol for composite
//! entities that must exist identically on every member: storage
//! pools, managed networks, certain profiles.

mod coordinator;
mod error;

pub use coordinator::Coordinator;
pub use error::TwoPhaseError;
