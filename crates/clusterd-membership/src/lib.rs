//! Membership manager.
//!
//! Maintains the authoritative member list, runs the heartbeat protocol
//! and applies the deterministic role-election rules that assign the
//! `database`, `database-leader` and `database-standby` roles. Built on
//! top of [`clusterd_store`]'s replicated store for durability.

pub mod election;
pub mod error;
pub mod heartbeat;
pub mod manager;
pub mod roster;

pub use election::{elect_roles, pick_replacement, RoleAssignment, RoleLimits};
pub use error::{Error, Result};
pub use heartbeat::{is_reachable, HeartbeatReply, HeartbeatRequest, LoadSample, MemberSummary, MissedHeartbeats};
pub use manager::{MembershipManager, RoleChange};
pub use roster::Roster;
