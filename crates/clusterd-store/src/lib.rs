//! The replicated key/value store.
//!
//! Treated as a library by the rest of the control plane: callers never
//! see Raft messages or log entries, only [`Store::transaction`],
//! [`Store::watch`] and [`Store::schema_upgrade`]. Writes are linearized
//! through the current leader; followers answer reads from their last
//! applied snapshot and mark them stale.
//!
//! This crate implements a single-round, majority-quorum replication
//! scheme rather than full Viewstamped Replication view-changes: the
//! membership manager (`clusterd-membership`) owns promoting a new
//! leader when the old one is lost, and simply calls
//! [`Store::assume_leadership`] once it has done so. See DESIGN.md for
//! why the store does not run its own view-change protocol.

mod config;
mod error;
mod store;
mod types;
mod watch;

pub use config::ClusterConfig;
pub use error::StoreError;
pub use store::{InMemoryStore, Store, StoreExt, Txn};
pub use types::{OpNumber, ReplicaId, ViewNumber};
pub use watch::{WatchEvent, WatchStream};
