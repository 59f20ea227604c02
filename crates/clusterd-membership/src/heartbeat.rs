//! Heartbeat protocol messages.
//!
//! The transport that carries these between members is owned by
//! `clusterd-server`; this module only defines the message shapes and
//! the reachability arithmetic the leader applies to replies.

use clusterd_types::{ClusterGroupName, Member, MemberId, Role, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Sent by the leader to every member on each heartbeat tick. Carries
/// the leader's view of the cluster so members can detect they have
/// drifted (e.g. missed a role change) without a separate sync call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub view: u64,
    pub members: Vec<MemberSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSummary {
    pub id: MemberId,
    pub roles: BTreeSet<Role>,
    pub groups: BTreeSet<ClusterGroupName>,
}

/// Sent back by the responding member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatReply {
    pub member: MemberId,
    pub schema_version: u32,
    pub api_extensions_version: u32,
    pub load: LoadSample,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadSample {
    pub instance_count: u32,
    pub recent_placements: u32,
}

/// Tracks consecutive missed heartbeats per member, independent of the
/// member's persisted state, so a transient network blip does not
/// immediately flip a member offline.
#[derive(Debug, Default)]
pub struct MissedHeartbeats {
    counts: BTreeMap<MemberId, u32>,
}

impl MissedHeartbeats {
    pub fn record_success(&mut self, member: MemberId) {
        self.counts.remove(&member);
    }

    pub fn record_miss(&mut self, member: MemberId) -> u32 {
        let count = self.counts.entry(member).or_insert(0);
        *count += 1;
        *count
    }
}

/// A member is reachable if its last successful heartbeat is within
/// `offline_threshold_secs`. This is a derived fact, not a persisted
/// state: only `pending | created | evacuated | deleted` are ever
/// written to the store, so a flapping network never corrupts the
/// member's durable lifecycle.
pub fn is_reachable(member: &Member, now: Timestamp, offline_threshold_secs: u64) -> bool {
    member.reachable(now, offline_threshold_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missed_heartbeats_reset_on_success() {
        let mut tracker = MissedHeartbeats::default();
        let id = MemberId::new(1);
        assert_eq!(tracker.record_miss(id), 1);
        assert_eq!(tracker.record_miss(id), 2);
        tracker.record_success(id);
        assert_eq!(tracker.record_miss(id), 1);
    }
}
