//! Inter-member event fan-out topology.
//!
//! Pure function of the roster: given which members hold `event-hub`,
//! decide whether non-hub members should connect through a hub or
//! mesh directly with every peer.

use clusterd_types::{Member, MemberId, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanoutTopology {
    /// Fewer than two event-hub members exist: every member connects
    /// directly to every other. O(N^2) but correct for small clusters.
    FullMesh,
    /// At least two event-hub members exist: non-hub members connect to
    /// exactly one hub, hubs re-broadcast to each other and to every
    /// connected non-hub member.
    HubRelay { hubs: Vec<MemberId> },
}

pub fn plan_topology(members: &[Member]) -> FanoutTopology {
    let hubs: Vec<MemberId> = members.iter().filter(|m| m.has_role(Role::EventHub)).map(|m| m.id).collect();
    if hubs.len() >= 2 {
        FanoutTopology::HubRelay { hubs }
    } else {
        FanoutTopology::FullMesh
    }
}

/// Assigns each non-hub member to a hub, distributing members across
/// hubs round-robin by member id for an even load spread.
pub fn assign_hub(member: MemberId, hubs: &[MemberId]) -> Option<MemberId> {
    if hubs.is_empty() {
        return None;
    }
    let index = (member.as_u64() as usize) % hubs.len();
    Some(hubs[index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterd_types::{ClusterGroupName, FailureDomain, MemberState, Timestamp};
    use std::collections::BTreeSet;

    fn member(id: u64, roles: &[Role]) -> Member {
        Member {
            id: MemberId::new(id),
            name: format!("m{id}"),
            address: format!("10.0.0.{id}:8444"),
            architecture: "x86_64".into(),
            failure_domain: FailureDomain::default(),
            schema_version: 1,
            api_extensions_version: 1,
            last_heartbeat: Timestamp::now(),
            roles: roles.iter().copied().collect(),
            state: MemberState::Created,
            groups: BTreeSet::from([ClusterGroupName::default()]),
            instance_count: 0,
        }
    }

    #[test]
    fn fewer_than_two_hubs_is_full_mesh() {
        let members = vec![member(1, &[Role::EventHub]), member(2, &[])];
        assert_eq!(plan_topology(&members), FanoutTopology::FullMesh);
    }

    #[test]
    fn two_or_more_hubs_relay() {
        let members = vec![member(1, &[Role::EventHub]), member(2, &[Role::EventHub]), member(3, &[])];
        match plan_topology(&members) {
            FanoutTopology::HubRelay { hubs } => assert_eq!(hubs.len(), 2),
            FanoutTopology::FullMesh => panic!("expected hub relay"),
        }
    }

    #[test]
    fn assign_hub_distributes_round_robin() {
        let hubs = vec![MemberId::new(10), MemberId::new(11)];
        assert_eq!(assign_hub(MemberId::new(4), &hubs), Some(MemberId::new(10)));
        assert_eq!(assign_hub(MemberId::new(5), &hubs), Some(MemberId::new(11)));
    }
}
