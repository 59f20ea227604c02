//! Deterministic role election.
//!
//! Pure function of the current roster plus the online set: given the
//! same inputs, every replica that runs it reaches the same answer, so
//! only the leader needs to execute it and broadcast the result.

use clusterd_types::{Member, MemberId, Role};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy)]
pub struct RoleLimits {
    pub max_voters: u32,
    pub max_standby: u32,
}

/// Resulting role assignment for every online member. Members not
/// present in the map keep no automatic role.
pub type RoleAssignment = BTreeMap<MemberId, BTreeSet<Role>>;

/// Runs the five role-election rules against the current roster.
///
/// `raft_leader` is the member the store's leadership module currently
/// recognizes as the Raft leader (rule 1); it is always given the
/// `database-leader` role when online.
pub fn elect_roles(members: &[Member], online: &BTreeSet<MemberId>, raft_leader: Option<MemberId>, limits: RoleLimits) -> RoleAssignment {
    let online_members: Vec<&Member> = members.iter().filter(|m| online.contains(&m.id)).collect();
    let mut assignment: RoleAssignment = BTreeMap::new();

    // Rule 1: exactly one database-leader, the Raft leader if it is online.
    let leader = raft_leader.filter(|id| online.contains(id));
    if let Some(leader) = leader {
        assignment.entry(leader).or_default().insert(Role::DatabaseLeader);
        assignment.entry(leader).or_default().insert(Role::Voter);
    }

    // Rule 2: |voters| = min(max_voters, online_members).
    let target_voters = (limits.max_voters as usize).min(online_members.len());

    // Existing voters, preferring to keep ones that are still online and
    // whose failure domain differs from already-chosen voters where a
    // choice exists (spreads voters across domains without forcibly
    // demoting one mid-term).
    let mut voters: BTreeSet<MemberId> = leader.into_iter().collect();
    let mut used_domains: BTreeSet<String> = BTreeSet::new();
    if let Some(leader) = leader {
        if let Some(m) = online_members.iter().find(|m| m.id == leader) {
            used_domains.insert(m.failure_domain.to_string());
        }
    }

    // Prefer members that already hold the voter role (stability: avoid
    // needless reshuffling), then fill remaining slots from standbys and
    // finally from plain members, favoring untouched failure domains.
    let mut candidates: Vec<&Member> = online_members.clone();
    candidates.sort_by_key(|m| {
        let already_voter = !m.has_role(Role::Voter);
        let already_standby = !m.has_role(Role::StandBy);
        let new_domain = used_domains.contains(&m.failure_domain.to_string());
        (already_voter, already_standby, new_domain, m.id.as_u64())
    });

    for member in &candidates {
        if voters.len() >= target_voters {
            break;
        }
        if voters.contains(&member.id) {
            continue;
        }
        voters.insert(member.id);
        used_domains.insert(member.failure_domain.to_string());
    }

    for &voter in &voters {
        assignment.entry(voter).or_default().insert(Role::Voter);
    }

    // Rule 3: |standbys| = min(max_standby, online - voters).
    let remaining: Vec<&Member> = online_members.iter().filter(|m| !voters.contains(&m.id)).copied().collect();
    let target_standby = (limits.max_standby as usize).min(remaining.len());

    let mut standby_candidates = remaining.clone();
    standby_candidates.sort_by_key(|m| (!m.has_role(Role::StandBy), m.id.as_u64()));

    for member in standby_candidates.into_iter().take(target_standby) {
        assignment.entry(member.id).or_default().insert(Role::StandBy);
    }

    assignment
}

/// Rule 4: when a voter in `lost_domain` is replaced, pick the best
/// online candidate to promote: same failure domain standby first, then
/// any standby, then any plain online member.
pub fn pick_replacement<'a>(online_members: &[&'a Member], lost_domain: &str, already_voters: &BTreeSet<MemberId>) -> Option<&'a Member> {
    let candidates: Vec<&&Member> = online_members.iter().filter(|m| !already_voters.contains(&m.id)).collect();

    candidates
        .iter()
        .find(|m| m.has_role(Role::StandBy) && m.failure_domain.to_string() == lost_domain)
        .or_else(|| candidates.iter().find(|m| m.has_role(Role::StandBy)))
        .or_else(|| candidates.first())
        .copied()
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterd_types::{ClusterGroupName, FailureDomain, MemberState, Timestamp};

    fn member(id: u64, domain: &str, roles: &[Role]) -> Member {
        Member {
            id: MemberId::new(id),
            name: format!("m{id}"),
            address: format!("10.0.0.{id}:8444"),
            architecture: "x86_64".into(),
            failure_domain: FailureDomain::new(domain),
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
    fn leader_always_gets_database_leader_and_voter() {
        let members = vec![member(1, "a", &[]), member(2, "b", &[])];
        let online: BTreeSet<_> = [MemberId::new(1), MemberId::new(2)].into_iter().collect();
        let limits = RoleLimits { max_voters: 3, max_standby: 2 };

        let assignment = elect_roles(&members, &online, Some(MemberId::new(1)), limits);
        assert!(assignment[&MemberId::new(1)].contains(&Role::DatabaseLeader));
        assert!(assignment[&MemberId::new(1)].contains(&Role::Voter));
    }

    #[test]
    fn voter_count_is_capped_by_max_voters() {
        let members: Vec<_> = (1..=5).map(|i| member(i, "a", &[])).collect();
        let online: BTreeSet<_> = members.iter().map(|m| m.id).collect();
        let limits = RoleLimits { max_voters: 3, max_standby: 1 };

        let assignment = elect_roles(&members, &online, Some(MemberId::new(1)), limits);
        let voters = assignment.values().filter(|r| r.contains(&Role::Voter)).count();
        assert_eq!(voters, 3);
    }

    #[test]
    fn offline_members_receive_no_role() {
        let members = vec![member(1, "a", &[]), member(2, "b", &[])];
        let online: BTreeSet<_> = [MemberId::new(1)].into_iter().collect();
        let limits = RoleLimits { max_voters: 3, max_standby: 2 };

        let assignment = elect_roles(&members, &online, Some(MemberId::new(1)), limits);
        assert!(!assignment.contains_key(&MemberId::new(2)));
    }

    #[test]
    fn replacement_prefers_same_failure_domain_standby() {
        let standby_same = member(2, "rack-a", &[Role::StandBy]);
        let standby_other = member(3, "rack-b", &[Role::StandBy]);
        let plain = member(4, "rack-a", &[]);
        let online: Vec<&Member> = vec![&standby_same, &standby_other, &plain];
        let voters = BTreeSet::new();

        let picked = pick_replacement(&online, "rack-a", &voters).unwrap();
        assert_eq!(picked.id, MemberId::new(2));
    }

    #[test]
    fn replacement_falls_back_to_any_standby_then_any_member() {
        let standby_other = member(3, "rack-b", &[Role::StandBy]);
        let online: Vec<&Member> = vec![&standby_other];
        let voters = BTreeSet::new();
        let picked = pick_replacement(&online, "rack-a", &voters).unwrap();
        assert_eq!(picked.id, MemberId::new(3));
    }
}
