//! The membership manager: ties the roster, heartbeat protocol and role
//! election together into a periodic tick loop (a `tokio::select!` over
//! an interval timer and a shutdown signal).

use crate::election::{elect_roles, RoleLimits};
use crate::error::Result;
use crate::heartbeat::{is_reachable, MissedHeartbeats};
use crate::roster::Roster;
use clusterd_config::ClusterConfig as ClusterTunables;
use clusterd_store::{ReplicaId, Store};
use clusterd_types::{Member, MemberId, Role, Timestamp};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

/// A single member's role set before and after a tick, for the caller
/// to turn into lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChange {
    pub member: MemberId,
    pub before: BTreeSet<Role>,
    pub after: BTreeSet<Role>,
}

pub struct MembershipManager {
    roster: Roster,
    store: Arc<dyn Store>,
    local_replica: ReplicaId,
    tunables: ClusterTunables,
    missed: MissedHeartbeats,
}

impl MembershipManager {
    pub fn new(store: Arc<dyn Store>, local_replica: ReplicaId, tunables: ClusterTunables) -> Self {
        Self {
            roster: Roster::new(Arc::clone(&store)),
            store,
            local_replica,
            tunables,
            missed: MissedHeartbeats::default(),
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn add_member(&self, member: Member) -> Result<()> {
        self.roster.insert(&member)
    }

    /// Runs one heartbeat + role-election round. Returns the set
    /// of members whose role assignment changed, for the caller to
    /// publish as lifecycle events.
    ///
    /// Election is leader-executed: every replica computes the same
    /// deterministic winner from the same roster, the winner claims the
    /// store's leadership and writes the role assignment, and everyone
    /// else applies whatever the leader replicated.
    pub fn tick(&mut self, now: Timestamp) -> Result<Vec<RoleChange>> {
        let members = self.roster.list()?;
        let online: BTreeSet<MemberId> = members
            .iter()
            .filter(|m| m.is_active())
            .filter(|m| {
                let reachable = is_reachable(m, now, self.tunables.offline_threshold_secs);
                if reachable {
                    self.missed.record_success(m.id);
                } else {
                    let misses = self.missed.record_miss(m.id);
                    warn!(member = %m.id, misses, "member missed heartbeat");
                }
                reachable
            })
            .map(|m| m.id)
            .collect();

        // Version-mismatched members never receive automatic roles and
        // block cluster-mutating operations until resolved, but they
        // stay in the online set for presence purposes.
        let cluster_schema = members.iter().map(|m| m.schema_version).max().unwrap_or(1);
        let eligible: BTreeSet<MemberId> = online
            .iter()
            .copied()
            .filter(|id| {
                let member = members.iter().find(|m| m.id == *id);
                member.map(|m| m.schema_version == cluster_schema).unwrap_or(false)
            })
            .collect();

        // The lowest-id eligible member leads. Every replica reaches
        // the same answer from the same roster, so only the winner
        // proceeds past this point; losers apply whatever assignment
        // the leader replicates through the store.
        let local_member = MemberId::new(self.local_replica.0);
        let Some(raft_leader) = eligible.first().copied() else {
            return Ok(Vec::new());
        };
        if raft_leader != local_member {
            return Ok(Vec::new());
        }

        let already_leading = members
            .iter()
            .any(|m| m.id == local_member && m.has_role(Role::DatabaseLeader));
        if !already_leading {
            // Claim the store's leadership for a fresh view before
            // writing the new role assignment through it.
            self.store.assume_leadership(self.store.current_view().next());
        }

        let raft_leader = Some(raft_leader);
        let limits = RoleLimits {
            max_voters: self.tunables.max_voters,
            max_standby: self.tunables.max_standby,
        };
        let assignment = elect_roles(&members, &eligible, raft_leader, limits);

        let mut changes = Vec::new();
        for mut member in members {
            let before = member.roles.clone();
            let after = assignment.get(&member.id).cloned().unwrap_or_default();
            if before != after {
                member.roles = after.clone();
                self.roster.update(&member)?;
                changes.push(RoleChange {
                    member: member.id,
                    before,
                    after,
                });
            }
        }

        if !changes.is_empty() {
            info!(count = changes.len(), "role assignment changed");
        }

        Ok(changes)
    }

    /// Heartbeat cadence: `offline_threshold / 4`, clamped to
    /// `[2s, 10s]`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.tunables.heartbeat_interval_secs())
    }

    /// Runs [`Self::tick`] on the configured cadence until `shutdown`
    /// fires. `on_change` is invoked with every tick's role changes so
    /// the caller can fan them out as lifecycle events.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>, on_change: impl Fn(Vec<RoleChange>) + Send + 'static) {
        let mut ticker = interval(self.heartbeat_interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick(Timestamp::now()) {
                        Ok(changes) if !changes.is_empty() => on_change(changes),
                        Ok(_) => {}
                        Err(err) => warn!(%err, "membership tick failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("membership manager shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterd_store::InMemoryStore;
    use clusterd_types::{ClusterGroupName, FailureDomain, MemberState};
    use std::collections::BTreeSet as Set;

    fn tunables() -> ClusterTunables {
        ClusterTunables {
            max_voters: 3,
            max_standby: 1,
            offline_threshold_secs: 20,
        }
    }

    fn member(id: u64, last_heartbeat: Timestamp) -> Member {
        Member {
            id: MemberId::new(id),
            name: format!("m{id}"),
            address: format!("10.0.0.{id}:8444"),
            architecture: "x86_64".into(),
            failure_domain: FailureDomain::new("default"),
            schema_version: 1,
            api_extensions_version: 1,
            last_heartbeat,
            roles: Set::new(),
            state: MemberState::Created,
            groups: Set::from([ClusterGroupName::default()]),
            instance_count: 0,
        }
    }

    #[test]
    fn tick_assigns_database_leader_to_first_eligible_member() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(ReplicaId(1)));
        let mut manager = MembershipManager::new(Arc::clone(&store), ReplicaId(1), tunables());
        let now = Timestamp::now();
        manager.add_member(member(1, now)).unwrap();
        manager.add_member(member(2, now)).unwrap();

        let changes = manager.tick(now).unwrap();
        assert_eq!(changes.len(), 2);
        let leader = manager.roster().get(MemberId::new(1)).unwrap();
        assert!(leader.has_role(Role::DatabaseLeader));
    }

    #[test]
    fn unreachable_member_loses_its_role() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(ReplicaId(1)));
        let mut manager = MembershipManager::new(Arc::clone(&store), ReplicaId(1), tunables());
        let now = Timestamp::now();
        manager.add_member(member(1, now)).unwrap();
        manager.add_member(member(2, Timestamp::EPOCH)).unwrap();

        manager.tick(now).unwrap();
        let stale = manager.roster().get(MemberId::new(2)).unwrap();
        assert!(stale.roles.is_empty());
    }

    #[test]
    fn replica_that_is_not_the_deterministic_leader_defers() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(ReplicaId(2)));
        let mut manager = MembershipManager::new(Arc::clone(&store), ReplicaId(2), tunables());
        let now = Timestamp::now();
        manager.add_member(member(1, now)).unwrap();
        manager.add_member(member(2, now)).unwrap();

        // m1 is reachable and outranks us; our tick must not elect.
        let changes = manager.tick(now).unwrap();
        assert!(changes.is_empty());
        assert_eq!(store.current_view(), clusterd_store::ViewNumber::default());
    }

    #[test]
    fn surviving_replica_assumes_leadership_when_the_leader_is_lost() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(ReplicaId(2)));
        let now = Timestamp::now();

        // m1 led an earlier view but has stopped heartbeating.
        let mut old_leader = member(1, Timestamp::EPOCH);
        old_leader.roles = Set::from([Role::DatabaseLeader, Role::Voter]);
        let mut manager = MembershipManager::new(Arc::clone(&store), ReplicaId(2), tunables());
        manager.add_member(old_leader).unwrap();
        manager.add_member(member(2, now)).unwrap();

        manager.tick(now).unwrap();

        let new_leader = manager.roster().get(MemberId::new(2)).unwrap();
        assert!(new_leader.has_role(Role::DatabaseLeader));
        let stale = manager.roster().get(MemberId::new(1)).unwrap();
        assert!(!stale.has_role(Role::DatabaseLeader));
        let leaders = manager
            .roster()
            .list()
            .unwrap()
            .into_iter()
            .filter(|m| m.has_role(Role::DatabaseLeader))
            .count();
        assert_eq!(leaders, 1);
        assert!(store.current_view() > clusterd_store::ViewNumber::default());
    }

    #[test]
    fn version_mismatched_member_is_excluded_from_roles() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(ReplicaId(1)));
        let mut manager = MembershipManager::new(Arc::clone(&store), ReplicaId(1), tunables());
        let now = Timestamp::now();
        manager.add_member(member(1, now)).unwrap();
        let mut behind = member(2, now);
        behind.schema_version = 0;
        manager.add_member(behind).unwrap();

        manager.tick(now).unwrap();
        let behind = manager.roster().get(MemberId::new(2)).unwrap();
        assert!(behind.roles.is_empty());
    }
}
