//! The authoritative member list, held in the replicated store under
//! the `members/` key prefix.

use crate::error::{Error, Result};
use clusterd_store::{OpNumber, Store, StoreExt};
use clusterd_types::{Member, MemberId};
use std::sync::Arc;

const PREFIX: &str = "members/";

fn key(id: MemberId) -> String {
    format!("{PREFIX}{id}")
}

/// Thin, store-backed view of the member list. Every mutation goes
/// through a transaction so readers (the REST router, the notifier)
/// never see a half-applied roster.
pub struct Roster {
    store: Arc<dyn Store>,
}

impl Roster {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn get(&self, id: MemberId) -> Result<Member> {
        self.store
            .transaction(|txn| {
                let raw = txn
                    .get(&key(id))
                    .ok_or_else(|| clusterd_store::StoreError::Conflict("not found".into()))?;
                Ok(raw)
            })
            .map_err(|_| Error::NotFound(id))
            .and_then(|raw| Ok(serde_json::from_slice(&raw)?))
    }

    pub fn list(&self) -> Result<Vec<Member>> {
        let rows = self.store.transaction(|txn| Ok(txn.scan_prefix(PREFIX)))?;
        rows.into_iter()
            .map(|(_, raw)| Ok(serde_json::from_slice(&raw)?))
            .collect()
    }

    pub fn insert(&self, member: &Member) -> Result<()> {
        if self.get(member.id).is_ok() {
            return Err(Error::AlreadyMember(member.id));
        }
        let encoded = serde_json::to_vec(member)?;
        self.store
            .transaction(|txn| {
                txn.put(key(member.id), encoded.clone());
                Ok(())
            })
            .map_err(Error::from)
    }

    pub fn update(&self, member: &Member) -> Result<()> {
        let encoded = serde_json::to_vec(member)?;
        self.store
            .transaction(|txn| {
                txn.put(key(member.id), encoded.clone());
                Ok(())
            })
            .map_err(Error::from)
    }

    pub fn remove(&self, id: MemberId) -> Result<()> {
        self.store
            .transaction(|txn| {
                txn.delete(key(id));
                Ok(())
            })
            .map_err(Error::from)
    }

    pub fn watch_from(&self, from_index: OpNumber) -> clusterd_store::WatchStream {
        self.store.watch(PREFIX, from_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterd_store::{InMemoryStore, ReplicaId};
    use clusterd_types::{ClusterGroupName, FailureDomain, MemberState, Role};
    use std::collections::BTreeSet;

    fn test_member(id: u64) -> Member {
        Member {
            id: MemberId::new(id),
            name: format!("m{id}"),
            address: format!("10.0.0.{id}:8444"),
            architecture: "x86_64".into(),
            failure_domain: FailureDomain::new("default"),
            schema_version: 1,
            api_extensions_version: 1,
            last_heartbeat: clusterd_types::Timestamp::now(),
            roles: BTreeSet::new(),
            state: MemberState::Created,
            groups: BTreeSet::from([ClusterGroupName::default()]),
            instance_count: 0,
        }
    }

    fn store() -> Arc<dyn Store> {
        Arc::new(InMemoryStore::new(ReplicaId(1)))
    }

    #[test]
    fn insert_then_get_round_trips() {
        let roster = Roster::new(store());
        let member = test_member(1);
        roster.insert(&member).unwrap();
        let fetched = roster.get(MemberId::new(1)).unwrap();
        assert_eq!(fetched.name, "m1");
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let roster = Roster::new(store());
        roster.insert(&test_member(1)).unwrap();
        assert!(matches!(roster.insert(&test_member(1)), Err(Error::AlreadyMember(_))));
    }

    #[test]
    fn list_reflects_removals() {
        let roster = Roster::new(store());
        roster.insert(&test_member(1)).unwrap();
        roster.insert(&test_member(2)).unwrap();
        roster.remove(MemberId::new(1)).unwrap();
        let members = roster.list().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, MemberId::new(2));
    }

    #[test]
    fn update_persists_role_changes() {
        let roster = Roster::new(store());
        let mut member = test_member(1);
        roster.insert(&member).unwrap();
        member.roles.insert(Role::Voter);
        roster.update(&member).unwrap();
        assert!(roster.get(MemberId::new(1)).unwrap().has_role(Role::Voter));
    }
}
