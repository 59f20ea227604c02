//! The workload registry: one record per instance, keyed by project and
//! name, with the owning member id the router resolves against.

use crate::error::EvacError;
use clusterd_store::{Store, StoreExt};
use clusterd_types::MemberId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const PREFIX: &str = "instances/";

fn key(project: &str, name: &str) -> String {
    format!("{PREFIX}{project}/{name}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Running,
    Stopped,
}

/// A workload record. The actual container/VM is the runtime's
/// business; this record is the control plane's view of where it
/// lives and whether it should be running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub project: String,
    pub member: MemberId,
    pub architecture: String,
    pub config: serde_json::Value,
    pub devices: serde_json::Value,
    pub status: InstanceStatus,
}

impl Instance {
    pub fn new(project: impl Into<String>, name: impl Into<String>, member: MemberId) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
            member,
            architecture: String::new(),
            config: serde_json::Value::Null,
            devices: serde_json::Value::Null,
            status: InstanceStatus::Stopped,
        }
    }

    /// Canonical URL of this instance, as referenced by warnings and
    /// lifecycle events.
    pub fn url(&self) -> String {
        format!("/1.0/instances/{}", self.name)
    }
}

/// Store-backed instance table. Every mutation is one transaction, so
/// the router and the evacuator never observe a half-moved workload.
pub struct InstanceRegistry {
    store: Arc<dyn Store>,
}

impl InstanceRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn get(&self, project: &str, name: &str) -> Result<Instance, EvacError> {
        let raw = self.store.transaction(|txn| Ok(txn.get(&key(project, name))))?;
        let raw = raw.ok_or_else(|| EvacError::InstanceNotFound {
            project: project.to_string(),
            name: name.to_string(),
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn insert(&self, instance: &Instance) -> Result<(), EvacError> {
        if self.get(&instance.project, &instance.name).is_ok() {
            return Err(EvacError::InstanceExists {
                project: instance.project.clone(),
                name: instance.name.clone(),
            });
        }
        self.persist(instance)
    }

    pub fn update(&self, instance: &Instance) -> Result<(), EvacError> {
        self.persist(instance)
    }

    fn persist(&self, instance: &Instance) -> Result<(), EvacError> {
        let encoded = serde_json::to_vec(instance)?;
        let k = key(&instance.project, &instance.name);
        self.store.transaction(|txn| {
            txn.put(k.clone(), encoded.clone());
            Ok(())
        })?;
        Ok(())
    }

    pub fn remove(&self, project: &str, name: &str) -> Result<(), EvacError> {
        self.store.transaction(|txn| {
            txn.delete(key(project, name));
            Ok(())
        })?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Instance>, EvacError> {
        let rows = self.store.transaction(|txn| Ok(txn.scan_prefix(PREFIX)))?;
        rows.into_iter().map(|(_, raw)| Ok(serde_json::from_slice(&raw)?)).collect()
    }

    pub fn list_in_project(&self, project: &str) -> Result<Vec<Instance>, EvacError> {
        let prefix = format!("{PREFIX}{project}/");
        let rows = self.store.transaction(|txn| Ok(txn.scan_prefix(&prefix)))?;
        rows.into_iter().map(|(_, raw)| Ok(serde_json::from_slice(&raw)?)).collect()
    }

    pub fn list_on_member(&self, member: MemberId) -> Result<Vec<Instance>, EvacError> {
        Ok(self.list()?.into_iter().filter(|i| i.member == member).collect())
    }

    pub fn count_on_member(&self, member: MemberId) -> Result<u64, EvacError> {
        Ok(self.list_on_member(member)?.len() as u64)
    }

    /// Reassigns the workload to `target` in a single transaction.
    pub fn relocate(&self, project: &str, name: &str, target: MemberId) -> Result<Instance, EvacError> {
        let mut instance = self.get(project, name)?;
        instance.member = target;
        self.persist(&instance)?;
        Ok(instance)
    }

    pub fn set_status(&self, project: &str, name: &str, status: InstanceStatus) -> Result<(), EvacError> {
        let mut instance = self.get(project, name)?;
        instance.status = status;
        self.persist(&instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterd_store::{InMemoryStore, ReplicaId};

    fn registry() -> InstanceRegistry {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(ReplicaId(1)));
        InstanceRegistry::new(store)
    }

    #[test]
    fn insert_then_get_round_trips() {
        let registry = registry();
        registry.insert(&Instance::new("default", "web", MemberId::new(1))).unwrap();
        let fetched = registry.get("default", "web").unwrap();
        assert_eq!(fetched.member, MemberId::new(1));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let registry = registry();
        let instance = Instance::new("default", "web", MemberId::new(1));
        registry.insert(&instance).unwrap();
        assert!(matches!(registry.insert(&instance), Err(EvacError::InstanceExists { .. })));
    }

    #[test]
    fn relocate_moves_the_owner() {
        let registry = registry();
        registry.insert(&Instance::new("default", "web", MemberId::new(1))).unwrap();
        registry.relocate("default", "web", MemberId::new(2)).unwrap();
        assert_eq!(registry.get("default", "web").unwrap().member, MemberId::new(2));
    }

    #[test]
    fn list_on_member_filters_by_owner() {
        let registry = registry();
        registry.insert(&Instance::new("default", "a", MemberId::new(1))).unwrap();
        registry.insert(&Instance::new("default", "b", MemberId::new(2))).unwrap();
        registry.insert(&Instance::new("prod", "c", MemberId::new(1))).unwrap();
        let on_m1 = registry.list_on_member(MemberId::new(1)).unwrap();
        assert_eq!(on_m1.len(), 2);
        assert_eq!(registry.count_on_member(MemberId::new(2)).unwrap(), 1);
    }

    #[test]
    fn projects_do_not_collide() {
        let registry = registry();
        registry.insert(&Instance::new("default", "web", MemberId::new(1))).unwrap();
        registry.insert(&Instance::new("prod", "web", MemberId::new(2))).unwrap();
        assert_eq!(registry.list_in_project("prod").unwrap().len(), 1);
    }
}
