//! Warning records: durable, operator-visible notes that something
//! needs attention, referenced by UUID and tied to an entity URL.

use crate::error::EvacError;
use clusterd_store::{Store, StoreExt};
use clusterd_types::Timestamp;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const PREFIX: &str = "warnings/";

fn key(id: Uuid) -> String {
    format!("{PREFIX}{id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningStatus {
    New,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub uuid: Uuid,
    pub entity_url: String,
    pub message: String,
    pub status: WarningStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WarningRecord {
    pub fn new(entity_url: impl Into<String>, message: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            uuid: Uuid::new_v4(),
            entity_url: entity_url.into(),
            message: message.into(),
            status: WarningStatus::New,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn url(&self) -> String {
        format!("/1.0/warnings/{}", self.uuid)
    }
}

pub struct WarningRegistry {
    store: Arc<dyn Store>,
}

impl WarningRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn create(&self, warning: &WarningRecord) -> Result<(), EvacError> {
        self.persist(warning)
    }

    fn persist(&self, warning: &WarningRecord) -> Result<(), EvacError> {
        let encoded = serde_json::to_vec(warning)?;
        let k = key(warning.uuid);
        self.store.transaction(|txn| {
            txn.put(k.clone(), encoded.clone());
            Ok(())
        })?;
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<WarningRecord, EvacError> {
        let raw = self.store.transaction(|txn| Ok(txn.get(&key(id))))?;
        let raw = raw.ok_or(EvacError::WarningNotFound(id))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn list(&self) -> Result<Vec<WarningRecord>, EvacError> {
        let rows = self.store.transaction(|txn| Ok(txn.scan_prefix(PREFIX)))?;
        rows.into_iter().map(|(_, raw)| Ok(serde_json::from_slice(&raw)?)).collect()
    }

    pub fn resolve(&self, id: Uuid) -> Result<(), EvacError> {
        let mut warning = self.get(id)?;
        warning.status = WarningStatus::Resolved;
        warning.updated_at = Timestamp::now();
        self.persist(&warning)
    }

    /// Resolves every open warning referencing `entity_url`. Returns
    /// how many were flipped.
    pub fn resolve_for_url(&self, entity_url: &str) -> Result<usize, EvacError> {
        let mut resolved = 0;
        for warning in self.list()? {
            if warning.status == WarningStatus::New && warning.entity_url == entity_url {
                self.resolve(warning.uuid)?;
                resolved += 1;
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterd_store::{InMemoryStore, ReplicaId};

    fn registry() -> WarningRegistry {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(ReplicaId(1)));
        WarningRegistry::new(store)
    }

    #[test]
    fn create_then_get_round_trips() {
        let registry = registry();
        let warning = WarningRecord::new("/1.0/instances/web", "no placement target");
        registry.create(&warning).unwrap();
        let fetched = registry.get(warning.uuid).unwrap();
        assert_eq!(fetched.status, WarningStatus::New);
        assert_eq!(fetched.entity_url, "/1.0/instances/web");
    }

    #[test]
    fn resolve_for_url_only_touches_matching_open_warnings() {
        let registry = registry();
        let a = WarningRecord::new("/1.0/instances/web", "stranded");
        let b = WarningRecord::new("/1.0/instances/db", "stranded");
        registry.create(&a).unwrap();
        registry.create(&b).unwrap();

        assert_eq!(registry.resolve_for_url("/1.0/instances/web").unwrap(), 1);
        assert_eq!(registry.get(a.uuid).unwrap().status, WarningStatus::Resolved);
        assert_eq!(registry.get(b.uuid).unwrap().status, WarningStatus::New);
        // Already resolved: a second sweep is a no-op.
        assert_eq!(registry.resolve_for_url("/1.0/instances/web").unwrap(), 0);
    }
}
