//! Two-phase cluster-wide operations.
//!
//! Pending records live in the store under
//! `composite/{entity}/pending/{member}`; the global config lives under
//! `composite/{entity}/global`; the resulting lifecycle state lives
//! under `composite/{entity}/state`.

use crate::error::TwoPhaseError;
use clusterd_notify::{notify, PeerView, Scope};
use clusterd_store::{Store, StoreExt};
use clusterd_types::{ClusterError, CompositeState, MemberId};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

fn pending_key(entity: &str, member: MemberId) -> String {
    format!("composite/{entity}/pending/{member}")
}

fn pending_prefix(entity: &str) -> String {
    format!("composite/{entity}/pending/")
}

fn global_key(entity: &str) -> String {
    format!("composite/{entity}/global")
}

fn state_key(entity: &str) -> String {
    format!("composite/{entity}/state")
}

pub struct Coordinator {
    store: Arc<dyn Store>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Step 1: record node-specific config for one member. Rejects a
    /// duplicate `(entity, member)` pending record as `already_defined`.
    pub fn stage(&self, entity: &str, member: MemberId, config: Value) -> Result<(), TwoPhaseError> {
        let key = pending_key(entity, member);
        let exists = self.store.transaction(|txn| Ok(txn.get(&key).is_some()))?;
        if exists {
            return Err(TwoPhaseError::AlreadyDefined {
                entity: entity.to_string(),
                member,
            });
        }
        let encoded = serde_json::to_vec(&config)?;
        self.store.transaction(|txn| {
            txn.put(key.clone(), encoded.clone());
            Ok(())
        })?;
        Ok(())
    }

    fn pending_members(&self, entity: &str) -> Result<Vec<(MemberId, Value)>, TwoPhaseError> {
        let prefix = pending_prefix(entity);
        let rows = self.store.transaction(|txn| Ok(txn.scan_prefix(&prefix)))?;
        rows.into_iter()
            .map(|(key, raw)| {
                let member_str = key.strip_prefix(&prefix).unwrap_or_default();
                let id: u64 = member_str.parse().unwrap_or(0);
                let config: Value = serde_json::from_slice(&raw)?;
                Ok((MemberId::new(id), config))
            })
            .collect()
    }

    /// Members that currently hold a staged pending record for `entity`.
    pub fn pending(&self, entity: &str) -> Result<Vec<MemberId>, TwoPhaseError> {
        Ok(self.pending_members(entity)?.into_iter().map(|(id, _)| id).collect())
    }

    /// Drops every trace of `entity`: staged records, global config and
    /// lifecycle state. Used by delete once the fan-out has succeeded.
    pub fn forget(&self, entity: &str) -> Result<(), TwoPhaseError> {
        let prefix = pending_prefix(entity);
        let global = global_key(entity);
        let state = state_key(entity);
        self.store.transaction(|txn| {
            for (key, _) in txn.scan_prefix(&prefix) {
                txn.delete(key);
            }
            txn.delete(global.clone());
            txn.delete(state.clone());
            Ok(())
        })?;
        Ok(())
    }

    pub fn state(&self, entity: &str) -> Result<Option<CompositeState>, TwoPhaseError> {
        let raw = self.store.transaction(|txn| Ok(txn.get(&state_key(entity))))?;
        Ok(raw.map(|r| serde_json::from_slice(&r)).transpose()?)
    }

    fn set_state(&self, entity: &str, state: CompositeState) -> Result<(), TwoPhaseError> {
        let encoded = serde_json::to_vec(&state)?;
        self.store.transaction(|txn| {
            txn.put(state_key(entity), encoded.clone());
            Ok(())
        })?;
        Ok(())
    }

    /// Step 2-3: commits the global config, verifies every required
    /// member staged a pending record, applies it locally, then fans
    /// out the merged (global + per-member) config to every peer via
    /// `apply_remote`. On any failure the entity is left `errored`;
    /// the error persists until the next successful retry.
    pub async fn commit<ApplyLocal, ApplyRemote, Fut>(
        &self,
        entity: &str,
        required_members: &[MemberId],
        local_member: MemberId,
        global_config: Value,
        apply_local: ApplyLocal,
        apply_remote: ApplyRemote,
    ) -> Result<(), TwoPhaseError>
    where
        ApplyLocal: FnOnce(Value) -> Result<(), ClusterError>,
        ApplyRemote: Fn(MemberId, Value) -> Fut,
        Fut: std::future::Future<Output = Result<(), ClusterError>> + Send + 'static,
    {
        let pending = self.pending_members(entity)?;
        for member in required_members {
            if !pending.iter().any(|(id, _)| id == member) {
                return Err(TwoPhaseError::NotPending { entity: entity.to_string() });
            }
        }

        self.store.transaction(|txn| {
            txn.put(global_key(entity), serde_json::to_vec(&global_config).unwrap_or_default());
            Ok(())
        })?;

        let merged = |member: MemberId| -> Value {
            let node_config = pending.iter().find(|(id, _)| *id == member).map(|(_, c)| c.clone()).unwrap_or(Value::Null);
            let mut merged = global_config.clone();
            if let (Value::Object(base), Value::Object(over)) = (&mut merged, &node_config) {
                for (k, v) in over {
                    base.insert(k.clone(), v.clone());
                }
            }
            merged
        };

        if let Err(err) = apply_local(merged(local_member)) {
            self.set_state(entity, CompositeState::Errored)?;
            return Err(TwoPhaseError::LocalApply(err));
        }

        let peers: Vec<PeerView> = required_members
            .iter()
            .map(|&id| PeerView {
                id,
                is_self: id == local_member,
                offline: false,
            })
            .collect();

        let result = notify(Scope::Peers, &peers, |id| apply_remote(id, merged(id))).await;

        match result {
            Ok(()) => {
                self.set_state(entity, CompositeState::Created)?;
                Ok(())
            }
            Err(fanout_err) => {
                warn!(entity, failures = fanout_err.failures.len(), "two-phase commit failed on peers");
                self.set_state(entity, CompositeState::Errored)?;
                Err(TwoPhaseError::PartialFailure(fanout_err.failures.len()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterd_store::{InMemoryStore, ReplicaId};
    use serde_json::json;

    fn store() -> Arc<dyn Store> {
        Arc::new(InMemoryStore::new(ReplicaId(1)))
    }

    #[test]
    fn duplicate_stage_is_rejected() {
        let coordinator = Coordinator::new(store());
        coordinator.stage("pool-p", MemberId::new(1), json!({"source": "/d1"})).unwrap();
        let err = coordinator.stage("pool-p", MemberId::new(1), json!({"source": "/d1"})).unwrap_err();
        assert!(matches!(err, TwoPhaseError::AlreadyDefined { .. }));
    }

    #[tokio::test]
    async fn commit_without_any_pending_is_rejected() {
        let coordinator = Coordinator::new(store());
        let result = coordinator
            .commit(
                "pool-p",
                &[MemberId::new(1)],
                MemberId::new(1),
                json!({}),
                |_| Ok(()),
                |_, _| async { Ok(()) },
            )
            .await;
        assert!(matches!(result, Err(TwoPhaseError::NotPending { .. })));
    }

    #[tokio::test]
    async fn commit_marks_created_when_every_peer_succeeds() {
        let coordinator = Coordinator::new(store());
        coordinator.stage("pool-p", MemberId::new(1), json!({"source": "/d1"})).unwrap();
        coordinator.stage("pool-p", MemberId::new(2), json!({"source": "/d2"})).unwrap();

        coordinator
            .commit(
                "pool-p",
                &[MemberId::new(1), MemberId::new(2)],
                MemberId::new(1),
                json!({"driver": "dir"}),
                |_| Ok(()),
                |_, _| async { Ok(()) },
            )
            .await
            .unwrap();

        assert_eq!(coordinator.state("pool-p").unwrap(), Some(CompositeState::Created));
    }

    #[tokio::test]
    async fn commit_marks_errored_when_a_peer_fails() {
        let coordinator = Coordinator::new(store());
        coordinator.stage("pool-p", MemberId::new(1), json!({})).unwrap();
        coordinator.stage("pool-p", MemberId::new(2), json!({})).unwrap();

        let result = coordinator
            .commit(
                "pool-p",
                &[MemberId::new(1), MemberId::new(2)],
                MemberId::new(1),
                json!({}),
                |_| Ok(()),
                |id, _| async move {
                    if id == MemberId::new(2) {
                        Err(ClusterError::internal("disk full"))
                    } else {
                        Ok(())
                    }
                },
            )
            .await;

        assert!(matches!(result, Err(TwoPhaseError::PartialFailure(1))));
        assert_eq!(coordinator.state("pool-p").unwrap(), Some(CompositeState::Errored));
    }
}
