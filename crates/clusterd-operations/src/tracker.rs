//! Operation tracker.

use crate::error::OperationError;
use crate::handlers::{box_handler, BoxFuture, OnCancel, OnRun};
use clusterd_store::{Store, StoreExt};
use clusterd_types::{ClusterError, MemberId, Operation, OperationClass, OperationId, OperationState};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

fn key(id: OperationId) -> String {
    format!("operations/{id}")
}

struct InFlight {
    on_cancel: Option<OnCancel>,
    state_tx: watch::Sender<OperationState>,
}

pub struct OperationTracker {
    store: Arc<dyn Store>,
    local_member: MemberId,
    pending_run: Mutex<BTreeMap<OperationId, OnRun>>,
    in_flight: Mutex<BTreeMap<OperationId, InFlight>>,
}

impl OperationTracker {
    pub fn new(store: Arc<dyn Store>, local_member: MemberId) -> Self {
        Self {
            store,
            local_member,
            pending_run: Mutex::new(BTreeMap::new()),
            in_flight: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, id: OperationId) -> Result<Operation, OperationError> {
        let raw = self.store.transaction(|txn| Ok(txn.get(&key(id))))?;
        let raw = raw.ok_or(OperationError::NotFound(id))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn list(&self) -> Result<Vec<Operation>, OperationError> {
        let rows = self.store.transaction(|txn| Ok(txn.scan_prefix("operations/")))?;
        rows.into_iter().map(|(_, raw)| Ok(serde_json::from_slice(&raw)?)).collect()
    }

    fn persist(&self, operation: &Operation) -> Result<(), OperationError> {
        let encoded = serde_json::to_vec(operation)?;
        self.store.transaction(|txn| {
            txn.put(key(operation.id), encoded.clone());
            Ok(())
        })?;
        Ok(())
    }

    /// Registers a new operation in `Pending` state. The operation is
    /// durable as soon as this returns; `run` must still be called to
    /// start the worker.
    pub fn create<F1, Fut1, F2, Fut2>(
        &self,
        class: OperationClass,
        project: Option<String>,
        description: impl Into<String>,
        resources: Vec<String>,
        on_run: F1,
        on_cancel: Option<F2>,
    ) -> Result<OperationId, OperationError>
    where
        F1: FnOnce() -> Fut1 + Send + 'static,
        Fut1: Future<Output = Result<(), ClusterError>> + Send + 'static,
        F2: FnOnce() -> Fut2 + Send + 'static,
        Fut2: Future<Output = Result<(), ClusterError>> + Send + 'static,
    {
        let operation = Operation::new(self.local_member, class, project, description, resources, on_cancel.is_some());
        let id = operation.id;
        self.persist(&operation)?;

        self.pending_run.lock().expect("pending_run lock poisoned").insert(id, box_handler(on_run));
        let (state_tx, _) = watch::channel(OperationState::Pending);
        self.in_flight.lock().expect("in_flight lock poisoned").insert(
            id,
            InFlight {
                on_cancel: on_cancel.map(box_handler),
                state_tx,
            },
        );
        Ok(id)
    }

    /// Transitions `pending -> running` and spawns `on_run` on a
    /// worker task. Returns as soon as the transition is durable; the
    /// operation completes asynchronously.
    pub fn run(self: &Arc<Self>, id: OperationId) -> Result<(), OperationError> {
        let on_run = self
            .pending_run
            .lock()
            .expect("pending_run lock poisoned")
            .remove(&id)
            .ok_or(OperationError::NotFound(id))?;

        let mut operation = self.get(id)?;
        operation
            .transition(OperationState::Running)
            .map_err(|e| OperationError::InvalidTransition(e.to_string()))?;
        self.persist(&operation)?;
        self.publish_state(id, OperationState::Running);

        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let result = run_handler(on_run).await;
            tracker.finish(id, result);
        });
        Ok(())
    }

    fn finish(&self, id: OperationId, result: Result<(), ClusterError>) {
        let mut operation = match self.get(id) {
            Ok(op) => op,
            Err(err) => {
                warn!(%id, %err, "operation vanished before completion");
                return;
            }
        };
        let (next, err) = match result {
            Ok(()) => (OperationState::Success, None),
            Err(err) => (OperationState::Failure, Some(err.to_string())),
        };
        operation.err = err;
        if operation.transition(next).is_ok() {
            if let Err(err) = self.persist(&operation) {
                warn!(%id, %err, "failed to persist operation completion");
            }
            self.publish_state(id, next);
        }
    }

    fn publish_state(&self, id: OperationId, state: OperationState) {
        if let Some(in_flight) = self.in_flight.lock().expect("in_flight lock poisoned").get(&id) {
            let _ = in_flight.state_tx.send(state);
        }
    }

    /// Blocks until `id` reaches a terminal state or `timeout` elapses.
    pub async fn wait(&self, id: OperationId, timeout: Duration) -> Result<Operation, OperationError> {
        let mut receiver = {
            let guard = self.in_flight.lock().expect("in_flight lock poisoned");
            guard.get(&id).map(|f| f.state_tx.subscribe())
        };

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let operation = self.get(id)?;
            if operation.state.is_terminal() {
                return Ok(operation);
            }
            let Some(rx) = receiver.as_mut() else {
                return Err(OperationError::WaitTimedOut);
            };
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(OperationError::WaitTimedOut);
            }
            if tokio::time::timeout(remaining, rx.changed()).await.is_err() {
                return Err(OperationError::WaitTimedOut);
            }
        }
    }

    /// Invokes `on_cancel` if one was registered; fails with
    /// `CannotCancel` otherwise.
    pub async fn cancel(&self, id: OperationId) -> Result<(), OperationError> {
        let on_cancel = {
            let mut guard = self.in_flight.lock().expect("in_flight lock poisoned");
            match guard.get_mut(&id) {
                Some(in_flight) => in_flight.on_cancel.take(),
                None => return Err(OperationError::NotFound(id)),
            }
        };
        let Some(on_cancel) = on_cancel else {
            return Err(OperationError::CannotCancel);
        };

        let result = run_handler(on_cancel).await;
        let mut operation = self.get(id)?;
        match result {
            Ok(()) => {
                let _ = operation.transition(OperationState::Cancelled);
            }
            Err(err) => {
                operation.err = Some(err.to_string());
                let _ = operation.transition(OperationState::Failure);
            }
        }
        self.persist(&operation)?;
        self.publish_state(id, operation.state);
        Ok(())
    }

    pub fn update_metadata(&self, id: OperationId, patch: BTreeMap<String, serde_json::Value>) -> Result<u64, OperationError> {
        let mut operation = self.get(id)?;
        operation.merge_metadata(patch);
        let version = operation.metadata_version;
        self.persist(&operation)?;
        Ok(version)
    }

    /// Marks every non-terminal operation owned by `member` as
    /// `Failure`/`member_offline`. Called by the membership
    /// manager the moment it marks a member offline. Returns the ids
    /// closed so the caller can tear down any in-flight websockets.
    pub fn mark_member_offline(&self, member: MemberId) -> Result<Vec<OperationId>, OperationError> {
        let mut closed = Vec::new();
        for mut operation in self.list()? {
            if operation.creator != member || operation.state.is_terminal() {
                continue;
            }
            operation.err = Some("member_offline".to_string());
            if operation.transition(OperationState::Failure).is_ok() {
                self.persist(&operation)?;
                self.publish_state(operation.id, OperationState::Failure);
                closed.push(operation.id);
            }
        }
        if !closed.is_empty() {
            info!(%member, count = closed.len(), "closed operations for offline member");
        }
        Ok(closed)
    }
}

async fn run_handler(handler: Box<dyn FnOnce() -> BoxFuture<'static, Result<(), ClusterError>> + Send>) -> Result<(), ClusterError> {
    handler().await
}
