//! Long-running operation tracker: create/run/wait/
//! cancel, metadata patching, websocket secret gating, and the
//! member-offline failure path.

mod error;
mod handlers;
mod tracker;
mod websocket;

pub use error::OperationError;
pub use handlers::{BoxFuture, OnCancel, OnRun};
pub use tracker::OperationTracker;
pub use websocket::SecretGate;

pub use clusterd_types::{Operation, OperationClass, OperationId, OperationState};

#[cfg(test)]
mod tests {
    use super::*;
    use clusterd_store::{InMemoryStore, ReplicaId};
    use clusterd_types::{ClusterError, MemberId};
    use std::sync::Arc;
    use std::time::Duration;

    fn tracker() -> Arc<OperationTracker> {
        let store: Arc<dyn clusterd_store::Store> = Arc::new(InMemoryStore::new(ReplicaId(1)));
        Arc::new(OperationTracker::new(store, MemberId::new(1)))
    }

    #[tokio::test]
    async fn run_transitions_to_success() {
        let tracker = tracker();
        let id = tracker
            .create(
                OperationClass::Task,
                Some("default".into()),
                "copy image",
                vec![],
                || async { Ok(()) },
                None::<fn() -> std::future::Ready<Result<(), ClusterError>>>,
            )
            .unwrap();
        tracker.run(id).unwrap();
        let operation = tracker.wait(id, Duration::from_secs(1)).await.unwrap();
        assert_eq!(operation.state, OperationState::Success);
    }

    #[tokio::test]
    async fn run_transitions_to_failure_on_error() {
        let tracker = tracker();
        let id = tracker
            .create(
                OperationClass::Task,
                None,
                "bad job",
                vec![],
                || async { Err(ClusterError::internal("disk full")) },
                None::<fn() -> std::future::Ready<Result<(), ClusterError>>>,
            )
            .unwrap();
        tracker.run(id).unwrap();
        let operation = tracker.wait(id, Duration::from_secs(1)).await.unwrap();
        assert_eq!(operation.state, OperationState::Failure);
        assert!(operation.err.is_some());
    }

    #[tokio::test]
    async fn cancel_without_a_handler_is_rejected() {
        let tracker = tracker();
        let id = tracker
            .create(
                OperationClass::Task,
                None,
                "job",
                vec![],
                || async { Ok(()) },
                None::<fn() -> std::future::Ready<Result<(), ClusterError>>>,
            )
            .unwrap();
        let err = tracker.cancel(id).await.unwrap_err();
        assert!(matches!(err, OperationError::CannotCancel));
    }

    #[tokio::test]
    async fn cancel_with_a_handler_transitions_to_cancelled() {
        let tracker = tracker();
        let id = tracker
            .create(
                OperationClass::Task,
                None,
                "job",
                vec![],
                || async { std::future::pending::<Result<(), ClusterError>>().await },
                Some(|| async { Ok(()) }),
            )
            .unwrap();
        tracker.cancel(id).await.unwrap();
        let operation = tracker.get(id).unwrap();
        assert_eq!(operation.state, OperationState::Cancelled);
    }

    #[tokio::test]
    async fn metadata_updates_bump_the_version_counter() {
        let tracker = tracker();
        let id = tracker
            .create(
                OperationClass::Task,
                None,
                "job",
                vec![],
                || async { Ok(()) },
                None::<fn() -> std::future::Ready<Result<(), ClusterError>>>,
            )
            .unwrap();
        let mut patch = std::collections::BTreeMap::new();
        patch.insert("progress".to_string(), serde_json::json!(50));
        let version = tracker.update_metadata(id, patch).unwrap();
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn offline_member_fails_its_non_terminal_operations() {
        let tracker = tracker();
        let id = tracker
            .create(
                OperationClass::Task,
                None,
                "job",
                vec![],
                || async { std::future::pending::<Result<(), ClusterError>>().await },
                None::<fn() -> std::future::Ready<Result<(), ClusterError>>>,
            )
            .unwrap();
        tracker.run(id).unwrap();
        let closed = tracker.mark_member_offline(MemberId::new(1)).unwrap();
        assert_eq!(closed, vec![id]);
        let operation = tracker.get(id).unwrap();
        assert_eq!(operation.state, OperationState::Failure);
        assert_eq!(operation.err.as_deref(), Some("member_offline"));
    }
}
