use clusterd_types::{ClusterError, MemberId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TwoPhaseError {
    #[error("pending record for {entity}/{member} already exists")]
    AlreadyDefined { entity: String, member: MemberId },

    #[error("no pending record exists for {entity}")]
    NotPending { entity: String },

    #[error("store error: {0}")]
    Store(#[from] clusterd_store::StoreError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("commit failed on {0} of the cluster's peers")]
    PartialFailure(usize),

    #[error("local apply failed: {0}")]
    LocalApply(ClusterError),
}

impl From<TwoPhaseError> for ClusterError {
    fn from(err: TwoPhaseError) -> Self {
        match err {
            TwoPhaseError::AlreadyDefined { .. } => ClusterError::already_defined(),
            TwoPhaseError::NotPending { .. } => ClusterError::not_pending(),
            TwoPhaseError::LocalApply(inner) => inner,
            other => ClusterError::internal(other.to_string()),
        }
    }
}
