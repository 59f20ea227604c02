use clusterd_types::{ClusterError, OperationId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("no operation {0}")]
    NotFound(OperationId),

    #[error("operation has no cancel handler")]
    CannotCancel,

    #[error("websocket secret already redeemed")]
    SecretAlreadyRedeemed,

    #[error("unknown websocket secret")]
    UnknownSecret,

    #[error("wait timed out before the operation reached a terminal state")]
    WaitTimedOut,

    #[error("invalid operation state transition: {0}")]
    InvalidTransition(String),

    #[error("store error: {0}")]
    Store(#[from] clusterd_store::StoreError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<OperationError> for ClusterError {
    fn from(err: OperationError) -> Self {
        match err {
            OperationError::NotFound(id) => ClusterError::not_found(format!("operation {id}")),
            OperationError::CannotCancel => ClusterError::cannot_cancel(),
            other => ClusterError::internal(other.to_string()),
        }
    }
}
