use clusterd_types::{ClusterError, MemberId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvacError {
    #[error("no instance {project}/{name}")]
    InstanceNotFound { project: String, name: String },

    #[error("instance {project}/{name} already exists")]
    InstanceExists { project: String, name: String },

    #[error("no warning {0}")]
    WarningNotFound(uuid::Uuid),

    #[error("member {0} still hosts {1} instances")]
    MemberNotEmpty(MemberId, usize),

    #[error("member {0} must be evacuated or offline before deletion")]
    MemberStillActive(MemberId),

    #[error("runtime refused to stop instance: {0}")]
    Runtime(ClusterError),

    #[error("membership error: {0}")]
    Membership(#[from] clusterd_membership::Error),

    #[error("store error: {0}")]
    Store(#[from] clusterd_store::StoreError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<EvacError> for ClusterError {
    fn from(err: EvacError) -> Self {
        match err {
            EvacError::InstanceNotFound { project, name } => ClusterError::not_found(format!("instance {project}/{name}")),
            EvacError::InstanceExists { project, name } => {
                ClusterError::conflict(format!("instance {project}/{name} already exists"))
            }
            EvacError::WarningNotFound(id) => ClusterError::not_found(format!("warning {id}")),
            EvacError::MemberNotEmpty(..) | EvacError::MemberStillActive(_) => ClusterError::bad_request(err.to_string()),
            EvacError::Runtime(inner) => inner,
            other => ClusterError::internal(other.to_string()),
        }
    }
}
