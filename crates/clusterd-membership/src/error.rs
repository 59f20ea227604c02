//! Error types for membership management.

use clusterd_store::StoreError;
use clusterd_types::MemberId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("member {0} not found")]
    NotFound(MemberId),

    #[error("member {0} is already a member")]
    AlreadyMember(MemberId),

    #[error(
        "member {member} is at schema {member_schema}/api {member_api}, cluster expects {cluster_schema}/{cluster_api}"
    )]
    VersionMismatch {
        member: MemberId,
        member_schema: u32,
        member_api: u32,
        cluster_schema: u32,
        cluster_api: u32,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for clusterd_types::ClusterError {
    fn from(err: Error) -> Self {
        use clusterd_types::ClusterError;
        match err {
            Error::NotFound(id) => ClusterError::not_found(format!("member {id}")),
            Error::AlreadyMember(id) => ClusterError::conflict(format!("member {id} already exists")),
            Error::VersionMismatch { .. } => ClusterError::bad_request(err.to_string()),
            Error::Store(inner) => inner.into(),
            Error::Serde(inner) => ClusterError::internal(inner.to_string()),
        }
    }
}
