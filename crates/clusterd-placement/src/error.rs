use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("no candidate member is eligible for this request")]
    NoEligibleCandidate,

    #[error("cluster group {0:?} has no members")]
    EmptyGroup(String),

    #[error("placement script failed: {0}")]
    ScriptFailed(String),

    #[error("placement script exceeded its execution limits: {0}")]
    ScriptLimitExceeded(String),

    #[error("placement script targeted unknown member {0:?}")]
    UnknownTarget(String),
}

impl From<PlacementError> for clusterd_types::ClusterError {
    fn from(err: PlacementError) -> Self {
        // Placement failures are the client's problem: the request asked
        // for something the cluster cannot satisfy, or the installed
        // script rejected it.
        clusterd_types::ClusterError::bad_request(err.to_string())
    }
}
