use clusterd_types::{ClusterError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("no such url")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("membership lookup failed: {0}")]
    Membership(#[from] clusterd_membership::Error),
    #[error("owner lookup failed: {0}")]
    OwnerLookup(ClusterError),
}

impl From<RoutingError> for ClusterError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::NotFound => ClusterError::not_found("no such url"),
            RoutingError::Forbidden => ClusterError::new(ErrorKind::Forbidden, "forbidden"),
            RoutingError::Membership(inner) => ClusterError::internal(inner.to_string()),
            RoutingError::OwnerLookup(inner) => inner,
        }
    }
}
