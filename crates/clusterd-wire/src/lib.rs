//! Wire-level types shared by the REST surface and the cluster-internal
//! protocol.

mod control;
mod envelope;
mod notification;

pub use control::ControlMessage;
pub use envelope::{error_kind_status, ApiResponse, RequestParams};
pub use notification::{ClusterNotification, CLUSTER_NOTIFICATION_HEADER};
