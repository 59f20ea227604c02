//! Cluster-internal protocol marker.
//!
//! A cluster notification is the same REST surface as the public API,
//! authenticated with the cluster certificate instead of a client
//! identity, and carrying a header that the router treats as terminal:
//! a request bearing this header is never forwarded again, which is
//! what prevents routing loops between members.

pub const CLUSTER_NOTIFICATION_HEADER: &str = "x-clusterd-notification";

/// Whether an inbound request was a peer-to-peer cluster notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterNotification(bool);

impl ClusterNotification {
    pub fn from_header_value(value: Option<&str>) -> Self {
        Self(value == Some("true"))
    }

    pub fn is_notification(self) -> bool {
        self.0
    }

    pub fn header_value(self) -> Option<&'static str> {
        self.0.then_some("true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_header_is_not_a_notification() {
        assert!(!ClusterNotification::from_header_value(None).is_notification());
    }

    #[test]
    fn true_header_marks_a_notification() {
        assert!(ClusterNotification::from_header_value(Some("true")).is_notification());
    }

    #[test]
    fn round_trips_through_header_value() {
        let marked = ClusterNotification::from_header_value(Some("true"));
        assert_eq!(marked.header_value(), Some("true"));
    }
}
