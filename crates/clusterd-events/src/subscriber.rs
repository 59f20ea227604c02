//! A single subscriber's filter and inbox.

use crate::bounded_queue::{BoundedQueue, PushResult};
use clusterd_types::{Event, EventType};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a subscriber wants to see. `None` in either field means "any".
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub event_type: Option<EventType>,
    pub project: Option<String>,
}

impl SubscriptionFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(project) = &self.project {
            if event.project.as_deref() != Some(project.as_str()) {
                return false;
            }
        }
        true
    }
}

pub struct Subscriber {
    pub id: SubscriberId,
    pub filter: SubscriptionFilter,
    inbox: BoundedQueue<Event>,
}

impl Subscriber {
    pub fn new(filter: SubscriptionFilter, high_water_mark: usize) -> Self {
        Self {
            id: SubscriberId::next(),
            filter,
            inbox: BoundedQueue::new(high_water_mark),
        }
    }

    /// Returns `false` if the subscriber's queue is full and it should
    /// be dropped.
    pub fn deliver(&self, event: Event) -> bool {
        if !self.filter.matches(&event) {
            return true;
        }
        matches!(self.inbox.try_push(event), PushResult::Ok)
    }

    pub fn poll(&self) -> Option<Event> {
        self.inbox.try_pop()
    }

    pub fn pending(&self) -> usize {
        self.inbox.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterd_types::MemberId;

    #[test]
    fn filter_rejects_mismatched_project() {
        let filter = SubscriptionFilter {
            event_type: None,
            project: Some("prod".into()),
        };
        let event = clusterd_types::Event::lifecycle(
            MemberId::new(1),
            Some("dev".into()),
            "created",
            "/1.0/instances/x",
            None,
        );
        assert!(!filter.matches(&event));
    }

    #[test]
    fn full_inbox_signals_drop() {
        let subscriber = Subscriber::new(SubscriptionFilter::default(), 1);
        let event = clusterd_types::Event::logging(MemberId::new(1), "info", "hi");
        assert!(subscriber.deliver(event.clone()));
        assert!(!subscriber.deliver(event));
    }
}
