//! The in-process event bus.

use crate::subscriber::{Subscriber, SubscriberId, SubscriptionFilter};
use clusterd_types::Event;
use std::sync::RwLock;
use tracing::debug;

pub const DEFAULT_HIGH_WATER_MARK: usize = 1024;

/// Fans out events to every matching subscriber, best-effort and
/// per-subscriber ordered. A subscriber whose queue fills up is
/// dropped rather than allowed to apply backpressure to publishers.
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    high_water_mark: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_high_water_mark(DEFAULT_HIGH_WATER_MARK)
    }

    pub fn with_high_water_mark(high_water_mark: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            high_water_mark,
        }
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> SubscriberId {
        let subscriber = Subscriber::new(filter, self.high_water_mark);
        let id = subscriber.id;
        self.subscribers.write().expect("subscribers lock poisoned").push(subscriber);
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.write().expect("subscribers lock poisoned").retain(|s| s.id != id);
    }

    pub fn publish(&self, event: Event) {
        let mut subscribers = self.subscribers.write().expect("subscribers lock poisoned");
        let before = subscribers.len();
        subscribers.retain(|s| s.deliver(event.clone()));
        let dropped = before - subscribers.len();
        if dropped > 0 {
            debug!(dropped, "dropped slow event subscribers");
        }
    }

    pub fn poll(&self, id: SubscriberId) -> Option<Event> {
        self.subscribers
            .read()
            .expect("subscribers lock poisoned")
            .iter()
            .find(|s| s.id == id)
            .and_then(Subscriber::poll)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().expect("subscribers lock poisoned").len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterd_types::{EventType, MemberId};

    #[test]
    fn matching_subscriber_receives_event() {
        let bus = EventBus::new();
        let id = bus.subscribe(SubscriptionFilter {
            event_type: Some(EventType::Logging),
            project: None,
        });
        bus.publish(Event::logging(MemberId::new(1), "info", "hello"));
        assert!(bus.poll(id).is_some());
    }

    #[test]
    fn non_matching_subscriber_receives_nothing() {
        let bus = EventBus::new();
        let id = bus.subscribe(SubscriptionFilter {
            event_type: Some(EventType::Operation),
            project: None,
        });
        bus.publish(Event::logging(MemberId::new(1), "info", "hello"));
        assert!(bus.poll(id).is_none());
    }

    #[test]
    fn slow_subscriber_is_dropped() {
        let bus = EventBus::with_high_water_mark(1);
        let id = bus.subscribe(SubscriptionFilter::default());
        bus.publish(Event::logging(MemberId::new(1), "info", "one"));
        bus.publish(Event::logging(MemberId::new(1), "info", "two"));
        assert_eq!(bus.subscriber_count(), 0);
        let _ = id;
    }
}
