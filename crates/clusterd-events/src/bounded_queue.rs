//! Bounded per-subscriber queue with a fixed high-water mark.
//!
//! A lock-free `ArrayQueue` that signals backpressure instead of
//! growing without bound. Here backpressure means "drop the
//! subscriber once its queue exceeds a fixed high-water mark" rather
//! than "reject the write".

use crossbeam_queue::ArrayQueue;

pub enum PushResult<T> {
    Ok,
    QueueFull(T),
}

pub struct BoundedQueue<T> {
    inner: ArrayQueue<T>,
}

impl<T> BoundedQueue<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            inner: ArrayQueue::new(capacity),
        }
    }

    pub fn try_push(&self, item: T) -> PushResult<T> {
        match self.inner.push(item) {
            Ok(()) => PushResult::Ok,
            Err(item) => PushResult::QueueFull(item),
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_past_capacity_reports_backpressure() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(2);
        assert!(matches!(queue.try_push(1), PushResult::Ok));
        assert!(matches!(queue.try_push(2), PushResult::Ok));
        assert!(matches!(queue.try_push(3), PushResult::QueueFull(3)));
    }

    #[test]
    fn pop_drains_in_fifo_order() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(4);
        queue.try_push(1);
        queue.try_push(2);
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), None);
    }
}
