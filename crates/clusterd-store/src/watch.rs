//! In-process watch streams over committed writes.
//!
//! `watch(prefix, from_index)` is the primitive the notifier and the
//! event bus build on: rather than polling the store, they subscribe
//! to the keys they care about and get woken only when something under
//! their prefix changes.

use crate::types::OpNumber;
use std::sync::mpsc;

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub key: String,
    pub value: Option<Vec<u8>>,
    pub index: OpNumber,
}

/// A live subscription to writes under a key prefix, starting strictly
/// after `from_index`.
pub struct WatchStream {
    prefix: String,
    receiver: mpsc::Receiver<WatchEvent>,
}

impl WatchStream {
    pub(crate) fn new(prefix: String, receiver: mpsc::Receiver<WatchEvent>) -> Self {
        Self { prefix, receiver }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Blocks until the next matching event, or returns `None` once the
    /// store side of the channel has been dropped.
    pub fn next(&self) -> Option<WatchEvent> {
        self.receiver.recv().ok()
    }

    pub fn try_next(&self) -> Option<WatchEvent> {
        self.receiver.try_recv().ok()
    }
}

pub(crate) struct WatchSender {
    pub prefix: String,
    pub sender: mpsc::Sender<WatchEvent>,
}

impl WatchSender {
    pub(crate) fn matches(&self, key: &str) -> bool {
        key.starts_with(self.prefix.as_str())
    }

    pub(crate) fn notify(&self, event: WatchEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

pub(crate) fn channel(prefix: String) -> (WatchSender, WatchStream) {
    let (tx, rx) = mpsc::channel();
    (
        WatchSender {
            prefix: prefix.clone(),
            sender: tx,
        },
        WatchStream::new(prefix, rx),
    )
}
