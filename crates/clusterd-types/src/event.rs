use serde::{Deserialize, Serialize};

use crate::member::MemberId;
use crate::operation::{OperationId, OperationState};
use crate::timestamp::Timestamp;

/// One of the three channels carried by the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Logging,
    Operation,
    Lifecycle,
}

/// A best-effort, non-persisted notification fanned out across
/// subscribers and, via the `event-hub` mesh, across members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub timestamp: Timestamp,
    pub project: Option<String>,
    pub originator: MemberId,
    pub payload: EventPayload,
}

/// The concrete body of an [`Event`], one variant per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Logging {
        level: String,
        message: String,
    },
    Operation {
        id: OperationId,
        state: OperationState,
    },
    Lifecycle {
        action: String,
        url: String,
        requestor: Option<String>,
    },
}

impl Event {
    pub fn logging(originator: MemberId, level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Logging,
            timestamp: Timestamp::now(),
            project: None,
            originator,
            payload: EventPayload::Logging {
                level: level.into(),
                message: message.into(),
            },
        }
    }

    pub fn operation(originator: MemberId, id: OperationId, state: OperationState) -> Self {
        Self {
            event_type: EventType::Operation,
            timestamp: Timestamp::now(),
            project: None,
            originator,
            payload: EventPayload::Operation { id, state },
        }
    }

    pub fn lifecycle(
        originator: MemberId,
        project: Option<String>,
        action: impl Into<String>,
        url: impl Into<String>,
        requestor: Option<String>,
    ) -> Self {
        Self {
            event_type: EventType::Lifecycle,
            timestamp: Timestamp::now(),
            project,
            originator,
            payload: EventPayload::Lifecycle {
                action: action.into(),
                url: url.into(),
                requestor,
            },
        }
    }
}
