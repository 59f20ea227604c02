use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::member::MemberId;
use crate::timestamp::Timestamp;

/// Identifies a server-side long-running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationClass {
    Task,
    Websocket,
    Token,
}

/// Terminal states are `Success`, `Failure` and `Cancelled`: once
/// reached, state and result never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    Pending,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }
}

impl Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationState::Pending => "pending",
            OperationState::Running => "running",
            OperationState::Success => "success",
            OperationState::Failure => "failure",
            OperationState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A registered long-running, cancellable, waitable server-side job.
///
/// Lives on exactly one member (its `creator`); other members only
/// ever read-forward to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub creator: MemberId,
    pub project: Option<String>,
    pub class: OperationClass,
    pub state: OperationState,
    pub description: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub metadata_version: u64,
    /// `fd-id -> secret`, websocket-class operations only. Consumed
    /// (removed) the moment the matching connection redeems it.
    pub websocket_secrets: BTreeMap<String, String>,
    pub resources: Vec<String>,
    pub cancellable: bool,
    pub err: Option<String>,
}

impl Operation {
    pub fn new(
        creator: MemberId,
        class: OperationClass,
        project: Option<String>,
        description: impl Into<String>,
        resources: Vec<String>,
        cancellable: bool,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: OperationId::new_v4(),
            creator,
            project,
            class,
            state: OperationState::Pending,
            description: description.into(),
            created_at: now,
            updated_at: now,
            metadata: BTreeMap::new(),
            metadata_version: 0,
            websocket_secrets: BTreeMap::new(),
            resources,
            cancellable,
            err: None,
        }
    }

    /// Applies a state transition, refusing to move out of a terminal
    /// state: an operation that has completed, failed or been cancelled
    /// never transitions again.
    pub fn transition(&mut self, next: OperationState) -> Result<(), &'static str> {
        if self.state.is_terminal() {
            return Err("operation already in a terminal state");
        }
        self.state = next;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    pub fn merge_metadata(&mut self, patch: BTreeMap<String, serde_json::Value>) {
        self.metadata.extend(patch);
        self.metadata_version += 1;
        self.updated_at = Timestamp::now();
    }
}
