//! Core type definitions shared across the cluster control plane.
//!
//! - Identifiers ([`MemberId`], [`OperationId`])
//! - Temporal types ([`Timestamp`])
//! - Membership ([`Member`], [`Role`], [`MemberState`])
//! - Projects and the entity taxonomy ([`Project`], [`EntityType`], [`EntityRef`])
//! - Composite (cluster-wide) entity lifecycle ([`CompositeState`])
//! - Long-running operations ([`Operation`], [`OperationState`])
//! - The event bus payload ([`Event`], [`EventType`])
//! - The uniform error surface ([`ClusterError`], [`ErrorKind`])

mod composite;
mod entity;
mod error;
mod event;
mod member;
mod operation;
mod project;
mod timestamp;

pub use composite::CompositeState;
pub use entity::{EntityRef, EntityType, ParseEntityRefError};
pub use error::{ClusterError, ErrorKind};
pub use event::{Event, EventPayload, EventType};
pub use member::{ClusterGroupName, FailureDomain, Member, MemberId, MemberState, Role};
pub use operation::{Operation, OperationClass, OperationId, OperationState};
pub use project::{Project, ProjectFeatures};
pub use timestamp::Timestamp;
