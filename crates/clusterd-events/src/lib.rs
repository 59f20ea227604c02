//! Event bus: three channels fanned out in-process
//! and, for logging and lifecycle events, across the `event-hub` mesh.

mod bounded_queue;
mod bus;
mod hub;
mod subscriber;

pub use bus::{EventBus, DEFAULT_HIGH_WATER_MARK};
pub use hub::{assign_hub, plan_topology, FanoutTopology};
pub use subscriber::{SubscriberId, SubscriptionFilter};
