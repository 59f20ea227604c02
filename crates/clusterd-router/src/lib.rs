//! Router / forwarder.

mod authorizer;
mod error;
mod router;

pub use authorizer::{AllowAll, Authorizer};
pub use error::RoutingError;
pub use router::{OwnerLookup, RouteDecision, Router};
