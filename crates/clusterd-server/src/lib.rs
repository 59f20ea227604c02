//! The REST/websocket API surface for the cluster daemon.
//!
//! Every endpoint is rooted at `/1.0` and answers with the standard
//! envelope (`sync` / `async` / `error`). Any member can answer any
//! request: member-scoped entities are resolved through the routing
//! decision tree and proxied to their owner when they live elsewhere,
//! and cluster notifications (peer-to-peer calls marked by header) are
//! always handled where they land.
//!
//! The crate exposes [`routes::router`] to build the axum application
//! and [`ServerContext`] as the single state value carried on every
//! request; the daemon binary owns binding the listener and the
//! process lifecycle.

pub mod auth;
pub mod channels;
pub mod dispatch;
mod error;
pub mod forward;
pub mod metrics;
pub mod routes;
mod state;

pub use dispatch::{dispatch, Dispatch};
pub use error::{envelope, ApiError, ApiResult};
pub use forward::Forwarder;
pub use metrics::Metrics;
pub use state::ServerContext;
