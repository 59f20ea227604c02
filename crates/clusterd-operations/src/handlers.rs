//! Type-erased async handlers invoked by the tracker. Boxed rather than
//! generic so the tracker can hold a heterogeneous map of in-flight
//! operations without one monomorphized tracker type per job shape.

use clusterd_types::ClusterError;
use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type OnRun = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), ClusterError>> + Send>;
pub type OnCancel = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), ClusterError>> + Send>;

pub fn box_handler<F, Fut>(handler: F) -> Box<dyn FnOnce() -> BoxFuture<'static, Result<(), ClusterError>> + Send>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ClusterError>> + Send + 'static,
{
    Box::new(move || Box::pin(handler()) as BoxFuture<'static, Result<(), ClusterError>>)
}
