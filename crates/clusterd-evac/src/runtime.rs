//! The instance runtime seam.
//!
//! Actually stopping and starting containers/VMs belongs to the
//! runtime integration, an external collaborator. The evacuator only
//! needs these two calls; everything else about the runtime stays
//! outside the control plane.

use crate::registry::Instance;
use clusterd_types::ClusterError;

pub trait InstanceRuntime: Send + Sync {
    /// Gracefully stops the workload. Must be idempotent: stopping an
    /// already-stopped instance succeeds.
    fn stop(&self, instance: &Instance) -> Result<(), ClusterError>;

    fn start(&self, instance: &Instance) -> Result<(), ClusterError>;
}

/// Runtime that accepts every request without doing anything. Used by
/// tests and by daemons running with the runtime integration disabled.
#[derive(Debug, Default)]
pub struct NoopRuntime;

impl InstanceRuntime for NoopRuntime {
    fn stop(&self, _instance: &Instance) -> Result<(), ClusterError> {
        Ok(())
    }

    fn start(&self, _instance: &Instance) -> Result<(), ClusterError> {
        Ok(())
    }
}
