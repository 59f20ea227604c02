//! Evacuation and recovery: moving workloads off a member and healing
//! the cluster when it returns.
//!
//! Also home to the workload (instance) registry and the warning
//! records evacuation leaves behind when no placement target exists —
//! both are consumed by the REST surface as well.

mod error;
mod evacuator;
mod registry;
mod runtime;
mod warning;

pub use error::EvacError;
pub use evacuator::{EvacuationReport, Evacuator};
pub use registry::{Instance, InstanceRegistry, InstanceStatus};
pub use runtime::{InstanceRuntime, NoopRuntime};
pub use warning::{WarningRecord, WarningRegistry, WarningStatus};
