//! The external authorizer's decision surface.
//!
//! The authorizer itself (OIDC/mTLS identity resolution, RBAC/ABAC
//! policy evaluation) is an external collaborator; the router only
//! consumes its yes/no decision for `(identity, entity, action)`.

use clusterd_types::EntityRef;

pub trait Authorizer: Send + Sync {
    fn authorize(&self, identity: &str, entity: &EntityRef, action: &str) -> bool;
}

/// Authorizer that allows everything, for tests and for single-user
/// deployments with authorization delegated entirely to the transport
/// layer (mTLS client certificates).
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _identity: &str, _entity: &EntityRef, _action: &str) -> bool {
        true
    }
}
