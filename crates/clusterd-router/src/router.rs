//! Routing decision tree.

use crate::authorizer::Authorizer;
use crate::error::RoutingError;
use clusterd_membership::Roster;
use clusterd_types::{ClusterError, EntityRef, MemberId};
use clusterd_wire::{ClusterNotification, RequestParams};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Handle the request on this member.
    Local,
    /// Proxy the request verbatim to the named member, preserving
    /// operation UUIDs and streaming the body/websocket through.
    Forward(MemberId),
    /// Server-scoped aggregate list spanning every member; the caller
    /// uses the notifier to fan out and merge results.
    FanOut,
}

/// Resolves which member a member-scoped entity lives on.
///
/// Ownership is domain data: instances resolve through the workload
/// registry, operations through their creator member. The router only
/// consumes the answer; `None` means the entity does not exist.
pub trait OwnerLookup: Send + Sync {
    fn owner_of(&self, entity: &EntityRef) -> Result<Option<MemberId>, ClusterError>;
}

impl<F> OwnerLookup for F
where
    F: Fn(&EntityRef) -> Result<Option<MemberId>, ClusterError> + Send + Sync,
{
    fn owner_of(&self, entity: &EntityRef) -> Result<Option<MemberId>, ClusterError> {
        self(entity)
    }
}

pub struct Router<'a> {
    roster: &'a Roster,
    authorizer: &'a dyn Authorizer,
    owners: &'a dyn OwnerLookup,
    local_member: MemberId,
}

impl<'a> Router<'a> {
    pub fn new(
        roster: &'a Roster,
        authorizer: &'a dyn Authorizer,
        owners: &'a dyn OwnerLookup,
        local_member: MemberId,
    ) -> Self {
        Self {
            roster,
            authorizer,
            owners,
            local_member,
        }
    }

    /// Resolves the effective project: substitutes `default` when the
    /// entity's project does not have the feature the entity kind
    /// requires. Feature lookup is left to the caller (it requires
    /// the project/feature table, owned by higher layers) via
    /// `project_has_feature`.
    pub fn effective_project(&self, params: &RequestParams, project_has_feature: impl FnOnce(&str) -> bool) -> String {
        let requested = params.effective_project();
        if requested == "default" || project_has_feature(requested) {
            requested.to_string()
        } else {
            "default".to_string()
        }
    }

    /// Runs the decision tree for an already-parsed entity reference.
    /// Cluster-notification requests are always local: the router
    /// never forwards a request it received as an internal
    /// notification, which is what prevents routing loops between
    /// members.
    pub fn route(
        &self,
        entity: &EntityRef,
        identity: &str,
        action: &str,
        params: &RequestParams,
        is_aggregate_list: bool,
        notification: ClusterNotification,
    ) -> Result<RouteDecision, RoutingError> {
        if !self.authorizer.authorize(identity, entity, action) {
            return Err(RoutingError::Forbidden);
        }

        if notification.is_notification() {
            return Ok(RouteDecision::Local);
        }

        // Server-scoped entities and aggregate lists (even of
        // member-scoped kinds) are answerable from any member.
        if !entity.kind.is_member_scoped() || is_aggregate_list {
            return match (&params.target, is_aggregate_list) {
                (None, true) => Ok(RouteDecision::FanOut),
                (None, false) => Ok(RouteDecision::Local),
                (Some(target), _) => Ok(self.forward_to_name(target)),
            };
        }

        // Member-scoped: the entity lives on exactly one member. A
        // create (no record yet) is handled locally, where the caller
        // runs placement first.
        match self.owners.owner_of(entity).map_err(RoutingError::OwnerLookup)? {
            Some(owner) if owner == self.local_member => Ok(RouteDecision::Local),
            Some(owner) => Ok(RouteDecision::Forward(owner)),
            None if action == "create" => Ok(RouteDecision::Local),
            None => Err(RoutingError::NotFound),
        }
    }

    fn forward_to_name(&self, name: &str) -> RouteDecision {
        match self.roster.list().ok().and_then(|members| members.into_iter().find(|m| m.name == name)) {
            Some(member) if member.id == self.local_member => RouteDecision::Local,
            Some(member) => RouteDecision::Forward(member.id),
            None => RouteDecision::Local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorizer::AllowAll;
    use clusterd_store::{InMemoryStore, ReplicaId, Store};
    use clusterd_types::EntityType;
    use std::sync::Arc;

    fn roster() -> Roster {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(ReplicaId(1)));
        Roster::new(store)
    }

    fn no_owners(_: &EntityRef) -> Result<Option<MemberId>, ClusterError> {
        Ok(None)
    }

    fn owned_by_m1(_: &EntityRef) -> Result<Option<MemberId>, ClusterError> {
        Ok(Some(MemberId::new(1)))
    }

    fn owned_by_m2(_: &EntityRef) -> Result<Option<MemberId>, ClusterError> {
        Ok(Some(MemberId::new(2)))
    }

    fn instance_ref(name: &str) -> EntityRef {
        EntityRef {
            kind: EntityType::Instance,
            project: Some("default".into()),
            path: vec![name.into()],
        }
    }

    #[test]
    fn notification_requests_are_never_forwarded() {
        let roster = roster();
        let router = Router::new(&roster, &AllowAll, &no_owners, MemberId::new(1));
        let params = RequestParams {
            target: Some("m2".into()),
            ..Default::default()
        };
        let decision = router
            .route(
                &instance_ref("web"),
                "alice",
                "update",
                &params,
                false,
                ClusterNotification::from_header_value(Some("true")),
            )
            .unwrap();
        assert_eq!(decision, RouteDecision::Local);
    }

    #[test]
    fn server_scoped_list_without_target_fans_out() {
        let roster = roster();
        let router = Router::new(&roster, &AllowAll, &no_owners, MemberId::new(1));
        let entity = EntityRef {
            kind: EntityType::Warning,
            project: None,
            path: vec![],
        };
        let params = RequestParams::default();
        let decision = router
            .route(&entity, "alice", "list", &params, true, ClusterNotification::from_header_value(None))
            .unwrap();
        assert_eq!(decision, RouteDecision::FanOut);
    }

    #[test]
    fn aggregate_list_of_a_member_scoped_kind_fans_out() {
        let roster = roster();
        let router = Router::new(&roster, &AllowAll, &no_owners, MemberId::new(1));
        let collection = EntityRef::new(EntityType::Instance, vec![]).with_project("default");
        let decision = router
            .route(
                &collection,
                "alice",
                "list",
                &RequestParams::default(),
                true,
                ClusterNotification::from_header_value(None),
            )
            .unwrap();
        assert_eq!(decision, RouteDecision::FanOut);
    }

    #[test]
    fn member_scoped_entity_forwards_to_its_owner() {
        let roster = roster();
        let router = Router::new(&roster, &AllowAll, &owned_by_m2, MemberId::new(1));
        let decision = router
            .route(
                &instance_ref("web"),
                "alice",
                "get",
                &RequestParams::default(),
                false,
                ClusterNotification::from_header_value(None),
            )
            .unwrap();
        assert_eq!(decision, RouteDecision::Forward(MemberId::new(2)));
    }

    #[test]
    fn member_scoped_entity_owned_locally_is_local() {
        let roster = roster();
        let router = Router::new(&roster, &AllowAll, &owned_by_m1, MemberId::new(1));
        let decision = router
            .route(
                &instance_ref("web"),
                "alice",
                "get",
                &RequestParams::default(),
                false,
                ClusterNotification::from_header_value(None),
            )
            .unwrap();
        assert_eq!(decision, RouteDecision::Local);
    }

    #[test]
    fn unknown_member_scoped_entity_is_not_found() {
        let roster = roster();
        let router = Router::new(&roster, &AllowAll, &no_owners, MemberId::new(1));
        let result = router.route(
            &instance_ref("ghost"),
            "alice",
            "get",
            &RequestParams::default(),
            false,
            ClusterNotification::from_header_value(None),
        );
        assert!(matches!(result, Err(RoutingError::NotFound)));
    }

    #[test]
    fn create_of_a_new_member_scoped_entity_is_local() {
        let roster = roster();
        let router = Router::new(&roster, &AllowAll, &no_owners, MemberId::new(1));
        let decision = router
            .route(
                &instance_ref("new"),
                "alice",
                "create",
                &RequestParams::default(),
                false,
                ClusterNotification::from_header_value(None),
            )
            .unwrap();
        assert_eq!(decision, RouteDecision::Local);
    }

    #[test]
    fn denied_authorization_is_forbidden() {
        struct DenyAll;
        impl Authorizer for DenyAll {
            fn authorize(&self, _: &str, _: &EntityRef, _: &str) -> bool {
                false
            }
        }
        let roster = roster();
        let router = Router::new(&roster, &DenyAll, &no_owners, MemberId::new(1));
        let result = router.route(
            &instance_ref("web"),
            "mallory",
            "delete",
            &RequestParams::default(),
            false,
            ClusterNotification::from_header_value(None),
        );
        assert!(matches!(result, Err(RoutingError::Forbidden)));
    }
}
