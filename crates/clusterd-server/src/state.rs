//! The per-daemon server context.
//!
//! One value, constructed at startup and carried on every request via
//! the axum state extractor. There is no ambient global state: every
//! handler and background task reads the store, roster, tracker and
//! event bus through this context.

use crate::channels::OperationChannels;
use crate::forward::Forwarder;
use crate::metrics::Metrics;
use clusterd_config::DaemonConfig;
use clusterd_crypto::ClusterTrustStore;
use clusterd_evac::{Evacuator, InstanceRegistry, InstanceRuntime, NoopRuntime, WarningRegistry};
use clusterd_events::EventBus;
use clusterd_membership::Roster;
use clusterd_notify::PeerView;
use clusterd_operations::OperationTracker;
use clusterd_placement::{Candidate, PlacementEngine, SchedulerMode};
use clusterd_router::{Authorizer, AllowAll, OwnerLookup, RouteDecision, Router, RoutingError};
use clusterd_store::Store;
use clusterd_twophase::Coordinator;
use clusterd_types::{
    ClusterError, EntityRef, EntityType, Event, Member, MemberId, OperationId, OperationState, Timestamp,
};
use clusterd_wire::{ClusterNotification, RequestParams};
use std::str::FromStr;
use std::sync::{Arc, RwLock};

pub struct ServerContext {
    pub config: DaemonConfig,
    pub local_member: MemberId,
    pub local_name: String,
    pub store: Arc<dyn Store>,
    pub roster: Roster,
    pub instances: InstanceRegistry,
    pub warnings: WarningRegistry,
    pub tracker: Arc<OperationTracker>,
    pub events: Arc<EventBus>,
    pub coordinator: Coordinator,
    pub engine: PlacementEngine,
    pub runtime: Arc<dyn InstanceRuntime>,
    pub authorizer: Box<dyn Authorizer>,
    pub trust: RwLock<ClusterTrustStore>,
    pub forwarder: Forwarder,
    pub channels: OperationChannels,
    pub metrics: Metrics,
}

impl ServerContext {
    /// Builds a context over `store`, registering `local` in the roster
    /// if it is not already present.
    pub fn new(config: DaemonConfig, local: Member, store: Arc<dyn Store>) -> Self {
        let scheduler_mode = match config.scheduler.instance {
            clusterd_config::SchedulerMode::All => SchedulerMode::All,
            clusterd_config::SchedulerMode::Manual => SchedulerMode::Manual,
            clusterd_config::SchedulerMode::Group => SchedulerMode::Group,
        };
        let roster = Roster::new(Arc::clone(&store));
        if roster.get(local.id).is_err() {
            roster.insert(&local).expect("empty roster accepts the local member");
        }
        Self {
            local_member: local.id,
            local_name: local.name,
            roster,
            instances: InstanceRegistry::new(Arc::clone(&store)),
            warnings: WarningRegistry::new(Arc::clone(&store)),
            tracker: Arc::new(OperationTracker::new(Arc::clone(&store), local.id)),
            events: Arc::new(EventBus::new()),
            coordinator: Coordinator::new(Arc::clone(&store)),
            engine: PlacementEngine::new(scheduler_mode),
            runtime: Arc::new(NoopRuntime),
            authorizer: Box::new(AllowAll),
            trust: RwLock::new(ClusterTrustStore::new()),
            forwarder: Forwarder::new(),
            channels: OperationChannels::new(),
            metrics: Metrics::new(),
            store,
            config,
        }
    }

    pub fn with_engine(mut self, engine: PlacementEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn InstanceRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_authorizer(mut self, authorizer: Box<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn evacuator(&self) -> Evacuator {
        Evacuator::new(
            Roster::new(Arc::clone(&self.store)),
            InstanceRegistry::new(Arc::clone(&self.store)),
            WarningRegistry::new(Arc::clone(&self.store)),
            Arc::clone(&self.runtime),
            self.config.cluster.offline_threshold_secs,
        )
    }

    pub fn members(&self) -> Result<Vec<Member>, ClusterError> {
        Ok(self.roster.list()?)
    }

    pub fn member_by_name(&self, name: &str) -> Result<Member, ClusterError> {
        self.members()?
            .into_iter()
            .find(|m| m.name == name)
            .ok_or_else(|| ClusterError::not_found(format!("cluster member {name}")))
    }

    pub fn member_by_id(&self, id: MemberId) -> Result<Member, ClusterError> {
        Ok(self.roster.get(id)?)
    }

    /// The peer set as the notifier sees it right now.
    pub fn peer_views(&self, now: Timestamp) -> Result<Vec<PeerView>, ClusterError> {
        let threshold = self.config.cluster.offline_threshold_secs;
        Ok(self
            .members()?
            .iter()
            .map(|m| PeerView {
                id: m.id,
                is_self: m.id == self.local_member,
                offline: !m.reachable(now, threshold),
            })
            .collect())
    }

    /// Members eligible to host a new instance, with their current
    /// load, for the placement engine.
    pub fn placement_candidates(&self, now: Timestamp) -> Result<Vec<Candidate>, ClusterError> {
        let threshold = self.config.cluster.offline_threshold_secs;
        let mut candidates = Vec::new();
        for member in self.members()? {
            if !member.is_active() || !member.reachable(now, threshold) {
                continue;
            }
            candidates.push(Candidate {
                id: member.id,
                name: member.name.clone(),
                failure_domain: member.failure_domain.clone(),
                groups: member.groups.iter().cloned().collect(),
                instance_count: self.instances.count_on_member(member.id)?,
            });
        }
        Ok(candidates)
    }

    /// Runs the routing decision tree for one request.
    pub fn route(
        &self,
        entity: &EntityRef,
        identity: &str,
        action: &str,
        params: &RequestParams,
        is_aggregate_list: bool,
        notification: ClusterNotification,
    ) -> Result<RouteDecision, RoutingError> {
        let owners = ContextOwners(self);
        let router = Router::new(&self.roster, self.authorizer.as_ref(), &owners, self.local_member);
        router.route(entity, identity, action, params, is_aggregate_list, notification)
    }

    pub fn emit_lifecycle(&self, project: Option<String>, action: &str, url: &str, requestor: Option<String>) {
        self.events
            .publish(Event::lifecycle(self.local_member, project, action, url, requestor));
    }

    pub fn emit_operation(&self, id: OperationId, state: OperationState) {
        self.metrics.observe_operation(&state.to_string());
        self.events.publish(Event::operation(self.local_member, id, state));
    }
}

/// Owner resolution over the context's domain records: instances (and
/// their snapshots/backups) resolve through the workload registry,
/// operations through their creator member. Node-local storage kinds
/// resolve to this member.
struct ContextOwners<'a>(&'a ServerContext);

impl OwnerLookup for ContextOwners<'_> {
    fn owner_of(&self, entity: &EntityRef) -> Result<Option<MemberId>, ClusterError> {
        let ctx = self.0;
        match entity.kind {
            EntityType::Instance | EntityType::InstanceSnapshot | EntityType::InstanceBackup => {
                let project = entity.project.as_deref().unwrap_or("default");
                let Some(name) = entity.path.first() else {
                    return Ok(None);
                };
                match ctx.instances.get(project, name) {
                    Ok(instance) => Ok(Some(instance.member)),
                    Err(_) => Ok(None),
                }
            }
            EntityType::Operation => {
                let Some(raw) = entity.path.first() else {
                    return Ok(None);
                };
                let Ok(id) = OperationId::from_str(raw) else {
                    return Ok(None);
                };
                match ctx.tracker.get(id) {
                    Ok(operation) => Ok(Some(operation.creator)),
                    Err(_) => Ok(None),
                }
            }
            // Storage volumes live on whichever member holds the pool's
            // local data; their drivers are out of scope, so they are
            // treated as local.
            _ => Ok(Some(ctx.local_member)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterd_evac::Instance;
    use clusterd_store::{InMemoryStore, ReplicaId};
    use clusterd_types::MemberState;

    fn context() -> ServerContext {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(ReplicaId(1)));
        let mut local = Member::new(MemberId::new(1), "m1", "10.0.0.1:8443");
        local.state = MemberState::Created;
        local.last_heartbeat = Timestamp::now();
        ServerContext::new(DaemonConfig::default(), local, store)
    }

    #[test]
    fn context_registers_the_local_member() {
        let ctx = context();
        assert_eq!(ctx.members().unwrap().len(), 1);
        assert_eq!(ctx.member_by_name("m1").unwrap().id, MemberId::new(1));
    }

    #[test]
    fn instance_owner_resolves_through_the_registry() {
        let ctx = context();
        ctx.instances.insert(&Instance::new("default", "web", MemberId::new(7))).unwrap();
        let entity = EntityRef::new(EntityType::Instance, vec!["web".into()]).with_project("default");
        let owners = ContextOwners(&ctx);
        assert_eq!(owners.owner_of(&entity).unwrap(), Some(MemberId::new(7)));
    }

    #[test]
    fn unknown_instance_has_no_owner() {
        let ctx = context();
        let entity = EntityRef::new(EntityType::Instance, vec!["ghost".into()]).with_project("default");
        let owners = ContextOwners(&ctx);
        assert_eq!(owners.owner_of(&entity).unwrap(), None);
    }
}
