//! Storage pool and network endpoints.
//!
//! Both are composite entities: they must exist identically on every
//! member, so create/update/delete run the two-phase protocol. Clients
//! first stage node-specific config with `?target=<member>`, then
//! commit the global config with an untargeted request; the commit
//! applies locally and fans the merged config out to every peer as a
//! cluster notification.

use crate::dispatch::{dispatch, Dispatch};
use crate::error::{envelope, ApiError, ApiResult};
use crate::routes::profiles::check_etag;
use crate::state::ServerContext;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use clusterd_crypto::ContentHash;
use clusterd_store::StoreExt;
use clusterd_types::{ClusterError, CompositeState, EntityRef, EntityType, MemberId, Timestamp};
use clusterd_wire::{ApiResponse, RequestParams};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Serializes two-phase commits per entity kind, so two concurrent pool
/// creates cannot interleave their fan-outs.
static POOL_LOCK: Mutex<()> = Mutex::const_new(());
static NETWORK_LOCK: Mutex<()> = Mutex::const_new(());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeKind {
    /// URL segment, e.g. `storage-pools`.
    pub plural: &'static str,
    /// Store key prefix for committed records.
    pub prefix: &'static str,
    /// Device-config key that marks an instance as referencing this
    /// entity, for the delete-time integrity check.
    pub device_ref: &'static str,
    pub lifecycle_noun: &'static str,
    pub entity_type: EntityType,
}

pub const POOLS: CompositeKind = CompositeKind {
    plural: "storage-pools",
    prefix: "pools",
    device_ref: "pool",
    lifecycle_noun: "storage-pool",
    entity_type: EntityType::StoragePool,
};

pub const NETWORKS: CompositeKind = CompositeKind {
    plural: "networks",
    prefix: "networks",
    device_ref: "network",
    lifecycle_noun: "network",
    entity_type: EntityType::Network,
};

fn commit_lock(kind: CompositeKind) -> &'static Mutex<()> {
    if kind.plural == POOLS.plural {
        &POOL_LOCK
    } else {
        &NETWORK_LOCK
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeRequest {
    pub name: String,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeRecord {
    pub name: String,
    pub driver: Option<String>,
    pub description: String,
    pub config: serde_json::Value,
}

fn record_key(kind: CompositeKind, name: &str) -> String {
    format!("{}/{}", kind.prefix, name)
}

/// Key the two-phase coordinator tracks this entity under.
fn entity_key(kind: CompositeKind, name: &str) -> String {
    format!("{}/{}", kind.plural, name)
}

fn load(ctx: &ServerContext, kind: CompositeKind, name: &str) -> Result<(CompositeRecord, Vec<u8>), ClusterError> {
    let key = record_key(kind, name);
    let raw = ctx.store.transaction(|txn| Ok(txn.get(&key)))?;
    let raw = raw.ok_or_else(|| ClusterError::not_found(format!("{} {name}", kind.lifecycle_noun)))?;
    let record = serde_json::from_slice(&raw).map_err(|e| ClusterError::internal(e.to_string()))?;
    Ok((record, raw))
}

fn store_record(ctx: &ServerContext, kind: CompositeKind, record: &CompositeRecord) -> Result<(), ClusterError> {
    let encoded = serde_json::to_vec(record).map_err(|e| ClusterError::internal(e.to_string()))?;
    let key = record_key(kind, &record.name);
    ctx.store.transaction(|txn| {
        txn.put(key.clone(), encoded.clone());
        Ok(())
    })?;
    Ok(())
}

async fn list(
    ctx: &ServerContext,
    kind: CompositeKind,
    headers: &HeaderMap,
    params: &RequestParams,
) -> ApiResult<Response> {
    let collection = EntityRef::new(kind.entity_type, vec![]);
    let path = format!("/1.0/{}?recursion={}", kind.plural, params.recursion);
    if let Dispatch::Remote(response) =
        dispatch(ctx, headers, &collection, "list", params, true, "GET", &path, Vec::new()).await?
    {
        return Ok(response);
    }

    let prefix = format!("{}/", kind.prefix);
    let rows = ctx.store.transaction(|txn| Ok(txn.scan_prefix(&prefix)))?;
    let metadata = if params.recursion == 0 {
        json!(rows
            .iter()
            .map(|(k, _)| format!("/1.0/{}/{}", kind.plural, k.trim_start_matches(&prefix)))
            .collect::<Vec<_>>())
    } else {
        let mut records = Vec::new();
        for (k, raw) in &rows {
            let name = k.trim_start_matches(&prefix);
            let record: CompositeRecord =
                serde_json::from_slice(raw).map_err(|e| ApiError(ClusterError::internal(e.to_string())))?;
            records.push(describe(ctx, kind, name, &record)?);
        }
        json!(records)
    };
    Ok(envelope(ApiResponse::sync(metadata)))
}

fn describe(
    ctx: &ServerContext,
    kind: CompositeKind,
    name: &str,
    record: &CompositeRecord,
) -> Result<serde_json::Value, ApiError> {
    let entity = entity_key(kind, name);
    let state = ctx.coordinator.state(&entity)?.unwrap_or(CompositeState::Pending);
    let pending = ctx.coordinator.pending(&entity)?;
    let pending_names: Vec<String> = pending
        .iter()
        .filter_map(|id| ctx.roster.get(*id).ok().map(|m| m.name))
        .collect();
    Ok(json!({
        "name": record.name,
        "url": format!("/1.0/{}/{}", kind.plural, name),
        "driver": record.driver,
        "description": record.description,
        "config": record.config,
        "status": state.to_string(),
        "pending_members": pending_names,
    }))
}

/// `POST` with `?target=` stages node config; without it, commits. A
/// cluster-notification `POST` stores the already-merged record and
/// stops there.
async fn create(
    ctx: &Arc<ServerContext>,
    kind: CompositeKind,
    headers: &HeaderMap,
    params: &RequestParams,
    request: CompositeRequest,
) -> ApiResult<Response> {
    if request.name.is_empty() {
        return Err(ApiError(ClusterError::bad_request(format!(
            "{} name is required",
            kind.lifecycle_noun
        ))));
    }
    let entity_ref = EntityRef::new(kind.entity_type, vec![request.name.clone()]);
    // The target on a composite create names which member the staged
    // config belongs to; the stage itself is one write to the
    // replicated store, so it is not a forwarding directive.
    let route_params = RequestParams {
        target: None,
        ..params.clone()
    };
    let body = serde_json::to_vec(&request).unwrap_or_default();
    let path = format!("/1.0/{}", kind.plural);
    let identity = match dispatch(ctx, headers, &entity_ref, "create", &route_params, false, "POST", &path, body).await? {
        Dispatch::Remote(response) => return Ok(response),
        Dispatch::Local(identity) => identity,
    };

    if identity.notification.is_notification() {
        let record = CompositeRecord {
            name: request.name.clone(),
            driver: request.driver,
            description: request.description,
            config: request.config,
        };
        store_record(ctx, kind, &record)?;
        return Ok(envelope(ApiResponse::created(json!({ "name": record.name }))));
    }

    let entity = entity_key(kind, &request.name);

    if let Some(target) = &params.target {
        let member = ctx.member_by_name(target)?;
        ctx.coordinator.stage(&entity, member.id, request.config)?;
        info!(entity = %entity, member = %member.name, "staged node config");
        return Ok(envelope(ApiResponse::sync(json!({
            "name": request.name,
            "status": CompositeState::Pending.to_string(),
        }))));
    }

    // Untargeted: commit. Hold the per-kind lock for the whole fan-out
    // so concurrent commits of the same kind serialize.
    let _guard = commit_lock(kind).lock().await;

    if ctx.coordinator.state(&entity)?.map(CompositeState::can_retry) == Some(false) {
        return Err(ApiError(ClusterError::conflict(format!(
            "{} {} already exists",
            kind.lifecycle_noun, request.name
        ))));
    }

    let members = ctx.members()?;
    let required: Vec<MemberId> = members.iter().filter(|m| m.is_active()).map(|m| m.id).collect();
    let addresses: BTreeMap<MemberId, String> = members.iter().map(|m| (m.id, m.address.clone())).collect();

    let record = CompositeRecord {
        name: request.name.clone(),
        driver: request.driver.clone(),
        description: request.description.clone(),
        config: request.config.clone(),
    };

    let apply_ctx = Arc::clone(ctx);
    let apply_kind = kind;
    let apply_record = record.clone();

    let forwarder = ctx.forwarder.clone();
    let remote_path = format!("/1.0/{}", kind.plural);
    let remote_name = request.name.clone();
    let remote_driver = request.driver.clone();

    ctx.coordinator
        .commit(
            &entity,
            &required,
            ctx.local_member,
            request.config.clone(),
            move |merged| {
                let mut local = apply_record;
                local.config = merged;
                store_record(&apply_ctx, apply_kind, &local)
            },
            move |member, merged| {
                let forwarder = forwarder.clone();
                let address = addresses.get(&member).cloned().unwrap_or_default();
                let path = remote_path.clone();
                let body = serde_json::to_vec(&CompositeRequest {
                    name: remote_name.clone(),
                    driver: remote_driver.clone(),
                    description: String::new(),
                    config: merged,
                })
                .unwrap_or_default();
                async move { forwarder.notify_peer(&address, &path, body).await }
            },
        )
        .await?;

    let url = format!("/1.0/{}/{}", kind.plural, request.name);
    ctx.emit_lifecycle(None, &format!("{}-created", kind.lifecycle_noun), &url, Some(identity.identity));
    Ok(envelope(ApiResponse::created(describe(ctx, kind, &request.name, &record)?)))
}

async fn get_one(
    ctx: &ServerContext,
    kind: CompositeKind,
    headers: &HeaderMap,
    params: &RequestParams,
    name: &str,
) -> ApiResult<Response> {
    let entity_ref = EntityRef::new(kind.entity_type, vec![name.to_string()]);
    let path = format!("/1.0/{}/{name}", kind.plural);
    if let Dispatch::Remote(response) =
        dispatch(ctx, headers, &entity_ref, "get", params, false, "GET", &path, Vec::new()).await?
    {
        return Ok(response);
    }

    match load(ctx, kind, name) {
        Ok((record, raw)) => {
            let mut response = envelope(ApiResponse::sync(describe(ctx, kind, name, &record)?));
            if let Ok(value) = ContentHash::of(&raw).to_string().parse() {
                response.headers_mut().insert("etag", value);
            }
            Ok(response)
        }
        // Not committed yet: still observable while staged records
        // exist, so clients can see which members are pending.
        Err(err) => {
            let pending = ctx.coordinator.pending(&entity_key(kind, name))?;
            if pending.is_empty() {
                return Err(ApiError(err));
            }
            let pending_names: Vec<String> = pending
                .iter()
                .filter_map(|id| ctx.roster.get(*id).ok().map(|m| m.name))
                .collect();
            Ok(envelope(ApiResponse::sync(json!({
                "name": name,
                "url": format!("/1.0/{}/{name}", kind.plural),
                "status": CompositeState::Pending.to_string(),
                "pending_members": pending_names,
            }))))
        }
    }
}

async fn update(
    ctx: &Arc<ServerContext>,
    kind: CompositeKind,
    headers: &HeaderMap,
    params: &RequestParams,
    name: &str,
    request: CompositeRequest,
) -> ApiResult<Response> {
    let entity_ref = EntityRef::new(kind.entity_type, vec![name.to_string()]);
    let path = format!("/1.0/{}/{name}", kind.plural);
    let body = serde_json::to_vec(&request).unwrap_or_default();
    let identity = match dispatch(ctx, headers, &entity_ref, "update", params, false, "PUT", &path, body).await? {
        Dispatch::Remote(response) => return Ok(response),
        Dispatch::Local(identity) => identity,
    };
    let notification = identity.notification.is_notification();

    let (mut record, raw) = load(ctx, kind, name)?;
    if !notification {
        check_etag(headers, &raw)?;
    }
    record.description = request.description;
    record.config = request.config;
    store_record(ctx, kind, &record)?;

    if !notification {
        let now = Timestamp::now();
        let peers = ctx.peer_views(now)?;
        let body = serde_json::to_vec(&record).map_err(|e| ApiError(ClusterError::internal(e.to_string())))?;
        let path = format!("/1.0/{}/{name}", kind.plural);
        let addresses: BTreeMap<MemberId, String> = ctx.members()?.iter().map(|m| (m.id, m.address.clone())).collect();
        let forwarder = ctx.forwarder.clone();
        clusterd_notify::notify(clusterd_notify::Scope::Peers, &peers, move |member| {
            let forwarder = forwarder.clone();
            let address = addresses.get(&member).cloned().unwrap_or_default();
            let path = path.clone();
            let body = body.clone();
            async move { forwarder.notify_peer(&address, &path, body).await }
        })
        .await
        .map_err(|err| ApiError(ClusterError::internal(err.to_string())))?;
        ctx.emit_lifecycle(
            None,
            &format!("{}-updated", kind.lifecycle_noun),
            &format!("/1.0/{}/{name}", kind.plural),
            Some(identity.identity),
        );
    }
    Ok(envelope(ApiResponse::sync(json!(record))))
}

async fn delete(
    ctx: &Arc<ServerContext>,
    kind: CompositeKind,
    headers: &HeaderMap,
    params: &RequestParams,
    name: &str,
) -> ApiResult<Response> {
    let entity_ref = EntityRef::new(kind.entity_type, vec![name.to_string()]);
    let path = format!("/1.0/{}/{name}", kind.plural);
    let identity = match dispatch(ctx, headers, &entity_ref, "delete", params, false, "DELETE", &path, Vec::new()).await? {
        Dispatch::Remote(response) => return Ok(response),
        Dispatch::Local(identity) => identity,
    };
    let notification = identity.notification.is_notification();

    load(ctx, kind, name)?;
    check_referential_integrity(ctx, kind, name)?;

    let key = record_key(kind, name);
    ctx.store.transaction(|txn| {
        txn.delete(key.clone());
        Ok(())
    })?;

    if !notification {
        ctx.coordinator.forget(&entity_key(kind, name))?;
        let now = Timestamp::now();
        let peers = ctx.peer_views(now)?;
        let addresses: BTreeMap<MemberId, String> = ctx.members()?.iter().map(|m| (m.id, m.address.clone())).collect();
        let forwarder = ctx.forwarder.clone();
        let path = format!("/1.0/{}/{name}", kind.plural);
        clusterd_notify::notify(clusterd_notify::Scope::Peers, &peers, move |member| {
            let forwarder = forwarder.clone();
            let address = addresses.get(&member).cloned().unwrap_or_default();
            let path = path.clone();
            async move {
                forwarder
                    .proxy(&address, "DELETE", &path, "cluster", Vec::new())
                    .await
                    .map(|_| ())
            }
        })
        .await
        .map_err(|err| ApiError(ClusterError::internal(err.to_string())))?;
        ctx.emit_lifecycle(
            None,
            &format!("{}-removed", kind.lifecycle_noun),
            &format!("/1.0/{}/{name}", kind.plural),
            Some(identity.identity),
        );
    }
    Ok(envelope(ApiResponse::sync(serde_json::Value::Null)))
}

/// A composite entity cannot be deleted while anything references it.
/// Re-run on every member a delete notification reaches, so a
/// concurrent instance create on another member cannot slip through.
fn check_referential_integrity(ctx: &ServerContext, kind: CompositeKind, name: &str) -> Result<(), ClusterError> {
    for instance in ctx.instances.list()? {
        if let serde_json::Value::Object(devices) = &instance.devices {
            for device in devices.values() {
                if device.get(kind.device_ref).and_then(|v| v.as_str()) == Some(name) {
                    return Err(ClusterError::bad_request(format!(
                        "{} {name} is in use by instance {}",
                        kind.lifecycle_noun, instance.name
                    )));
                }
            }
        }
    }
    Ok(())
}

// Thin per-kind axum handlers.

pub async fn list_pools(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    list(&ctx, POOLS, &headers, &params).await
}

pub async fn create_pool(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
    Json(request): Json<CompositeRequest>,
) -> ApiResult<Response> {
    create(&ctx, POOLS, &headers, &params, request).await
}

pub async fn get_pool(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    get_one(&ctx, POOLS, &headers, &params, &name).await
}

pub async fn update_pool(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
    Json(request): Json<CompositeRequest>,
) -> ApiResult<Response> {
    update(&ctx, POOLS, &headers, &params, &name, request).await
}

pub async fn delete_pool(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    delete(&ctx, POOLS, &headers, &params, &name).await
}

pub async fn list_networks(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    list(&ctx, NETWORKS, &headers, &params).await
}

pub async fn create_network(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
    Json(request): Json<CompositeRequest>,
) -> ApiResult<Response> {
    create(&ctx, NETWORKS, &headers, &params, request).await
}

pub async fn get_network(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    get_one(&ctx, NETWORKS, &headers, &params, &name).await
}

pub async fn update_network(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
    Json(request): Json<CompositeRequest>,
) -> ApiResult<Response> {
    update(&ctx, NETWORKS, &headers, &params, &name, request).await
}

pub async fn delete_network(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    delete(&ctx, NETWORKS, &headers, &params, &name).await
}
