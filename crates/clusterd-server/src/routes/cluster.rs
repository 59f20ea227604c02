//! Cluster member and cluster group endpoints.

use crate::dispatch::{dispatch, Dispatch};
use crate::error::{envelope, ApiError, ApiResult};
use crate::state::ServerContext;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use clusterd_store::StoreExt;
use clusterd_types::{
    ClusterError, ClusterGroupName, EntityRef, EntityType, Member, MemberId, OperationClass, Timestamp,
};
use clusterd_wire::{ApiResponse, RequestParams};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

fn member_json(ctx: &ServerContext, member: &Member, now: Timestamp) -> serde_json::Value {
    let threshold = ctx.config.cluster.offline_threshold_secs;
    let status = if member.state == clusterd_types::MemberState::Evacuated {
        "evacuated"
    } else if member.reachable(now, threshold) {
        "online"
    } else {
        "offline"
    };
    json!({
        "name": member.name,
        "url": format!("/1.0/cluster/members/{}", member.name),
        "address": member.address,
        "architecture": member.architecture,
        "failure_domain": member.failure_domain.to_string(),
        "roles": member.roles.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "groups": member.groups.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "state": member.state.to_string(),
        "status": status,
    })
}

fn member_ref(name: &str) -> EntityRef {
    EntityRef::new(EntityType::ClusterMember, vec![name.to_string()])
}

fn group_ref(name: &str) -> EntityRef {
    EntityRef::new(EntityType::ClusterGroup, vec![name.to_string()])
}

pub async fn list_members(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let collection = EntityRef::new(EntityType::ClusterMember, vec![]);
    let path = format!("/1.0/cluster/members?recursion={}", params.recursion);
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &collection, "list", &params, true, "GET", &path, Vec::new()).await?
    {
        return Ok(response);
    }

    let now = Timestamp::now();
    let members = ctx.members()?;
    let metadata = if params.recursion == 0 {
        json!(members
            .iter()
            .map(|m| format!("/1.0/cluster/members/{}", m.name))
            .collect::<Vec<_>>())
    } else {
        json!(members.iter().map(|m| member_json(&ctx, m, now)).collect::<Vec<_>>())
    };
    Ok(envelope(ApiResponse::sync(metadata)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRequest {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub failure_domain: String,
}

pub async fn join(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
    Json(request): Json<JoinRequest>,
) -> ApiResult<Response> {
    let body = serde_json::to_vec(&request).unwrap_or_default();
    let identity = match dispatch(
        &ctx,
        &headers,
        &member_ref(&request.name),
        "create",
        &params,
        false,
        "POST",
        "/1.0/cluster/members",
        body,
    )
    .await?
    {
        Dispatch::Remote(response) => return Ok(response),
        Dispatch::Local(identity) => identity,
    };

    if request.name.is_empty() || request.address.is_empty() {
        return Err(ApiError(ClusterError::bad_request("member name and address are required")));
    }
    let members = ctx.members()?;
    if members.iter().any(|m| m.name == request.name) {
        return Err(ApiError(ClusterError::conflict(format!(
            "cluster member {} already exists",
            request.name
        ))));
    }
    let id = MemberId::new(members.iter().map(|m| m.id.as_u64()).max().unwrap_or(0) + 1);
    let mut member = Member::new(id, request.name.clone(), request.address);
    member.architecture = request.architecture;
    member.failure_domain = clusterd_types::FailureDomain::new(request.failure_domain);
    member.state = clusterd_types::MemberState::Created;
    member.last_heartbeat = Timestamp::now();
    ctx.roster.insert(&member)?;
    info!(member = %member.name, id = %id, "cluster member joined");

    let url = format!("/1.0/cluster/members/{}", member.name);
    ctx.emit_lifecycle(None, "cluster-member-created", &url, Some(identity.identity));
    Ok(envelope(ApiResponse::created(member_json(&ctx, &member, Timestamp::now()))))
}

pub async fn get_member(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let path = format!("/1.0/cluster/members/{name}");
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &member_ref(&name), "get", &params, false, "GET", &path, Vec::new()).await?
    {
        return Ok(response);
    }

    let member = ctx.member_by_name(&name)?;
    Ok(envelope(ApiResponse::sync(member_json(&ctx, &member, Timestamp::now()))))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MemberStateRequest {
    pub action: String,
}

/// `POST /1.0/cluster/members/{name}/state` with action `evacuate` or
/// `restore`. Both run as background operations so the client gets an
/// operation UUID to wait on.
pub async fn member_state(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
    Json(request): Json<MemberStateRequest>,
) -> ApiResult<Response> {
    let body = serde_json::to_vec(&request).unwrap_or_default();
    let path = format!("/1.0/cluster/members/{name}/state");
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &member_ref(&name), "update", &params, false, "POST", &path, body).await?
    {
        return Ok(response);
    }

    let member = ctx.member_by_name(&name)?;
    let url = format!("/1.0/cluster/members/{name}");

    match request.action.as_str() {
        "evacuate" => {
            let run_ctx = Arc::clone(&ctx);
            let id = ctx.tracker.create(
                OperationClass::Task,
                None,
                format!("Evacuating cluster member {name}"),
                vec![url.clone()],
                move || async move {
                    let report = run_ctx
                        .evacuator()
                        .evacuate(member.id, &run_ctx.engine, Timestamp::now())?;
                    info!(moved = report.moved.len(), stranded = report.stranded.len(), "evacuation finished");
                    run_ctx.emit_lifecycle(None, "cluster-member-evacuated", &format!("/1.0/cluster/members/{}", member.name), None);
                    Ok(())
                },
                None::<fn() -> std::future::Ready<Result<(), ClusterError>>>,
            )?;
            ctx.tracker.run(id)?;
            ctx.emit_operation(id, clusterd_types::OperationState::Running);
            Ok(envelope(ApiResponse::accepted(id)))
        }
        "restore" => {
            let run_ctx = Arc::clone(&ctx);
            let id = ctx.tracker.create(
                OperationClass::Task,
                None,
                format!("Restoring cluster member {name}"),
                vec![url.clone()],
                move || async move {
                    let resolved = run_ctx.evacuator().restore(member.id)?;
                    info!(resolved, "restore finished");
                    run_ctx.emit_lifecycle(None, "cluster-member-restored", &format!("/1.0/cluster/members/{}", member.name), None);
                    Ok(())
                },
                None::<fn() -> std::future::Ready<Result<(), ClusterError>>>,
            )?;
            ctx.tracker.run(id)?;
            ctx.emit_operation(id, clusterd_types::OperationState::Running);
            Ok(envelope(ApiResponse::accepted(id)))
        }
        other => Err(ApiError(ClusterError::bad_request(format!(
            "unknown member state action {other:?}"
        )))),
    }
}

pub async fn delete_member(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let path = format!("/1.0/cluster/members/{name}");
    let identity = match dispatch(&ctx, &headers, &member_ref(&name), "delete", &params, false, "DELETE", &path, Vec::new()).await? {
        Dispatch::Remote(response) => return Ok(response),
        Dispatch::Local(identity) => identity,
    };

    let member = ctx.member_by_name(&name)?;
    ctx.evacuator().delete(member.id, Timestamp::now())?;
    ctx.emit_lifecycle(
        None,
        "cluster-member-removed",
        &format!("/1.0/cluster/members/{name}"),
        Some(identity.identity),
    );
    Ok(envelope(ApiResponse::sync(serde_json::Value::Null)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: Vec<String>,
}

fn group_key(name: &str) -> String {
    format!("cluster-groups/{name}")
}

pub async fn list_groups(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let collection = EntityRef::new(EntityType::ClusterGroup, vec![]);
    if let Dispatch::Remote(response) = dispatch(
        &ctx,
        &headers,
        &collection,
        "list",
        &params,
        true,
        "GET",
        "/1.0/cluster/groups",
        Vec::new(),
    )
    .await?
    {
        return Ok(response);
    }

    let rows = ctx.store.transaction(|txn| Ok(txn.scan_prefix("cluster-groups/")))?;
    let mut groups = vec!["/1.0/cluster/groups/default".to_string()];
    for (key, _) in rows {
        let name = key.trim_start_matches("cluster-groups/");
        groups.push(format!("/1.0/cluster/groups/{name}"));
    }
    Ok(envelope(ApiResponse::sync(json!(groups))))
}

pub async fn create_group(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
    Json(request): Json<GroupRequest>,
) -> ApiResult<Response> {
    let body = serde_json::to_vec(&request).unwrap_or_default();
    let identity = match dispatch(
        &ctx,
        &headers,
        &group_ref(&request.name),
        "create",
        &params,
        false,
        "POST",
        "/1.0/cluster/groups",
        body,
    )
    .await?
    {
        Dispatch::Remote(response) => return Ok(response),
        Dispatch::Local(identity) => identity,
    };

    if request.name.is_empty() {
        return Err(ApiError(ClusterError::bad_request("group name is required")));
    }
    let key = group_key(&request.name);
    let exists = ctx.store.transaction(|txn| Ok(txn.get(&key).is_some()))?;
    if exists || request.name == ClusterGroupName::DEFAULT {
        return Err(ApiError(ClusterError::conflict(format!(
            "cluster group {} already exists",
            request.name
        ))));
    }

    let group = ClusterGroupName::new(request.name.clone());
    for member_name in &request.members {
        let mut member = ctx.member_by_name(member_name)?;
        member.groups.insert(group.clone());
        ctx.roster.update(&member)?;
    }

    let encoded = serde_json::to_vec(&request).map_err(|e| ApiError(ClusterError::internal(e.to_string())))?;
    ctx.store.transaction(|txn| {
        txn.put(key.clone(), encoded.clone());
        Ok(())
    })?;
    ctx.emit_lifecycle(
        None,
        "cluster-group-created",
        &format!("/1.0/cluster/groups/{}", request.name),
        Some(identity.identity),
    );
    Ok(envelope(ApiResponse::created(json!({
        "name": request.name,
        "members": request.members,
    }))))
}

pub async fn get_group(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let path = format!("/1.0/cluster/groups/{name}");
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &group_ref(&name), "get", &params, false, "GET", &path, Vec::new()).await?
    {
        return Ok(response);
    }

    if name == ClusterGroupName::DEFAULT {
        let members: Vec<String> = ctx.members()?.into_iter().map(|m| m.name).collect();
        return Ok(envelope(ApiResponse::sync(json!({ "name": name, "members": members }))));
    }
    let raw = ctx.store.transaction(|txn| Ok(txn.get(&group_key(&name))))?;
    let raw = raw.ok_or_else(|| ApiError(ClusterError::not_found(format!("cluster group {name}"))))?;
    let group: GroupRequest = serde_json::from_slice(&raw).map_err(|e| ApiError(ClusterError::internal(e.to_string())))?;
    Ok(envelope(ApiResponse::sync(json!({
        "name": group.name,
        "description": group.description,
        "members": group.members,
    }))))
}

pub async fn delete_group(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let path = format!("/1.0/cluster/groups/{name}");
    let identity = match dispatch(&ctx, &headers, &group_ref(&name), "delete", &params, false, "DELETE", &path, Vec::new()).await? {
        Dispatch::Remote(response) => return Ok(response),
        Dispatch::Local(identity) => identity,
    };

    if name == ClusterGroupName::DEFAULT {
        return Err(ApiError(ClusterError::bad_request("the default group cannot be deleted")));
    }
    let key = group_key(&name);
    let exists = ctx.store.transaction(|txn| Ok(txn.get(&key).is_some()))?;
    if !exists {
        return Err(ApiError(ClusterError::not_found(format!("cluster group {name}"))));
    }

    let group = ClusterGroupName::new(name.clone());
    for mut member in ctx.members()? {
        if member.groups.remove(&group) {
            ctx.roster.update(&member)?;
        }
    }
    ctx.store.transaction(|txn| {
        txn.delete(key.clone());
        Ok(())
    })?;
    ctx.emit_lifecycle(
        None,
        "cluster-group-removed",
        &format!("/1.0/cluster/groups/{name}"),
        Some(identity.identity),
    );
    Ok(envelope(ApiResponse::sync(serde_json::Value::Null)))
}
