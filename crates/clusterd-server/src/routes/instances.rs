//! Instance endpoints.
//!
//! Creation is where the placement engine earns its keep: an untargeted
//! `POST /1.0/instances` is scored (or scripted) onto a member, and a
//! rejection from the scriptlet aborts the request before any record or
//! lifecycle event exists. Reads and deletes of an existing instance
//! route to its owning member.

use crate::dispatch::{dispatch, Dispatch};
use crate::error::{envelope, ApiError, ApiResult};
use crate::state::ServerContext;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use clusterd_evac::{Instance, InstanceStatus};
use clusterd_placement::{dict, PlacementReason, PlacementRequest, StaticHost, TargetOrNone, Value};
use clusterd_types::{ClusterError, EntityRef, EntityType, Timestamp};
use clusterd_wire::{ApiResponse, RequestParams};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

fn instance_json(instance: &Instance) -> serde_json::Value {
    let location = instance.member;
    json!({
        "name": instance.name,
        "url": instance.url(),
        "project": instance.project,
        "location": location.as_u64(),
        "architecture": instance.architecture,
        "config": instance.config,
        "devices": instance.devices,
        "status": match instance.status {
            InstanceStatus::Running => "running",
            InstanceStatus::Stopped => "stopped",
        },
    })
}

pub async fn list(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let project = params.effective_project().to_string();
    let collection = EntityRef::new(EntityType::Instance, vec![]).with_project(project.clone());
    let path = format!("/1.0/instances?project={project}&recursion={}", params.recursion);
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &collection, "list", &params, true, "GET", &path, Vec::new()).await?
    {
        return Ok(response);
    }

    let instances = ctx.instances.list_in_project(&project)?;
    let metadata = if params.recursion == 0 {
        json!(instances.iter().map(Instance::url).collect::<Vec<_>>())
    } else {
        json!(instances.iter().map(instance_json).collect::<Vec<_>>())
    };
    Ok(envelope(ApiResponse::sync(metadata)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateInstance {
    pub name: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub devices: serde_json::Value,
}

/// `POST /1.0/instances[?target=member|@group]`.
pub async fn create(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
    Json(request): Json<CreateInstance>,
) -> ApiResult<Response> {
    let project = params.effective_project().to_string();

    // The target parameter is placement input here, not a forwarding
    // directive: the scheduler-mode filter decides what it means.
    let entity = EntityRef::new(EntityType::Instance, vec![request.name.clone()]).with_project(project.clone());
    let route_params = RequestParams {
        target: None,
        ..params.clone()
    };
    let body = serde_json::to_vec(&request).unwrap_or_default();
    let path = format!("/1.0/instances?project={project}");
    let identity = match dispatch(&ctx, &headers, &entity, "create", &route_params, false, "POST", &path, body).await? {
        Dispatch::Remote(response) => return Ok(response),
        Dispatch::Local(identity) => identity,
    };

    if request.name.is_empty() {
        return Err(ApiError(ClusterError::bad_request("instance name is required")));
    }
    if ctx.instances.get(&project, &request.name).is_ok() {
        return Err(ApiError(ClusterError::conflict(format!(
            "instance {} already exists",
            request.name
        ))));
    }

    let target = match params.target.as_deref() {
        None => TargetOrNone::None,
        Some(group) if group.starts_with('@') => TargetOrNone::Group(group.trim_start_matches('@').to_string()),
        Some(member) => TargetOrNone::Member(member.to_string()),
    };

    let placement_request = PlacementRequest {
        project: project.clone(),
        name: request.name.clone(),
        reason: PlacementReason::New,
        architecture: request.architecture.clone(),
        config: request.config.clone(),
        devices: request.devices.clone(),
        target,
    };

    let now = Timestamp::now();
    let candidates = ctx.placement_candidates(now)?;

    // Scriptlet execution is synchronous and bounded by its own
    // wall-clock limit; run it off the request task.
    let chosen = {
        let ctx = Arc::clone(&ctx);
        let candidates = candidates.clone();
        tokio::task::spawn_blocking(move || {
            let mut host = placement_host(&ctx, &candidates);
            ctx.engine.place(&placement_request, &candidates, &mut host)
        })
        .await
        .map_err(|e| ApiError(ClusterError::internal(format!("placement worker failed: {e}"))))??
    };

    let member = ctx.member_by_name(&chosen)?;
    let mut instance = Instance::new(project.clone(), request.name.clone(), member.id);
    instance.architecture = request.architecture;
    instance.config = request.config;
    instance.devices = request.devices;
    ctx.instances.insert(&instance)?;
    info!(instance = %instance.name, member = %member.name, "instance placed");

    ctx.emit_lifecycle(Some(project), "instance-created", &instance.url(), Some(identity.identity));
    Ok(envelope(ApiResponse::created(instance_json(&instance))))
}

/// Snapshot of roster state handed to the placement scriptlet: enough
/// to make a decision, nothing it could mutate.
fn placement_host(ctx: &ServerContext, candidates: &[clusterd_placement::Candidate]) -> StaticHost {
    let mut host = StaticHost::new(Value::None);
    for candidate in candidates {
        host.member_states.insert(
            candidate.name.clone(),
            dict([
                ("instance_count", Value::Int(candidate.instance_count as i64)),
                ("failure_domain", Value::Str(candidate.failure_domain.to_string())),
                (
                    "groups",
                    Value::List(candidate.groups.iter().map(|g| Value::Str(g.to_string())).collect()),
                ),
            ]),
        );
        if let Ok(member) = ctx.member_by_id(candidate.id) {
            host.member_resources.insert(
                candidate.name.clone(),
                dict([("architecture", Value::Str(member.architecture.clone()))]),
            );
        }
    }
    host
}

pub async fn get_one(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let project = params.effective_project().to_string();
    let entity = EntityRef::new(EntityType::Instance, vec![name.clone()]).with_project(project.clone());
    let path = format!("/1.0/instances/{name}?project={project}");
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &entity, "get", &params, false, "GET", &path, Vec::new()).await?
    {
        return Ok(response);
    }

    let instance = ctx.instances.get(&project, &name)?;
    Ok(envelope(ApiResponse::sync(instance_json(&instance))))
}

pub async fn delete(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let project = params.effective_project().to_string();
    let entity = EntityRef::new(EntityType::Instance, vec![name.clone()]).with_project(project.clone());
    let path = format!("/1.0/instances/{name}?project={project}");
    let identity = match dispatch(&ctx, &headers, &entity, "delete", &params, false, "DELETE", &path, Vec::new()).await? {
        Dispatch::Remote(response) => return Ok(response),
        Dispatch::Local(identity) => identity,
    };

    let instance = ctx.instances.get(&project, &name)?;
    ctx.runtime.stop(&instance).map_err(ApiError)?;
    ctx.instances.remove(&project, &name)?;
    ctx.emit_lifecycle(Some(project), "instance-removed", &instance.url(), Some(identity.identity));
    Ok(envelope(ApiResponse::sync(serde_json::Value::Null)))
}
