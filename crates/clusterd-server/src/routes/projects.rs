//! Project endpoints.

use crate::dispatch::{dispatch, Dispatch};
use crate::error::{envelope, ApiError, ApiResult};
use crate::state::ServerContext;
use clusterd_store::StoreExt;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use clusterd_types::{ClusterError, EntityRef, EntityType, Project, ProjectFeatures};
use clusterd_wire::{ApiResponse, RequestParams};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

fn key(name: &str) -> String {
    format!("projects/{name}")
}

fn project_ref(name: &str) -> EntityRef {
    EntityRef::new(EntityType::Project, vec![name.to_string()])
}

/// Loads a project record; the `default` project always exists.
pub fn load(ctx: &ServerContext, name: &str) -> Result<Project, ClusterError> {
    if name == Project::DEFAULT {
        return Ok(Project::default_project());
    }
    let raw = ctx.store.transaction(|txn| Ok(txn.get(&key(name))))?;
    let raw = raw.ok_or_else(|| ClusterError::not_found(format!("project {name}")))?;
    serde_json::from_slice(&raw).map_err(|e| ClusterError::internal(e.to_string()))
}

pub async fn list(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let collection = EntityRef::new(EntityType::Project, vec![]);
    let path = format!("/1.0/projects?recursion={}", params.recursion);
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &collection, "list", &params, true, "GET", &path, Vec::new()).await?
    {
        return Ok(response);
    }

    let rows = ctx.store.transaction(|txn| Ok(txn.scan_prefix("projects/")))?;
    let mut projects = vec![Project::default_project()];
    for (_, raw) in rows {
        projects.push(serde_json::from_slice(&raw).map_err(|e| ApiError(ClusterError::internal(e.to_string())))?);
    }
    let metadata = if params.recursion == 0 {
        json!(projects.iter().map(|p| format!("/1.0/projects/{}", p.name)).collect::<Vec<_>>())
    } else {
        json!(projects)
    };
    Ok(envelope(ApiResponse::sync(metadata)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectRequest {
    pub name: String,
    #[serde(default)]
    pub features: Option<ProjectFeatures>,
}

pub async fn create(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
    Json(request): Json<ProjectRequest>,
) -> ApiResult<Response> {
    let body = serde_json::to_vec(&request).unwrap_or_default();
    let identity = match dispatch(
        &ctx,
        &headers,
        &project_ref(&request.name),
        "create",
        &params,
        false,
        "POST",
        "/1.0/projects",
        body,
    )
    .await?
    {
        Dispatch::Remote(response) => return Ok(response),
        Dispatch::Local(identity) => identity,
    };

    if request.name.is_empty() {
        return Err(ApiError(ClusterError::bad_request("project name is required")));
    }
    if load(&ctx, &request.name).is_ok() {
        return Err(ApiError(ClusterError::conflict(format!("project {} already exists", request.name))));
    }
    let mut project = Project::new(request.name.clone());
    if let Some(features) = request.features {
        project.features = features;
    }
    let encoded = serde_json::to_vec(&project).map_err(|e| ApiError(ClusterError::internal(e.to_string())))?;
    let k = key(&project.name);
    ctx.store.transaction(|txn| {
        txn.put(k.clone(), encoded.clone());
        Ok(())
    })?;
    let url = format!("/1.0/projects/{}", project.name);
    ctx.emit_lifecycle(Some(project.name.clone()), "project-created", &url, Some(identity.identity));
    Ok(envelope(ApiResponse::created(json!(project))))
}

pub async fn get_one(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let path = format!("/1.0/projects/{name}");
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &project_ref(&name), "get", &params, false, "GET", &path, Vec::new()).await?
    {
        return Ok(response);
    }

    let project = load(&ctx, &name)?;
    Ok(envelope(ApiResponse::sync(json!(project))))
}

pub async fn delete(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let path = format!("/1.0/projects/{name}");
    let identity = match dispatch(&ctx, &headers, &project_ref(&name), "delete", &params, false, "DELETE", &path, Vec::new())
        .await?
    {
        Dispatch::Remote(response) => return Ok(response),
        Dispatch::Local(identity) => identity,
    };

    if name == Project::DEFAULT {
        return Err(ApiError(ClusterError::bad_request("the default project cannot be deleted")));
    }
    load(&ctx, &name)?;
    let hosted = ctx.instances.list_in_project(&name)?;
    if !hosted.is_empty() {
        return Err(ApiError(ClusterError::bad_request(format!(
            "project {name} still contains {} instances",
            hosted.len()
        ))));
    }
    let k = key(&name);
    ctx.store.transaction(|txn| {
        txn.delete(k.clone());
        Ok(())
    })?;
    ctx.emit_lifecycle(
        Some(name.clone()),
        "project-removed",
        &format!("/1.0/projects/{name}"),
        Some(identity.identity),
    );
    Ok(envelope(ApiResponse::sync(serde_json::Value::Null)))
}
