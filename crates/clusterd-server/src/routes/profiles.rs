//! Profile endpoints.
//!
//! Profiles are project-scoped with a feature fallback: a project
//! created without the `profiles` feature resolves its profiles
//! against `default` instead.

use crate::dispatch::{dispatch, Dispatch};
use crate::error::{envelope, ApiError, ApiResult};
use crate::routes::projects;
use crate::state::ServerContext;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use clusterd_crypto::ContentHash;
use clusterd_store::StoreExt;
use clusterd_types::{ClusterError, EntityRef, EntityType};
use clusterd_wire::{ApiResponse, RequestParams};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub devices: serde_json::Value,
}

fn key(project: &str, name: &str) -> String {
    format!("profiles/{project}/{name}")
}

fn profile_ref(project: &str, name: &str) -> EntityRef {
    EntityRef::new(EntityType::Profile, vec![name.to_string()]).with_project(project)
}

/// The project whose profile table this request actually reads.
fn effective_project(ctx: &ServerContext, params: &RequestParams) -> String {
    let requested = params.effective_project();
    match projects::load(ctx, requested) {
        Ok(project) if project.features.profiles => requested.to_string(),
        _ => "default".to_string(),
    }
}

fn load(ctx: &ServerContext, project: &str, name: &str) -> Result<(Profile, Vec<u8>), ClusterError> {
    let raw = ctx.store.transaction(|txn| Ok(txn.get(&key(project, name))))?;
    let raw = raw.ok_or_else(|| ClusterError::not_found(format!("profile {name}")))?;
    let profile = serde_json::from_slice(&raw).map_err(|e| ClusterError::internal(e.to_string()))?;
    Ok((profile, raw))
}

fn store_profile(ctx: &ServerContext, project: &str, profile: &Profile) -> Result<(), ClusterError> {
    let encoded = serde_json::to_vec(profile).map_err(|e| ClusterError::internal(e.to_string()))?;
    let k = key(project, &profile.name);
    ctx.store.transaction(|txn| {
        txn.put(k.clone(), encoded.clone());
        Ok(())
    })?;
    Ok(())
}

pub async fn list(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let project = effective_project(&ctx, &params);
    let collection = EntityRef::new(EntityType::Profile, vec![]).with_project(project.clone());
    let path = format!("/1.0/profiles?project={project}&recursion={}", params.recursion);
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &collection, "list", &params, true, "GET", &path, Vec::new()).await?
    {
        return Ok(response);
    }

    let prefix = format!("profiles/{project}/");
    let rows = ctx.store.transaction(|txn| Ok(txn.scan_prefix(&prefix)))?;
    let metadata = if params.recursion == 0 {
        json!(rows
            .iter()
            .map(|(k, _)| format!("/1.0/profiles/{}", k.trim_start_matches(&prefix)))
            .collect::<Vec<_>>())
    } else {
        let profiles: Result<Vec<Profile>, _> = rows.iter().map(|(_, raw)| serde_json::from_slice(raw)).collect();
        json!(profiles.map_err(|e| ApiError(ClusterError::internal(e.to_string())))?)
    };
    Ok(envelope(ApiResponse::sync(metadata)))
}

pub async fn create(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
    Json(profile): Json<Profile>,
) -> ApiResult<Response> {
    let project = effective_project(&ctx, &params);
    let entity = profile_ref(&project, &profile.name);
    let body = serde_json::to_vec(&profile).unwrap_or_default();
    let path = format!("/1.0/profiles?project={project}");
    let identity = match dispatch(&ctx, &headers, &entity, "create", &params, false, "POST", &path, body).await? {
        Dispatch::Remote(response) => return Ok(response),
        Dispatch::Local(identity) => identity,
    };

    if profile.name.is_empty() {
        return Err(ApiError(ClusterError::bad_request("profile name is required")));
    }
    if load(&ctx, &project, &profile.name).is_ok() {
        return Err(ApiError(ClusterError::conflict(format!("profile {} already exists", profile.name))));
    }
    store_profile(&ctx, &project, &profile)?;
    let url = format!("/1.0/profiles/{}", profile.name);
    ctx.emit_lifecycle(Some(project), "profile-created", &url, Some(identity.identity));
    Ok(envelope(ApiResponse::created(json!(profile))))
}

pub async fn get_one(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let project = effective_project(&ctx, &params);
    let path = format!("/1.0/profiles/{name}?project={project}");
    if let Dispatch::Remote(response) = dispatch(
        &ctx,
        &headers,
        &profile_ref(&project, &name),
        "get",
        &params,
        false,
        "GET",
        &path,
        Vec::new(),
    )
    .await?
    {
        return Ok(response);
    }

    let (profile, raw) = load(&ctx, &project, &name)?;
    let mut response = envelope(ApiResponse::sync(json!(profile)));
    if let Ok(value) = ContentHash::of(&raw).to_string().parse() {
        response.headers_mut().insert("etag", value);
    }
    Ok(response)
}

/// `PUT` replaces the profile; the client must present the ETag it
/// read, and a mismatch means someone else got there first.
pub async fn update(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
    Json(mut profile): Json<Profile>,
) -> ApiResult<Response> {
    let project = effective_project(&ctx, &params);
    let body = serde_json::to_vec(&profile).unwrap_or_default();
    let path = format!("/1.0/profiles/{name}?project={project}");
    let identity = match dispatch(
        &ctx,
        &headers,
        &profile_ref(&project, &name),
        "update",
        &params,
        false,
        "PUT",
        &path,
        body,
    )
    .await?
    {
        Dispatch::Remote(response) => return Ok(response),
        Dispatch::Local(identity) => identity,
    };

    let (_, raw) = load(&ctx, &project, &name)?;
    check_etag(&headers, &raw)?;
    profile.name = name.clone();
    store_profile(&ctx, &project, &profile)?;
    ctx.emit_lifecycle(
        Some(project),
        "profile-updated",
        &format!("/1.0/profiles/{name}"),
        Some(identity.identity),
    );
    Ok(envelope(ApiResponse::sync(json!(profile))))
}

pub async fn delete(
    State(ctx): State<Arc<ServerContext>>,
    Path(name): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let project = effective_project(&ctx, &params);
    let path = format!("/1.0/profiles/{name}?project={project}");
    let identity = match dispatch(
        &ctx,
        &headers,
        &profile_ref(&project, &name),
        "delete",
        &params,
        false,
        "DELETE",
        &path,
        Vec::new(),
    )
    .await?
    {
        Dispatch::Remote(response) => return Ok(response),
        Dispatch::Local(identity) => identity,
    };

    load(&ctx, &project, &name)?;
    let k = key(&project, &name);
    ctx.store.transaction(|txn| {
        txn.delete(k.clone());
        Ok(())
    })?;
    ctx.emit_lifecycle(
        Some(project),
        "profile-removed",
        &format!("/1.0/profiles/{name}"),
        Some(identity.identity),
    );
    Ok(envelope(ApiResponse::sync(serde_json::Value::Null)))
}

/// Enforces the `If-Match` precondition against the stored body.
pub fn check_etag(headers: &HeaderMap, stored: &[u8]) -> Result<(), ClusterError> {
    let Some(presented) = headers.get("if-match").and_then(|v| v.to_str().ok()) else {
        return Err(ClusterError::precondition_failed("If-Match header is required"));
    };
    let current = ContentHash::of(stored).to_string();
    if presented.trim_matches('"') != current {
        return Err(ClusterError::precondition_failed("ETag mismatch"));
    }
    Ok(())
}
