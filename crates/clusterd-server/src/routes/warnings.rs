//! Warning endpoints.

use crate::dispatch::{dispatch, Dispatch};
use crate::error::{envelope, ApiError, ApiResult};
use crate::state::ServerContext;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use clusterd_evac::{WarningRecord, WarningStatus};
use clusterd_types::{ClusterError, EntityRef, EntityType};
use clusterd_wire::{ApiResponse, RequestParams};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

fn warning_json(warning: &WarningRecord) -> serde_json::Value {
    json!({
        "uuid": warning.uuid.to_string(),
        "url": warning.url(),
        "entity_url": warning.entity_url,
        "message": warning.message,
        "status": match warning.status {
            WarningStatus::New => "new",
            WarningStatus::Resolved => "resolved",
        },
        "created_at": warning.created_at.to_string(),
        "updated_at": warning.updated_at.to_string(),
    })
}

fn warning_ref(raw: &str) -> EntityRef {
    EntityRef::new(EntityType::Warning, vec![raw.to_string()])
}

fn parse_uuid(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError(ClusterError::not_found(format!("warning {raw}"))))
}

pub async fn list(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let collection = EntityRef::new(EntityType::Warning, vec![]);
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &collection, "list", &params, true, "GET", "/1.0/warnings", Vec::new()).await?
    {
        return Ok(response);
    }

    let warnings = ctx.warnings.list()?;
    Ok(envelope(ApiResponse::sync(json!(warnings
        .iter()
        .map(warning_json)
        .collect::<Vec<_>>()))))
}

pub async fn get_one(
    State(ctx): State<Arc<ServerContext>>,
    Path(raw): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let path = format!("/1.0/warnings/{raw}");
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &warning_ref(&raw), "get", &params, false, "GET", &path, Vec::new()).await?
    {
        return Ok(response);
    }

    let warning = ctx.warnings.get(parse_uuid(&raw)?)?;
    Ok(envelope(ApiResponse::sync(warning_json(&warning))))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WarningUpdate {
    pub status: String,
}

pub async fn update(
    State(ctx): State<Arc<ServerContext>>,
    Path(raw): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
    Json(request): Json<WarningUpdate>,
) -> ApiResult<Response> {
    let path = format!("/1.0/warnings/{raw}");
    let body = serde_json::to_vec(&request).unwrap_or_default();
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &warning_ref(&raw), "update", &params, false, "PUT", &path, body).await?
    {
        return Ok(response);
    }

    let id = parse_uuid(&raw)?;
    match request.status.as_str() {
        "resolved" => {
            ctx.warnings.resolve(id)?;
            let warning = ctx.warnings.get(id)?;
            Ok(envelope(ApiResponse::sync(warning_json(&warning))))
        }
        other => Err(ApiError(ClusterError::bad_request(format!(
            "warnings can only be moved to \"resolved\", not {other:?}"
        )))),
    }
}
