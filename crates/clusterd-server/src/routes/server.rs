//! `GET /1.0` — server and environment information.

use crate::dispatch::{dispatch, Dispatch};
use crate::error::{envelope, ApiResult};
use crate::state::ServerContext;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use clusterd_types::{EntityRef, EntityType};
use clusterd_wire::{ApiResponse, RequestParams};
use serde_json::json;
use std::sync::Arc;

pub async fn info(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let entity = EntityRef::new(EntityType::Server, vec![]);
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &entity, "get", &params, false, "GET", "/1.0", Vec::new()).await?
    {
        return Ok(response);
    }

    let members = ctx.members()?;
    let metadata = json!({
        "api_status": "stable",
        "api_version": "1.0",
        "auth": "trusted",
        "environment": {
            "server": "clusterd",
            "server_name": ctx.local_name,
            "server_clustered": members.len() > 1,
            "server_version": env!("CARGO_PKG_VERSION"),
        },
        "config": {
            "cluster.max_voters": ctx.config.cluster.max_voters,
            "cluster.max_standby": ctx.config.cluster.max_standby,
            "cluster.offline_threshold": ctx.config.cluster.offline_threshold_secs,
        },
    });
    Ok(envelope(ApiResponse::sync(metadata)))
}
