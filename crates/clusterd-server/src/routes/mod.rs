//! Route table for the `/1.0` REST surface.

pub mod cluster;
pub mod composite;
pub mod events;
pub mod heartbeat;
pub mod instances;
pub mod operations;
pub mod profiles;
pub mod projects;
pub mod server;
pub mod warnings;

use crate::error::ApiError;
use crate::state::ServerContext;
use axum::routing::{get, post};
use axum::Router;
use clusterd_types::ClusterError;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn router(ctx: Arc<ServerContext>) -> Router {
    Router::new()
        .route("/1.0", get(server::info))
        .route("/1.0/events", get(events::subscribe))
        .route("/1.0/cluster/members", get(cluster::list_members).post(cluster::join))
        .route(
            "/1.0/cluster/members/{name}",
            get(cluster::get_member).delete(cluster::delete_member),
        )
        .route("/1.0/cluster/members/{name}/state", post(cluster::member_state))
        .route("/1.0/cluster/groups", get(cluster::list_groups).post(cluster::create_group))
        .route(
            "/1.0/cluster/groups/{name}",
            get(cluster::get_group).delete(cluster::delete_group),
        )
        .route("/1.0/projects", get(projects::list).post(projects::create))
        .route("/1.0/projects/{name}", get(projects::get_one).delete(projects::delete))
        .route("/1.0/profiles", get(profiles::list).post(profiles::create))
        .route(
            "/1.0/profiles/{name}",
            get(profiles::get_one).put(profiles::update).delete(profiles::delete),
        )
        .route("/1.0/instances", get(instances::list).post(instances::create))
        .route(
            "/1.0/instances/{name}",
            get(instances::get_one).delete(instances::delete),
        )
        .route("/1.0/storage-pools", get(composite::list_pools).post(composite::create_pool))
        .route(
            "/1.0/storage-pools/{name}",
            get(composite::get_pool)
                .put(composite::update_pool)
                .delete(composite::delete_pool),
        )
        .route("/1.0/networks", get(composite::list_networks).post(composite::create_network))
        .route(
            "/1.0/networks/{name}",
            get(composite::get_network)
                .put(composite::update_network)
                .delete(composite::delete_network),
        )
        .route("/1.0/operations", get(operations::list))
        .route(
            "/1.0/operations/{uuid}",
            get(operations::get_one).delete(operations::cancel),
        )
        .route("/1.0/operations/{uuid}/wait", get(operations::wait))
        .route("/1.0/operations/{uuid}/websocket", get(operations::websocket))
        .route("/1.0/warnings", get(warnings::list))
        .route("/1.0/warnings/{uuid}", get(warnings::get_one).put(warnings::update))
        .route("/internal/heartbeat", post(heartbeat::receive))
        .fallback(unknown_url)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn unknown_url() -> ApiError {
    ApiError(ClusterError::not_found("no such url"))
}
