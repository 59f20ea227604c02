//! The member-side heartbeat endpoint.
//!
//! The leader posts a signed [`HeartbeatRequest`] carrying its view of
//! the cluster to every member each tick; the member verifies the
//! signature against its trust store, records the contact, and replies
//! with its versions and a load sample. The leader-side sending loop
//! lives in the daemon next to the membership tick.

use crate::auth::verify_peer_envelope;
use crate::error::{envelope, ApiError, ApiResult};
use crate::state::ServerContext;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;
use clusterd_membership::{HeartbeatReply, HeartbeatRequest, LoadSample};
use clusterd_types::{ClusterError, Timestamp};
use clusterd_wire::ApiResponse;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub async fn receive(State(ctx): State<Arc<ServerContext>>, body: Bytes) -> ApiResult<Response> {
    let request: HeartbeatRequest = {
        let trust = ctx.trust.read().expect("trust store lock poisoned");
        // An empty trust store means the cluster has not exchanged keys
        // yet (bootstrap, single member): accept the bare request body.
        if trust.is_empty() {
            serde_json::from_slice(&body).map_err(|e| ApiError(ClusterError::bad_request(e.to_string())))?
        } else {
            let (signer, verified) = verify_peer_envelope(&trust, &body)?;
            debug!(%signer, "verified heartbeat");
            serde_json::from_slice(&verified).map_err(|e| ApiError(ClusterError::bad_request(e.to_string())))?
        }
    };

    // Record the leader's contact against our own roster entry so the
    // local view of "last heard from the cluster" stays fresh.
    if let Ok(mut local) = ctx.roster.get(ctx.local_member) {
        local.last_heartbeat = Timestamp::now();
        let _ = ctx.roster.update(&local);
    }
    debug!(view = request.view, members = request.members.len(), "heartbeat received");

    let reply = HeartbeatReply {
        member: ctx.local_member,
        schema_version: 1,
        api_extensions_version: 1,
        load: LoadSample {
            instance_count: ctx.instances.count_on_member(ctx.local_member).unwrap_or(0) as u32,
            recent_placements: 0,
        },
    };
    Ok(envelope(ApiResponse::sync(json!(reply))))
}
