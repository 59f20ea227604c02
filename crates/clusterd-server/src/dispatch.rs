//! Shared request dispatch.
//!
//! Every handler runs its request through [`dispatch`] before touching
//! domain state: the caller identity is extracted, the external
//! authorizer is consulted, and the routing decision tree picks
//! between executing here, proxying to the owning member, and serving
//! an aggregate from the replicated snapshot. Cluster-notification
//! requests short-circuit to local execution inside the router, which
//! is what keeps a notification from ever being forwarded again.

use crate::auth::{request_identity, RequestIdentity};
use crate::error::ApiResult;
use crate::state::ServerContext;
use axum::http::HeaderMap;
use axum::response::Response;
use clusterd_router::RouteDecision;
use clusterd_types::EntityRef;
use clusterd_wire::RequestParams;

pub enum Dispatch {
    /// Execute on this member; carries the caller identity for
    /// lifecycle attribution and the notification marker.
    Local(RequestIdentity),
    /// The request was proxied to the member that owns the entity;
    /// relay this response as-is, operation UUIDs and structured
    /// errors included.
    Remote(Response),
}

pub async fn dispatch(
    ctx: &ServerContext,
    headers: &HeaderMap,
    entity: &EntityRef,
    action: &str,
    params: &RequestParams,
    aggregate_list: bool,
    method: &str,
    path_and_query: &str,
    body: Vec<u8>,
) -> ApiResult<Dispatch> {
    let identity = request_identity(headers);
    let decision = ctx.route(entity, &identity.identity, action, params, aggregate_list, identity.notification)?;
    match decision {
        RouteDecision::Forward(owner) => {
            let member = ctx.member_by_id(owner)?;
            let (status, body) = ctx
                .forwarder
                .proxy(&member.address, method, path_and_query, &identity.identity, body)
                .await?;
            Ok(Dispatch::Remote(raw_response(status, body)))
        }
        // An aggregate list reads the replicated store, which already
        // holds every member's records: the local snapshot is the
        // merged cluster view, so no network fan-out is needed.
        RouteDecision::FanOut | RouteDecision::Local => Ok(Dispatch::Local(identity)),
    }
}

/// Rebuilds a response from a forwarded status + body, byte for byte.
pub fn raw_response(status: u16, body: Vec<u8>) -> Response {
    let status = axum::http::StatusCode::from_u16(status).unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = Response::new(axum::body::Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert("content-type", axum::http::HeaderValue::from_static("application/json"));
    response
}
