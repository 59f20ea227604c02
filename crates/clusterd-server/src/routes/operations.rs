//! Operation endpoints: list, read-forward, wait, cancel, websocket.
//!
//! An operation lives on the member that registered it. Requests
//! arriving anywhere else route to the owner through the dispatch
//! layer, preserving the UUID, so a client can poll either member and
//! see the same job.

use crate::auth::request_identity;
use crate::dispatch::{dispatch, Dispatch};
use crate::error::{envelope, ApiError, ApiResult};
use crate::state::ServerContext;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use clusterd_router::RouteDecision;
use clusterd_types::{ClusterError, EntityRef, EntityType, Operation, OperationClass, OperationId, OperationState};
use clusterd_wire::{ApiResponse, ControlMessage, RequestParams};
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

fn operation_json(operation: &Operation) -> serde_json::Value {
    json!({
        "id": operation.id.to_string(),
        "url": format!("/1.0/operations/{}", operation.id),
        "class": match operation.class {
            OperationClass::Task => "task",
            OperationClass::Websocket => "websocket",
            OperationClass::Token => "token",
        },
        "description": operation.description,
        "status": operation.state.to_string(),
        "created_at": operation.created_at.to_string(),
        "updated_at": operation.updated_at.to_string(),
        "metadata": operation.metadata,
        "resources": operation.resources,
        "may_cancel": operation.cancellable,
        "err": operation.err,
        "location": operation.creator.as_u64(),
    })
}

fn operation_ref(raw: &str) -> EntityRef {
    EntityRef::new(EntityType::Operation, vec![raw.to_string()])
}

fn parse_id(raw: &str) -> Result<OperationId, ApiError> {
    OperationId::from_str(raw).map_err(|_| ApiError(ClusterError::not_found(format!("operation {raw}"))))
}

pub async fn list(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let collection = EntityRef::new(EntityType::Operation, vec![]);
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &collection, "list", &params, true, "GET", "/1.0/operations", Vec::new()).await?
    {
        return Ok(response);
    }

    let operations = ctx.tracker.list()?;
    Ok(envelope(ApiResponse::sync(json!(operations
        .iter()
        .map(operation_json)
        .collect::<Vec<_>>()))))
}

pub async fn get_one(
    State(ctx): State<Arc<ServerContext>>,
    Path(raw): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let id = parse_id(&raw)?;
    let path = format!("/1.0/operations/{id}");
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &operation_ref(&raw), "get", &params, false, "GET", &path, Vec::new()).await?
    {
        return Ok(response);
    }

    let operation = ctx.tracker.get(id)?;
    Ok(envelope(ApiResponse::sync(operation_json(&operation))))
}

#[derive(Debug, Deserialize)]
pub struct WaitParams {
    #[serde(default = "default_wait")]
    pub timeout: u64,
}

fn default_wait() -> u64 {
    30
}

pub async fn wait(
    State(ctx): State<Arc<ServerContext>>,
    Path(raw): Path<String>,
    Query(params): Query<WaitParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let id = parse_id(&raw)?;
    let path = format!("/1.0/operations/{id}/wait?timeout={}", params.timeout);
    if let Dispatch::Remote(response) = dispatch(
        &ctx,
        &headers,
        &operation_ref(&raw),
        "get",
        &RequestParams::default(),
        false,
        "GET",
        &path,
        Vec::new(),
    )
    .await?
    {
        return Ok(response);
    }

    match ctx.tracker.wait(id, Duration::from_secs(params.timeout)).await {
        Ok(operation) => Ok(envelope(ApiResponse::sync(operation_json(&operation)))),
        // A timeout is not an error: the client gets the operation as
        // it stands and may wait again.
        Err(clusterd_operations::OperationError::WaitTimedOut) => {
            let operation = ctx.tracker.get(id)?;
            Ok(envelope(ApiResponse::sync(operation_json(&operation))))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn cancel(
    State(ctx): State<Arc<ServerContext>>,
    Path(raw): Path<String>,
    Query(params): Query<RequestParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let id = parse_id(&raw)?;
    let path = format!("/1.0/operations/{id}");
    if let Dispatch::Remote(response) =
        dispatch(&ctx, &headers, &operation_ref(&raw), "delete", &params, false, "DELETE", &path, Vec::new()).await?
    {
        return Ok(response);
    }

    ctx.tracker.cancel(id).await?;
    ctx.emit_operation(id, OperationState::Cancelled);
    ctx.channels.close(id);
    Ok(envelope(ApiResponse::sync(serde_json::Value::Null)))
}

#[derive(Debug, Deserialize)]
pub struct WebsocketParams {
    pub secret: String,
}

/// `GET /1.0/operations/{uuid}/websocket?secret=…`.
///
/// On the owning member the connection joins the operation's relay;
/// anywhere else the router's forward decision turns it into a
/// bidirectional tunnel to the owner.
pub async fn websocket(
    State(ctx): State<Arc<ServerContext>>,
    Path(raw): Path<String>,
    Query(params): Query<WebsocketParams>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> ApiResult<Response> {
    let id = parse_id(&raw)?;
    let operation = ctx.tracker.get(id)?;
    if operation.class != OperationClass::Websocket {
        return Err(ApiError(ClusterError::bad_request("operation has no websocket")));
    }

    let identity = request_identity(&headers);
    let decision = ctx.route(
        &operation_ref(&raw),
        &identity.identity,
        "get",
        &RequestParams::default(),
        false,
        identity.notification,
    )?;

    if let RouteDecision::Forward(owner) = decision {
        let member = ctx.member_by_id(owner)?;
        let target = format!("ws://{}/1.0/operations/{id}/websocket?secret={}", member.address, params.secret);
        return Ok(upgrade.on_upgrade(move |socket| async move {
            crate::forward::tunnel_websocket(socket, &target).await;
        }));
    }

    let redeemed = ctx.channels.redeem(id, &params.secret).map_err(|err| match err {
        clusterd_operations::OperationError::UnknownSecret
        | clusterd_operations::OperationError::SecretAlreadyRedeemed => {
            ApiError(ClusterError::forbidden("invalid websocket secret"))
        }
        other => ApiError(other.into()),
    })?;

    Ok(upgrade.on_upgrade(move |socket| async move {
        serve_relay(socket, redeemed).await;
    }))
}

async fn serve_relay(mut socket: WebSocket, mut redeemed: crate::channels::Redeemed) {
    let fd = redeemed.fd_id.clone();
    debug!(%fd, "operation websocket connected");
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Binary(data))) => {
                        let _ = redeemed.sender.send(crate::channels::RelayFrame {
                            from_fd: fd.clone(),
                            payload: data.to_vec(),
                        });
                    }
                    Some(Ok(Message::Text(text))) => {
                        if fd == "control" {
                            match serde_json::from_str::<ControlMessage>(&text) {
                                Ok(message) => debug!(?message, "control message"),
                                Err(err) => warn!(%err, "malformed control message"),
                            }
                        }
                        let _ = redeemed.sender.send(crate::channels::RelayFrame {
                            from_fd: fd.clone(),
                            payload: text.as_bytes().to_vec(),
                        });
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(%err, "operation websocket error");
                        break;
                    }
                }
            }
            relayed = redeemed.receiver.recv() => {
                match relayed {
                    Ok(frame) if frame.from_fd != fd => {
                        if socket.send(Message::Binary(frame.payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    // Relay torn down: the operation finished or was
                    // cancelled.
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                }
            }
        }
    }
    let _ = socket.send(Message::Close(None)).await;
    debug!(%fd, "operation websocket disconnected");
}
