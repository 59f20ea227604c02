//! `GET /1.0/events` — websocket event subscription.

use crate::auth::request_identity;
use crate::error::{ApiError, ApiResult};
use crate::state::ServerContext;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use clusterd_events::SubscriptionFilter;
use clusterd_types::{EntityRef, EntityType, EventType};
use clusterd_wire::RequestParams;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How often a connected subscriber's inbox is drained. Delivery is
/// best-effort; the inbox itself is bounded and the bus drops the
/// subscriber if it overflows between drains.
const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default, Deserialize)]
pub struct EventParams {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub project: Option<String>,
}

pub async fn subscribe(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<EventParams>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> ApiResult<Response> {
    // Subscriptions attach to the local bus, but the caller still goes
    // through authorization like any other request.
    let identity = request_identity(&headers);
    let entity = EntityRef::new(EntityType::Server, vec![]);
    ctx.route(&entity, &identity.identity, "get", &RequestParams::default(), false, identity.notification)
        .map_err(ApiError::from)?;

    let filter = SubscriptionFilter {
        event_type: params.event_type.as_deref().and_then(parse_event_type),
        project: params.project,
    };
    Ok(upgrade.on_upgrade(move |socket| async move {
        serve(ctx, filter, socket).await;
    }))
}

fn parse_event_type(raw: &str) -> Option<EventType> {
    match raw {
        "logging" => Some(EventType::Logging),
        "operation" => Some(EventType::Operation),
        "lifecycle" => Some(EventType::Lifecycle),
        _ => None,
    }
}

async fn serve(ctx: Arc<ServerContext>, filter: SubscriptionFilter, mut socket: WebSocket) {
    let id = ctx.events.subscribe(filter);
    debug!(?id, "event subscriber connected");
    let mut drain = tokio::time::interval(DRAIN_INTERVAL);
    loop {
        tokio::select! {
            _ = drain.tick() => {
                while let Some(event) = ctx.events.poll(id) {
                    let Ok(encoded) = serde_json::to_string(&event) else { continue };
                    if socket.send(Message::Text(encoded.into())).await.is_err() {
                        ctx.events.unsubscribe(id);
                        return;
                    }
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    ctx.events.unsubscribe(id);
    debug!(?id, "event subscriber disconnected");
}
