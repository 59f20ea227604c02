//! Member-to-member request forwarding.
//!
//! A forwarded request is proxied verbatim: same method, same path and
//! query, same body, plus the caller's resolved identity. The response
//! body comes back untouched, so operation UUIDs and structured errors
//! survive the hop. Websocket forwarding opens an outbound client
//! connection to the owner and relays frames in both directions until
//! either side closes.

use crate::auth::IDENTITY_HEADER;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use clusterd_types::{ClusterError, ErrorKind};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as TungMessage;
use tracing::{debug, warn};

const FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
}

impl Forwarder {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FORWARD_TIMEOUT)
            .build()
            .expect("static reqwest client configuration is valid");
        Self { client }
    }

    /// Proxies one request to `address` (host:port of the owning
    /// member). Transport failures surface as `member_offline` so the
    /// client can tell "the owner is down" from "the owner said no".
    pub async fn proxy(
        &self,
        address: &str,
        method: &str,
        path_and_query: &str,
        identity: &str,
        body: Vec<u8>,
    ) -> Result<(u16, Vec<u8>), ClusterError> {
        let url = format!("http://{address}{path_and_query}");
        let method: reqwest::Method = method
            .parse()
            .map_err(|_| ClusterError::bad_request(format!("invalid method {method:?}")))?;
        debug!(%url, "forwarding request to owning member");
        let response = self
            .client
            .request(method, &url)
            .header(IDENTITY_HEADER, identity)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| {
                ClusterError::new(ErrorKind::MemberOffline, format!("forwarding to {address} failed: {err}"))
            })?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| ClusterError::new(ErrorKind::MemberOffline, format!("reading forwarded response: {err}")))?;
        Ok((status, body.to_vec()))
    }

    /// Sends a cluster-notification `POST` to a peer. These carry the
    /// marker header the receiving router treats as terminal, so a
    /// notification can never bounce between members.
    pub async fn notify_peer(&self, address: &str, path: &str, body: Vec<u8>) -> Result<(), ClusterError> {
        let url = format!("http://{address}{path}");
        let response = self
            .client
            .post(&url)
            .header(clusterd_wire::CLUSTER_NOTIFICATION_HEADER, "true")
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| {
                ClusterError::new(ErrorKind::MemberOffline, format!("notifying {address} failed: {err}"))
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.bytes().await.unwrap_or_default();
            Err(parse_forwarded_error(status, &body))
        }
    }
}

/// Recovers the structured error from a peer's response body, falling
/// back to a generic internal error when the body is not an envelope.
pub fn parse_forwarded_error(status: u16, body: &[u8]) -> ClusterError {
    if let Ok(serde_json::Value::Object(envelope)) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(message) = envelope.get("error").and_then(|e| e.as_str()) {
            let kind = match status {
                400 => ErrorKind::BadRequest,
                403 => ErrorKind::Forbidden,
                404 => ErrorKind::NotFound,
                409 => ErrorKind::Conflict,
                412 => ErrorKind::PreconditionFailed,
                503 => ErrorKind::MemberOffline,
                _ => ErrorKind::Internal,
            };
            return ClusterError::new(kind, message.to_string());
        }
    }
    ClusterError::internal(format!("peer returned status {status}"))
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new()
    }
}

/// Bidirectional websocket relay between an accepted client socket and
/// the owning member. Returns once either side closes or errors.
pub async fn tunnel_websocket(mut client: WebSocket, target_url: &str) {
    let (upstream, _) = match connect_async(target_url).await {
        Ok(pair) => pair,
        Err(err) => {
            warn!(%target_url, %err, "websocket forward failed to connect");
            let _ = client.send(WsMessage::Close(None)).await;
            return;
        }
    };
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    loop {
        tokio::select! {
            from_client = client.recv() => {
                match from_client {
                    Some(Ok(message)) => {
                        let Some(converted) = to_tungstenite(message) else { continue };
                        if upstream_tx.send(converted).await.is_err() {
                            break;
                        }
                    }
                    _ => {
                        let _ = upstream_tx.send(TungMessage::Close(None)).await;
                        break;
                    }
                }
            }
            from_upstream = upstream_rx.next() => {
                match from_upstream {
                    Some(Ok(message)) => {
                        let Some(converted) = to_axum(message) else { continue };
                        if client.send(converted).await.is_err() {
                            break;
                        }
                    }
                    _ => {
                        let _ = client.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }
}

fn to_tungstenite(message: WsMessage) -> Option<TungMessage> {
    match message {
        WsMessage::Text(text) => Some(TungMessage::text(text.to_string())),
        WsMessage::Binary(data) => Some(TungMessage::binary(data.to_vec())),
        WsMessage::Close(_) => Some(TungMessage::Close(None)),
        // Ping/pong is handled per-hop by each websocket stack.
        WsMessage::Ping(_) | WsMessage::Pong(_) => None,
    }
}

fn to_axum(message: TungMessage) -> Option<WsMessage> {
    match message {
        TungMessage::Text(text) => Some(WsMessage::Text(text.to_string().into())),
        TungMessage::Binary(data) => Some(WsMessage::Binary(data.to_vec().into())),
        TungMessage::Close(_) => Some(WsMessage::Close(None)),
        TungMessage::Ping(_) | TungMessage::Pong(_) | TungMessage::Frame(_) => None,
    }
}
