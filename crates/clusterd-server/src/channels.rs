//! Per-operation websocket frame relay.
//!
//! A websocket-class operation reserves one fd per stream plus a
//! control channel, each protected by a single-use secret. Connected
//! sockets for the same operation relay frames to each other; the
//! control fd carries the JSON control schema instead of data. Data
//! transfer only begins once every reserved secret has been redeemed.

use clusterd_operations::{OperationError, SecretGate};
use clusterd_types::OperationId;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

const RELAY_DEPTH: usize = 256;

/// A frame on its way through the relay, tagged with the fd it came
/// from so a socket never echoes its own traffic back.
#[derive(Debug, Clone)]
pub struct RelayFrame {
    pub from_fd: String,
    pub payload: Vec<u8>,
}

struct ChannelState {
    gate: SecretGate,
    secrets: BTreeMap<String, String>,
    relay: broadcast::Sender<RelayFrame>,
}

/// A successfully redeemed connection.
pub struct Redeemed {
    pub fd_id: String,
    /// True once this redemption completed the set: every reserved
    /// secret has now been used and data transfer may begin.
    pub fully_connected: bool,
    pub sender: broadcast::Sender<RelayFrame>,
    pub receiver: broadcast::Receiver<RelayFrame>,
}

#[derive(Default)]
pub struct OperationChannels {
    inner: Mutex<BTreeMap<OperationId, ChannelState>>,
}

impl OperationChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the secret set for a websocket-class operation.
    pub fn register(&self, id: OperationId, secrets: BTreeMap<String, String>) {
        let (relay, _) = broadcast::channel(RELAY_DEPTH);
        let state = ChannelState {
            gate: SecretGate::new(secrets.clone()),
            secrets,
            relay,
        };
        self.inner.lock().expect("channels lock poisoned").insert(id, state);
    }

    /// Redeems `secret` against the operation's reserved fds. The fd is
    /// found by the secret value alone; clients never learn fd ids out
    /// of band.
    pub fn redeem(&self, id: OperationId, secret: &str) -> Result<Redeemed, OperationError> {
        let mut inner = self.inner.lock().expect("channels lock poisoned");
        let state = inner.get_mut(&id).ok_or(OperationError::NotFound(id))?;
        let fd_id = state
            .secrets
            .iter()
            .find(|(_, s)| s.as_str() == secret)
            .map(|(fd, _)| fd.clone())
            .ok_or(OperationError::UnknownSecret)?;
        let fully_connected = state.gate.redeem(&fd_id, secret)?;
        Ok(Redeemed {
            fd_id,
            fully_connected,
            sender: state.relay.clone(),
            receiver: state.relay.subscribe(),
        })
    }

    /// Tears down the relay, disconnecting every subscriber.
    pub fn close(&self, id: OperationId) {
        self.inner.lock().expect("channels lock poisoned").remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("control".to_string(), "s-control".to_string()),
            ("0".to_string(), "s-0".to_string()),
        ])
    }

    #[test]
    fn redemption_completes_once_every_secret_is_used() {
        let channels = OperationChannels::new();
        let id = OperationId::new_v4();
        channels.register(id, secrets());

        let first = channels.redeem(id, "s-control").unwrap();
        assert_eq!(first.fd_id, "control");
        assert!(!first.fully_connected);

        let second = channels.redeem(id, "s-0").unwrap();
        assert_eq!(second.fd_id, "0");
        assert!(second.fully_connected);
    }

    #[test]
    fn secrets_are_single_use() {
        let channels = OperationChannels::new();
        let id = OperationId::new_v4();
        channels.register(id, secrets());
        channels.redeem(id, "s-0").unwrap();
        assert!(matches!(
            channels.redeem(id, "s-0"),
            Err(OperationError::SecretAlreadyRedeemed)
        ));
    }

    #[test]
    fn frames_reach_the_other_connected_fd() {
        let channels = OperationChannels::new();
        let id = OperationId::new_v4();
        channels.register(id, secrets());
        let control = channels.redeem(id, "s-control").unwrap();
        let mut data = channels.redeem(id, "s-0").unwrap();

        control
            .sender
            .send(RelayFrame {
                from_fd: "control".into(),
                payload: b"hello".to_vec(),
            })
            .unwrap();
        let frame = data.receiver.try_recv().unwrap();
        assert_eq!(frame.from_fd, "control");
        assert_eq!(frame.payload, b"hello");
    }
}
