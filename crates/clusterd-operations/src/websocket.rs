//! Websocket-class operation fd-secret gating.
//!
//! Every websocket-class operation reserves one fd for a control
//! channel and one or more for data. A connection is only allowed to
//! start exchanging data once every reserved secret has been redeemed
//! at least once.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct SecretGate {
    /// fd-id -> secret, for secrets not yet redeemed.
    pending: BTreeMap<String, String>,
    redeemed: BTreeSet<String>,
}

impl SecretGate {
    pub fn new(secrets: BTreeMap<String, String>) -> Self {
        Self {
            pending: secrets,
            redeemed: BTreeSet::new(),
        }
    }

    /// Redeems `secret` for `fd_id`. Returns `true` once every fd has
    /// been redeemed at least once, which is the caller's cue to begin
    /// streaming data.
    pub fn redeem(&mut self, fd_id: &str, secret: &str) -> Result<bool, crate::error::OperationError> {
        match self.pending.get(fd_id) {
            Some(expected) if expected == secret => {
                self.pending.remove(fd_id);
                self.redeemed.insert(fd_id.to_string());
                Ok(self.pending.is_empty())
            }
            Some(_) => Err(crate::error::OperationError::UnknownSecret),
            None if self.redeemed.contains(fd_id) => Err(crate::error::OperationError::SecretAlreadyRedeemed),
            None => Err(crate::error::OperationError::UnknownSecret),
        }
    }

    pub fn is_fully_connected(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> SecretGate {
        let mut secrets = BTreeMap::new();
        secrets.insert("control".to_string(), "s-control".to_string());
        secrets.insert("0".to_string(), "s-0".to_string());
        SecretGate::new(secrets)
    }

    #[test]
    fn becomes_fully_connected_once_every_secret_is_redeemed() {
        let mut gate = gate();
        assert!(!gate.redeem("control", "s-control").unwrap());
        assert!(gate.redeem("0", "s-0").unwrap());
        assert!(gate.is_fully_connected());
    }

    #[test]
    fn wrong_secret_for_a_known_fd_is_rejected() {
        let mut gate = gate();
        let err = gate.redeem("control", "wrong").unwrap_err();
        assert!(matches!(err, crate::error::OperationError::UnknownSecret));
    }

    #[test]
    fn redeeming_twice_is_rejected() {
        let mut gate = gate();
        gate.redeem("control", "s-control").unwrap();
        let err = gate.redeem("control", "s-control").unwrap_err();
        assert!(matches!(err, crate::error::OperationError::SecretAlreadyRedeemed));
    }
}
