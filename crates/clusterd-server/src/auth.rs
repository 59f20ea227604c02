//! Request identity and cluster-notification extraction.
//!
//! Authentication proper (mTLS client certificates, OIDC) happens in
//! front of the daemon; by the time a request reaches a handler the
//! transport has already resolved the caller to an identity string,
//! carried in a trusted header. Peer-to-peer calls are instead signed
//! with the sending member's cluster key and verified against the
//! trust store.

use axum::http::HeaderMap;
use clusterd_crypto::{ClusterTrustStore, SignedEnvelope};
use clusterd_types::ClusterError;
use clusterd_wire::{ClusterNotification, CLUSTER_NOTIFICATION_HEADER};

/// Header carrying the transport-resolved caller identity.
pub const IDENTITY_HEADER: &str = "x-clusterd-identity";

#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub identity: String,
    pub notification: ClusterNotification,
}

pub fn request_identity(headers: &HeaderMap) -> RequestIdentity {
    let identity = headers
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();
    let notification = ClusterNotification::from_header_value(
        headers.get(CLUSTER_NOTIFICATION_HEADER).and_then(|v| v.to_str().ok()),
    );
    RequestIdentity { identity, notification }
}

/// Verifies a signed peer request and returns the sending member's
/// name together with the authenticated body.
pub fn verify_peer_envelope(trust: &ClusterTrustStore, raw: &[u8]) -> Result<(String, Vec<u8>), ClusterError> {
    let envelope: SignedEnvelope =
        serde_json::from_slice(raw).map_err(|e| ClusterError::bad_request(format!("malformed signed envelope: {e}")))?;
    let signer = trust
        .verify(&envelope)
        .map_err(|e| ClusterError::forbidden(e.to_string()))?
        .to_string();
    Ok((signer, envelope.body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use clusterd_crypto::ClusterIdentity;

    #[test]
    fn missing_identity_header_is_anonymous() {
        let headers = HeaderMap::new();
        let identity = request_identity(&headers);
        assert_eq!(identity.identity, "anonymous");
        assert!(!identity.notification.is_notification());
    }

    #[test]
    fn notification_header_is_recognized() {
        let mut headers = HeaderMap::new();
        headers.insert(CLUSTER_NOTIFICATION_HEADER, HeaderValue::from_static("true"));
        headers.insert(IDENTITY_HEADER, HeaderValue::from_static("m2"));
        let identity = request_identity(&headers);
        assert_eq!(identity.identity, "m2");
        assert!(identity.notification.is_notification());
    }

    #[test]
    fn peer_envelope_from_a_trusted_member_verifies() {
        let keypair = ClusterIdentity::generate();
        let mut trust = ClusterTrustStore::new();
        trust.trust("m2", keypair.verifying_key_bytes());

        let envelope = keypair.sign(b"{\"view\":3}");
        let raw = serde_json::to_vec(&envelope).unwrap();
        let (signer, body) = verify_peer_envelope(&trust, &raw).unwrap();
        assert_eq!(signer, "m2");
        assert_eq!(body, b"{\"view\":3}");
    }

    #[test]
    fn peer_envelope_from_an_unknown_key_is_forbidden() {
        let keypair = ClusterIdentity::generate();
        let trust = ClusterTrustStore::new();
        let raw = serde_json::to_vec(&keypair.sign(b"x")).unwrap();
        let err = verify_peer_envelope(&trust, &raw).unwrap_err();
        assert_eq!(err.kind, clusterd_types::ErrorKind::Forbidden);
    }
}
