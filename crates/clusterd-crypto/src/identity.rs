use std::collections::BTreeMap;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// A member's cluster keypair, used to sign heartbeats and
/// cluster-notification requests sent to peers.
pub struct ClusterIdentity {
    signing_key: Zeroizing<[u8; 32]>,
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for ClusterIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterIdentity")
            .field("verifying_key", &hex::encode(self.verifying_key.as_bytes()))
            .finish_non_exhaustive()
    }
}

impl ClusterIdentity {
    /// Generates a fresh identity. Called once, at the time a member
    /// joins the cluster; the key is then persisted alongside the
    /// member's local config (outside the scope of this crate).
    pub fn generate() -> Self {
        let key = SigningKey::generate(&mut OsRng);
        Self {
            verifying_key: key.verifying_key(),
            signing_key: Zeroizing::new(key.to_bytes()),
        }
    }

    pub fn from_bytes(seed: [u8; 32]) -> Self {
        let key = SigningKey::from_bytes(&seed);
        Self {
            verifying_key: key.verifying_key(),
            signing_key: Zeroizing::new(seed),
        }
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.signing_key)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.verifying_key
    }

    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Signs `body` (the serialized request) and wraps it with the
    /// signer's public key so a peer can verify without a prior
    /// round-trip.
    pub fn sign(&self, body: &[u8]) -> SignedEnvelope {
        let signature = self.signing_key().sign(body);
        SignedEnvelope {
            signer: self.verifying_key.to_bytes(),
            signature: signature.to_bytes(),
            body: body.to_vec(),
        }
    }
}

/// A signed request as it travels over the wire.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SignedEnvelope {
    pub signer: [u8; 32],
    #[serde(with = "signature_bytes")]
    pub signature: [u8; 64],
    pub body: Vec<u8>,
}

/// serde's derived array support only covers lengths up to 32, so
/// ed25519's 64-byte signature needs an explicit (de)serializer that
/// treats it as a fixed-size tuple, same as serde does for smaller arrays.
mod signature_bytes {
    use serde::de::{Error, SeqAccess, Visitor};
    use serde::ser::SerializeTuple;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(bytes: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_tuple(64)?;
        for b in bytes {
            seq.serialize_element(b)?;
        }
        seq.end()
    }

    struct ArrayVisitor;

    impl<'de> Visitor<'de> for ArrayVisitor {
        type Value = [u8; 64];

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an array of 64 bytes")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut out = [0u8; 64];
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = seq
                    .next_element()?
                    .ok_or_else(|| Error::invalid_length(i, &self))?;
            }
            Ok(out)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 64], D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_tuple(64, ArrayVisitor)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("signer {0} is not a trusted cluster member")]
    UntrustedSigner(String),
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("malformed public key")]
    MalformedKey,
}

/// The set of member public keys this member currently trusts, kept in
/// sync with the membership manager's view of the cluster.
#[derive(Debug, Default)]
pub struct ClusterTrustStore {
    trusted: BTreeMap<[u8; 32], String>,
}

impl ClusterTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trust(&mut self, member_name: impl Into<String>, verifying_key: [u8; 32]) {
        self.trusted.insert(verifying_key, member_name.into());
    }

    pub fn revoke(&mut self, verifying_key: &[u8; 32]) {
        self.trusted.remove(verifying_key);
    }

    pub fn len(&self) -> usize {
        self.trusted.len()
    }

    /// True until the first peer key is learned, i.e. while this member
    /// is alone in the cluster.
    pub fn is_empty(&self) -> bool {
        self.trusted.is_empty()
    }

    /// Verifies the envelope's signature and that its signer is a
    /// currently-trusted member; returns the signer's member name.
    pub fn verify(&self, envelope: &SignedEnvelope) -> Result<&str, SignatureError> {
        let verifying_key = VerifyingKey::from_bytes(&envelope.signer)
            .map_err(|_| SignatureError::MalformedKey)?;
        let signature = Signature::from_bytes(&envelope.signature);
        verifying_key
            .verify(&envelope.body, &signature)
            .map_err(|_| SignatureError::InvalidSignature)?;
        self.trusted
            .get(&envelope.signer)
            .map(String::as_str)
            .ok_or_else(|| SignatureError::UntrustedSigner(hex::encode(envelope.signer)))
    }
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trusted_signer_round_trips() {
        let identity = ClusterIdentity::generate();
        let mut trust = ClusterTrustStore::new();
        trust.trust("m1", identity.verifying_key_bytes());

        let envelope = identity.sign(b"heartbeat-view-7");
        assert_eq!(trust.verify(&envelope).unwrap(), "m1");
    }

    #[test]
    fn untrusted_signer_is_rejected() {
        let identity = ClusterIdentity::generate();
        let trust = ClusterTrustStore::new();

        let envelope = identity.sign(b"heartbeat-view-7");
        assert!(matches!(
            trust.verify(&envelope),
            Err(SignatureError::UntrustedSigner(_))
        ));
    }

    #[test]
    fn tampered_body_fails_verification() {
        let identity = ClusterIdentity::generate();
        let mut trust = ClusterTrustStore::new();
        trust.trust("m1", identity.verifying_key_bytes());

        let mut envelope = identity.sign(b"heartbeat-view-7");
        envelope.body = b"heartbeat-view-8".to_vec();
        assert!(matches!(trust.verify(&envelope), Err(SignatureError::InvalidSignature)));
    }
}
