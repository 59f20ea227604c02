//! Cluster-certificate signing, verification, and content hashing.
//!
//! Every heartbeat and cluster-notification request is signed with the
//! issuing member's cluster key and verified against the cluster's
//! trust store before it is acted on. ETags are a [`ContentHash`] of
//! the resource body.

mod etag;
mod identity;

pub use etag::ContentHash;
pub use identity::{ClusterIdentity, ClusterTrustStore, SignatureError, SignedEnvelope};
