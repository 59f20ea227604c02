//! Cluster-wide fan-out.
//!
//! `notify(scope, fn)` opens one authenticated client per selected peer
//! and calls `fn(client)` against it. Parallelism is bounded to exactly
//! one in-flight call per peer: a peer is never called twice
//! concurrently, and peers are never serialized against each other.
//! Callers own the transport; this crate only owns the peer-selection
//! and error-aggregation policy.

use clusterd_types::{ClusterError, MemberId};
use std::future::Future;

/// Which peers a `notify` call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every member, including ones already marked offline.
    All,
    /// Every member not currently marked offline.
    Alive,
    /// Every member except the caller.
    Peers,
}

/// A candidate peer as seen by the caller at fan-out time.
#[derive(Debug, Clone, Copy)]
pub struct PeerView {
    pub id: MemberId,
    pub is_self: bool,
    pub offline: bool,
}

#[derive(Debug)]
pub struct FanoutError {
    pub failures: Vec<(MemberId, ClusterError)>,
}

impl std::error::Error for FanoutError {}

impl std::fmt::Display for FanoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} of the selected peers failed", self.failures.len())
    }
}

fn select(scope: Scope, peers: &[PeerView]) -> Vec<MemberId> {
    peers
        .iter()
        .filter(|p| match scope {
            Scope::All => true,
            Scope::Alive => !p.offline,
            Scope::Peers => !p.is_self,
        })
        .map(|p| p.id)
        .collect()
}

/// Runs `call` against every peer selected by `scope`, concurrently,
/// with exactly one in-flight call per peer. Aggregates failures
/// according to scope: `All` requires every call to succeed; `Alive`
/// and `Peers` tolerate no failures either, since an already-offline
/// peer is excluded from selection rather than tolerated after the
/// fact — offline tolerance happens at selection time, not in the
/// aggregation step.
pub async fn notify<F, Fut>(scope: Scope, peers: &[PeerView], call: F) -> Result<(), FanoutError>
where
    F: Fn(MemberId) -> Fut,
    Fut: Future<Output = Result<(), ClusterError>> + Send + 'static,
{
    let targets = select(scope, peers);
    let mut handles = Vec::with_capacity(targets.len());
    for peer in targets {
        let fut = call(peer);
        handles.push(async move { (peer, fut.await) });
    }

    let results = futures_join_all(handles).await;
    let failures: Vec<(MemberId, ClusterError)> = results.into_iter().filter_map(|(id, r)| r.err().map(|e| (id, e))).collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(FanoutError { failures })
    }
}

/// Minimal `join_all` so this crate does not need the `futures` crate
/// for a single call site; each future runs on its own task so peers
/// genuinely run concurrently rather than sequentially.
async fn futures_join_all<T, Fut>(futs: Vec<Fut>) -> Vec<T>
where
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = futs.into_iter().map(tokio::spawn).collect();
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.expect("notifier task panicked"));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn peer(id: u64, is_self: bool, offline: bool) -> PeerView {
        PeerView {
            id: MemberId::new(id),
            is_self,
            offline,
        }
    }

    #[tokio::test]
    async fn all_scope_includes_offline_peers() {
        let peers = vec![peer(1, true, false), peer(2, false, true)];
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let result = notify(Scope::All, &peers, move |_id| {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn alive_scope_excludes_offline_peers() {
        let peers = vec![peer(1, true, false), peer(2, false, true)];
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        notify(Scope::Alive, &peers, move |_id| {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn peers_scope_excludes_self() {
        let peers = vec![peer(1, true, false), peer(2, false, false)];
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        notify(Scope::Peers, &peers, move |_id| {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_single_failure_is_reported() {
        let peers = vec![peer(1, true, false), peer(2, false, false)];
        let result = notify(Scope::All, &peers, |id| async move {
            if id == MemberId::new(2) {
                Err(ClusterError::internal("boom"))
            } else {
                Ok(())
            }
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].0, MemberId::new(2));
    }
}
