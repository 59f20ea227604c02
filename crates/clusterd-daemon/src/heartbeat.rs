//! Leader-side heartbeat fan-out.
//!
//! Each tick, the member holding `database-leader` posts its signed
//! view of the cluster to every peer, records which peers answered,
//! and fails over the operations of any member that has crossed the
//! offline threshold.

use clusterd_crypto::ClusterIdentity;
use clusterd_membership::{HeartbeatRequest, MemberSummary};
use clusterd_server::ServerContext;
use clusterd_types::{MemberState, OperationState, Role, Timestamp};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

pub async fn run(ctx: Arc<ServerContext>, keypair: ClusterIdentity, mut shutdown: watch::Receiver<bool>) {
    let interval = std::time::Duration::from_secs(ctx.config.cluster.heartbeat_interval_secs());
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = round(&ctx, &keypair).await {
                    warn!(%err, "heartbeat round failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

async fn round(ctx: &ServerContext, keypair: &ClusterIdentity) -> Result<(), clusterd_types::ClusterError> {
    let members = ctx.members()?;
    let local = members.iter().find(|m| m.id == ctx.local_member);
    // Only the leader fans out; followers just answer.
    if !local.map(|m| m.has_role(Role::DatabaseLeader)).unwrap_or(false) {
        return Ok(());
    }

    let request = HeartbeatRequest {
        view: ctx.store.current_view().0,
        members: members
            .iter()
            .map(|m| MemberSummary {
                id: m.id,
                roles: m.roles.clone(),
                groups: m.groups.clone(),
            })
            .collect(),
    };
    let body = serde_json::to_vec(&request).map_err(|e| clusterd_types::ClusterError::internal(e.to_string()))?;
    let signed = serde_json::to_vec(&keypair.sign(&body)).map_err(|e| clusterd_types::ClusterError::internal(e.to_string()))?;

    let now = Timestamp::now();
    for member in &members {
        if member.id == ctx.local_member {
            continue;
        }
        match ctx.forwarder.notify_peer(&member.address, "/internal/heartbeat", signed.clone()).await {
            Ok(()) => {
                if let Ok(mut record) = ctx.roster.get(member.id) {
                    record.last_heartbeat = now;
                    let _ = ctx.roster.update(&record);
                }
                debug!(member = %member.name, "heartbeat acknowledged");
            }
            Err(err) => {
                debug!(member = %member.name, %err, "heartbeat missed");
            }
        }
    }

    // Fail over operations owned by members that crossed the offline
    // threshold; their websockets are torn down with them.
    let threshold = ctx.config.cluster.offline_threshold_secs;
    for member in &members {
        if member.id == ctx.local_member || member.state != MemberState::Created {
            continue;
        }
        if !member.reachable(now, threshold) {
            match ctx.tracker.mark_member_offline(member.id) {
                Ok(closed) => {
                    for id in closed {
                        ctx.channels.close(id);
                        ctx.emit_operation(id, OperationState::Failure);
                    }
                }
                Err(err) => warn!(member = %member.name, %err, "offline sweep failed"),
            }
        }
    }
    Ok(())
}
