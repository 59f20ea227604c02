//! Daemon assembly and lifecycle: build the server context, start the
//! background loops, serve the REST surface until interrupted.

use crate::heartbeat;
use anyhow::{Context, Result};
use clusterd_config::DaemonConfig;
use clusterd_crypto::ClusterIdentity;
use clusterd_membership::MembershipManager;
use clusterd_placement::{ExecutionLimits, PlacementEngine, SchedulerMode};
use clusterd_server::{routes, ServerContext};
use clusterd_store::{InMemoryStore, ReplicaId, Store};
use clusterd_types::{Member, MemberId, MemberState, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

pub async fn run(config: DaemonConfig) -> Result<()> {
    // The replica identity doubles as the member id: both come from
    // configuration so every daemon in a cluster can be distinct.
    let replica = ReplicaId(config.server.replica_id);
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(replica));

    let mut local = Member::new(
        MemberId::new(config.server.replica_id),
        config.server.name.clone(),
        config.server.rest_address.clone(),
    );
    local.architecture = std::env::consts::ARCH.to_string();
    local.state = MemberState::Created;
    local.last_heartbeat = Timestamp::now();

    let engine = build_engine(&config)?;
    let ctx = Arc::new(ServerContext::new(config.clone(), local, Arc::clone(&store)).with_engine(engine));
    let keypair = ClusterIdentity::generate();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Membership tick loop: heartbeat accounting plus role election,
    // with role changes published as lifecycle events.
    let manager = MembershipManager::new(Arc::clone(&store), replica, config.cluster.clone());
    let events_ctx = Arc::clone(&ctx);
    let membership = tokio::spawn(manager.run(shutdown_rx.clone(), move |changes| {
        for change in changes {
            if let Ok(member) = events_ctx.roster.get(change.member) {
                events_ctx.emit_lifecycle(
                    None,
                    "cluster-member-updated",
                    &format!("/1.0/cluster/members/{}", member.name),
                    None,
                );
            }
        }
        // Role changes can add or remove event-hub members; replan how
        // events fan out across the cluster.
        if let Ok(members) = events_ctx.members() {
            match clusterd_events::plan_topology(&members) {
                clusterd_events::FanoutTopology::FullMesh => {
                    info!(members = members.len(), "event fan-out: full mesh");
                }
                clusterd_events::FanoutTopology::HubRelay { hubs } => {
                    info!(hubs = hubs.len(), "event fan-out: hub relay");
                }
            }
        }
    }));

    // Leader-side heartbeat fan-out and offline sweep.
    let heartbeats = tokio::spawn(heartbeat::run(Arc::clone(&ctx), keypair, shutdown_rx.clone()));

    if let Some(debug_address) = config.server.debug_address.clone() {
        tokio::spawn(serve_debug(Arc::clone(&ctx), debug_address));
    }

    let listener = tokio::net::TcpListener::bind(&config.server.rest_address)
        .await
        .with_context(|| format!("cannot bind {}", config.server.rest_address))?;
    info!(address = %config.server.rest_address, member = %ctx.local_name, "serving REST API");

    axum::serve(listener, routes::router(Arc::clone(&ctx)))
        .with_graceful_shutdown(wait_for_signal())
        .await
        .context("REST server failed")?;

    info!("shutting down");
    let _ = shutdown_tx.send(true);
    // Give the background loops a moment to observe the signal.
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = membership.await;
        let _ = heartbeats.await;
    })
    .await;
    Ok(())
}

fn build_engine(config: &DaemonConfig) -> Result<PlacementEngine> {
    let mode = match config.scheduler.instance {
        clusterd_config::SchedulerMode::All => SchedulerMode::All,
        clusterd_config::SchedulerMode::Manual => SchedulerMode::Manual,
        clusterd_config::SchedulerMode::Group => SchedulerMode::Group,
    };
    let mut engine = PlacementEngine::new(mode);
    engine.script_limits = ExecutionLimits {
        timeout: Duration::from_secs(config.placement.scriptlet_timeout_secs),
        max_steps: config.placement.scriptlet_max_steps,
        ..ExecutionLimits::default()
    };
    if let Some(path) = &config.placement.scriptlet_path {
        let script = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read placement scriptlet {}", path.display()))?;
        engine = engine.with_script(script);
        info!(path = %path.display(), "placement scriptlet installed");
    }
    Ok(engine)
}

/// Serves the metrics text on the debug listener for an external
/// scraper. Never exposed on the public address.
async fn serve_debug(ctx: Arc<ServerContext>, address: String) {
    use axum::routing::get;
    let app = axum::Router::new().route(
        "/metrics",
        get(move || {
            let ctx = Arc::clone(&ctx);
            async move { ctx.metrics.render() }
        }),
    );
    match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => {
            info!(%address, "serving debug listener");
            if let Err(err) = axum::serve(listener, app).await {
                warn!(%err, "debug listener failed");
            }
        }
        Err(err) => warn!(%address, %err, "cannot bind debug listener"),
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
