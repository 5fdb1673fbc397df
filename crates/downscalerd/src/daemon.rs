//! Daemon assembly — resolves the group, wires the gateway and snapshot
//! sinks, and runs the reconciler until a fatal error or shutdown.
//!
//! Startup order:
//! 1. Read the instance identity document if the region or the instance id
//!    is needed
//! 2. Build the Auto Scaling client for that region
//! 3. Resolve the managed group (explicit name or autodetect)
//! 4. Open the state file and seed the peak, connect the ConfigMap sink
//! 5. Run the loop

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use downscaler_aws::{AsgGateway, InstanceIdentity};
use downscaler_core::{CapacityGateway, ConfigError, Reconciler};
use downscaler_state::{ConfigMapSink, FileStore};

use crate::cli::{GroupSource, Settings};

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    info!("ASG downscaler starting");

    // ── Identity and gateway ───────────────────────────────────

    let identity = if settings.needs_instance_identity() {
        Some(InstanceIdentity::fetch().await?)
    } else {
        None
    };

    let region = settings
        .region
        .clone()
        .or_else(|| identity.as_ref().map(|id| id.region.clone()))
        .context("no AWS region configured or discovered")?;
    let gateway = Arc::new(AsgGateway::for_region(region.clone()).await);
    info!(%region, "autoscaling client initialized");

    let group = match &settings.group {
        GroupSource::Named(name) => name.clone(),
        GroupSource::Autodetect => {
            let instance_id = identity
                .as_ref()
                .map(|id| id.instance_id.as_str())
                .context("autodetect requires the instance identity")?;
            gateway
                .resolve_group_for_member(instance_id)
                .await
                .context("cannot get ASG name")?
        }
    };
    if group.is_empty() {
        return Err(ConfigError::MissingGroupName.into());
    }
    info!(%group, "managing autoscaling group");

    // ── State ──────────────────────────────────────────────────

    let mut peak = settings.initial_capacity;
    let file_store = match &settings.state_file {
        Some(path) => {
            let store = FileStore::open(path)
                .with_context(|| format!("cannot open state file {}", path.display()))?;
            peak = store.seed_peak(&group, peak)?;
            info!(path = ?path, peak, "state file opened");
            Some(store)
        }
        None => None,
    };

    let mut reconciler = Reconciler::new(group, settings.schedule, gateway, peak);
    if let Some(store) = file_store {
        reconciler = reconciler.with_sink(Box::new(store));
    }
    if let Some(cm) = &settings.configmap {
        let sink = ConfigMapSink::connect(cm.name.clone(), cm.namespace.as_deref()).await?;
        info!(configmap = %sink.configmap_name(), "configmap state enabled");
        reconciler = reconciler.with_sink(Box::new(sink));
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    reconciler.run(settings.interval, shutdown_rx).await?;

    info!("ASG downscaler stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
