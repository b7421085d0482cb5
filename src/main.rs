use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use fleet_inspector::management::ClusterSource;
use fleet_inspector::report::render::summary_table;
use fleet_inspector::server::{self, AppState};
use fleet_inspector::{
    load_config, InspectionMetrics, InspectionPipeline, LatestReport, ObservabilityProbe, ProbeSettings, RancherClient,
    RancherDiscovery, ResourceLimitTable, Scheduler,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cfg = load_config()?;
    info!(
        "clusters = {:?}, interval = {}s",
        cfg.clusters.keys().collect::<Vec<_>>(),
        cfg.interval.as_secs()
    );

    let limits = Arc::new(ResourceLimitTable::load(&cfg.limits_path)?);
    let client = Arc::new(RancherClient::new(&cfg)?);
    let discovery: Arc<dyn ClusterSource> = Arc::new(RancherDiscovery::new(Arc::clone(&client), cfg.clusters.clone()));
    let probe = Arc::new(ObservabilityProbe::new(ProbeSettings::from_config(&cfg))?);
    let pipeline = InspectionPipeline::new(client, probe, limits, cfg.cluster_concurrency);

    // Fail fast when the management plane cannot be reached at startup
    let clusters = discovery
        .discover()
        .await
        .with_context(|| format!("Connection to {} failed", cfg.management_url))?;
    info!("Inspecting {} clusters", clusters.len());

    if cfg.run_once {
        info!("Run-once mode, not starting the status server");
        let report = pipeline.run_inspection(&clusters).await;
        info!("\n{}", summary_table(&report));
        return Ok(());
    }

    let latest = LatestReport::new();
    let metrics = InspectionMetrics::new()?;
    let state = Arc::new(AppState {
        latest: latest.clone(),
        metrics: metrics.clone(),
        environment: cfg.environment_name.clone(),
    });
    let scheduler = Scheduler::new(discovery, pipeline, latest, metrics, cfg.interval);

    tokio::select! {
        result = server::serve(&cfg.listen_addr, state) => {
            if let Err(e) = &result {
                error!("{:#}", e);
            }
            result
        }
        _ = scheduler.run_forever(clusters) => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
            Ok(())
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}
