//! `trigger-runtime [CONFIG]`
//!
//! Runs until Ctrl+C, then stops every managed trigger.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use trigger_reconciler::install_global;
use trigger_runtime::{build_registry, GitLsRemoteProbe, RuntimeConfig, TriggerRuntime};
use trigger_telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config =
        RuntimeConfig::load(config_path.as_deref()).context("loading runtime configuration")?;

    let telemetry_config = TelemetryConfig::from_env().with_service_name("trigger-runtime");
    let _telemetry = init_telemetry(telemetry_config).context("initializing telemetry")?;

    let probe = Arc::new(GitLsRemoteProbe::new());
    let registry =
        install_global(build_registry(probe.clone())?).context("installing trigger registry")?;

    let runtime = TriggerRuntime::with_registry(config, registry, probe);
    runtime.start();

    info!("Trigger runtime is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    Ok(())
}
