//! # Trigger Runtime
//!
//! Keeps every declared job's triggers running.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (file, then environment)
//! 2. Initialize telemetry
//! 3. Register the built-in trigger kinds (`timer`, `scm-poll`)
//! 4. Start the fire listener, the reload loop and the admin server
//!
//! ## Shutdown
//!
//! The shutdown signal stops the background tasks first, so no reload can
//! race the final `stop_all` that deactivates every managed trigger.

pub mod admin;
pub mod config;
pub mod definitions;
pub mod fires;
pub mod probe;
pub mod reload;

pub use config::{ConfigError, RuntimeConfig};
pub use definitions::{DefinitionError, JobsFile};
pub use probe::GitLsRemoteProbe;
pub use reload::{ReloadSummary, Reloader};

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use trigger_bus::InMemoryEventBus;
use trigger_reconciler::{
    register_builtin_kinds, DescriptorRegistry, InMemoryContainerStore, RegistryError,
    TriggerContainerManager, TriggerReconciliationApi,
};

/// Registry holding the built-in kinds, polling through `probe`.
pub fn build_registry(probe: Arc<GitLsRemoteProbe>) -> Result<DescriptorRegistry, RegistryError> {
    let mut builder = DescriptorRegistry::builder();
    register_builtin_kinds(&mut builder, probe)?;
    Ok(builder.build())
}

/// The runtime orchestrating reloads, fire accounting and the admin surface.
pub struct TriggerRuntime {
    config: RuntimeConfig,
    bus: Arc<InMemoryEventBus>,
    probe: Arc<GitLsRemoteProbe>,
    manager: Arc<TriggerContainerManager>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TriggerRuntime {
    /// Runtime with its own registry of the built-in kinds.
    pub fn new(config: RuntimeConfig) -> Result<Self, RegistryError> {
        let probe = Arc::new(GitLsRemoteProbe::new());
        let registry = Arc::new(build_registry(probe.clone())?);
        Ok(Self::with_registry(config, registry, probe))
    }

    /// Runtime over an existing registry. `probe` must be the one the
    /// registry's `scm-poll` kind was built with.
    pub fn with_registry(
        config: RuntimeConfig,
        registry: Arc<DescriptorRegistry>,
        probe: Arc<GitLsRemoteProbe>,
    ) -> Self {
        let bus = Arc::new(InMemoryEventBus::new());
        let manager = Arc::new(
            TriggerContainerManager::new(registry, Arc::new(InMemoryContainerStore::new()))
                .with_config(config.reconciler.clone())
                .with_publisher(bus.clone()),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            bus,
            probe,
            manager,
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<TriggerContainerManager> {
        &self.manager
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    /// Spawn the background tasks. The first reload runs immediately.
    pub fn start(&self) {
        info!(
            jobs_file = %self.config.runtime.jobs_file.display(),
            reload_interval_secs = self.config.runtime.reload_interval_secs,
            "Starting trigger runtime"
        );

        let mut tasks = self.tasks.lock();
        tasks.push(fires::spawn_fire_listener(&self.bus, self.shutdown_rx.clone()));

        let reloader = Reloader::new(
            self.manager.clone(),
            self.probe.clone(),
            self.config.runtime.jobs_file.clone(),
        );
        tasks.push(tokio::spawn(
            reloader.run(self.config.reload_interval(), self.shutdown_rx.clone()),
        ));

        if self.config.runtime.admin_port == 0 {
            info!("Admin server disabled");
        } else {
            let addr = SocketAddr::from(([0, 0, 0, 0], self.config.runtime.admin_port));
            let router = admin::router(self.manager.clone());
            let shutdown = self.shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = admin::serve(addr, router, shutdown).await {
                    error!(addr = %addr, error = %e, "Admin server failed");
                }
            }));
        }
    }

    /// Stop the background tasks, then every managed trigger.
    /// Returns how many triggers were stopped.
    pub async fn shutdown(&self) -> usize {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(true) {
            warn!("Failed to send shutdown signal: {}", e);
        }
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in futures::future::join_all(tasks).await {
            if let Err(e) = task {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        let stopped = match self.manager.stop_all().await {
            Ok(reports) => reports.iter().map(|r| r.stopped.len()).sum(),
            Err(e) => {
                error!(error = %e, "Failed to stop triggers");
                0
            }
        };
        info!(stopped, "Shutdown complete");
        stopped
    }
}
