//! # Definition Reloads
//!
//! Every tick re-reads the job definitions file and reconciles every job
//! against it. Jobs that disappeared from the file are reconciled with an
//! empty list, which stops their managed triggers and removes the container
//! unless externals remain.
//!
//! A malformed file is logged and skipped; the running triggers stay as they
//! were. A lost commit race is retried on the next tick.

use crate::definitions::{DefinitionError, JobsFile};
use crate::probe::GitLsRemoteProbe;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use trigger_reconciler::{
    JobId, ReconcileError, TriggerContainerManager, TriggerReconciliationApi, TriggerSpec,
};
use trigger_telemetry::{time_histogram, JOBS_CONFIGURED, RELOADS, RELOAD_DURATION};

/// Outcome of one reload.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Jobs declared in the file
    pub declared: usize,
    /// Jobs reconciled with an empty list because they left the file
    pub retired: usize,
    pub started: usize,
    pub stopped: usize,
    /// Activation and deactivation failures across all jobs
    pub failures: usize,
    /// Jobs whose commit lost a race; retried next tick
    pub conflicts: Vec<JobId>,
    /// Jobs whose pass failed outright (unknown kind, store error)
    pub errors: Vec<JobId>,
}

pub struct Reloader {
    manager: Arc<TriggerContainerManager>,
    probe: Arc<GitLsRemoteProbe>,
    jobs_file: PathBuf,
}

impl Reloader {
    pub fn new(
        manager: Arc<TriggerContainerManager>,
        probe: Arc<GitLsRemoteProbe>,
        jobs_file: PathBuf,
    ) -> Self {
        Self {
            manager,
            probe,
            jobs_file,
        }
    }

    /// Read the definitions file and reconcile every known job once.
    pub async fn reload_once(&self) -> Result<ReloadSummary, DefinitionError> {
        let file = match JobsFile::load(&self.jobs_file) {
            Ok(file) => file,
            Err(e) => {
                RELOADS.with_label_values(&["invalid"]).inc();
                return Err(e);
            }
        };

        self.probe.set_sources(
            file.jobs
                .iter()
                .filter_map(|job| job.source().map(|source| (job.id(), source)))
                .collect::<HashMap<_, _>>(),
        );
        JOBS_CONFIGURED.set(file.jobs.len() as i64);

        let mut desired: Vec<(JobId, Vec<TriggerSpec>)> =
            file.jobs.iter().map(|job| (job.id(), job.desired())).collect();
        let declared: HashSet<JobId> = desired.iter().map(|(job, _)| job.clone()).collect();

        let mut summary = ReloadSummary {
            declared: declared.len(),
            ..ReloadSummary::default()
        };

        match self.manager.jobs() {
            Ok(known) => {
                for job in known.into_iter().filter(|job| !declared.contains(job)) {
                    debug!(job = %job, "Job no longer declared");
                    summary.retired += 1;
                    desired.push((job, Vec::new()));
                }
            }
            Err(e) => warn!(
                error = %e,
                "Could not list committed jobs; retired jobs are skipped this tick"
            ),
        }

        let _timer = time_histogram!(RELOAD_DURATION);
        let passes = desired.into_iter().map(|(job, specs)| {
            let manager = Arc::clone(&self.manager);
            async move {
                let result = manager.reconcile(&job, specs).await;
                (job, result)
            }
        });

        for (job, result) in join_all(passes).await {
            match result {
                Ok(report) => {
                    summary.started += report.started.len();
                    summary.stopped += report.stopped.len();
                    summary.failures +=
                        report.activation_failures.len() + report.deactivation_failures.len();
                }
                Err(ReconcileError::ConcurrentReconciliationConflict {
                    expected, actual, ..
                }) => {
                    warn!(job = %job, expected, actual, "Lost commit race; will retry next reload");
                    summary.conflicts.push(job);
                }
                Err(e) => {
                    error!(job = %job, error = %e, "Reconciliation failed");
                    summary.errors.push(job);
                }
            }
        }

        let outcome = if !summary.conflicts.is_empty() {
            "conflict"
        } else if !summary.errors.is_empty() {
            "error"
        } else {
            "ok"
        };
        RELOADS.with_label_values(&[outcome]).inc();

        info!(
            declared = summary.declared,
            retired = summary.retired,
            started = summary.started,
            stopped = summary.stopped,
            failures = summary.failures,
            conflicts = summary.conflicts.len(),
            errors = summary.errors.len(),
            "Reload complete"
        );
        Ok(summary)
    }

    /// Reload immediately, then every `interval`, until `shutdown` flips.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reload_once().await {
                        error!(
                            file = %self.jobs_file.display(),
                            error = %e,
                            "Job definitions rejected; keeping current triggers"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    info!("Reload loop shutting down");
                    break;
                }
            }
        }
    }
}
