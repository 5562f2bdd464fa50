//! Health check scheduler: a bounded worker pool over a due-queue.
//!
//! Each tick collects the running instances whose last check is older
//! than the interval and probes them with at most `workers` checks in
//! flight. A check that hangs is cut off by its own timeout and a check
//! that panics only loses its own result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use foldergrid_core::{HealthSettings, epoch_millis};
use foldergrid_orchestrator::{ContainerReport, OrchestrationManager, OrchestratorResult};
use foldergrid_registry::{ServiceInstance, ServiceStatus};

use crate::checker::{HealthTracker, ProbeResult, probe_instance};

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    /// Instances moved to `error`.
    pub failed: usize,
    /// Results dropped because the instance was busy or no longer running.
    pub skipped: usize,
    pub panicked: usize,
}

/// A streak belongs to one container start; a restart begins a new one.
struct Tracked {
    started_at: Option<u64>,
    tracker: HealthTracker,
}

pub struct HealthScheduler {
    manager: Arc<OrchestrationManager>,
    settings: HealthSettings,
    trackers: Mutex<HashMap<String, Tracked>>,
}

impl HealthScheduler {
    pub fn new(manager: Arc<OrchestrationManager>, settings: HealthSettings) -> Self {
        Self {
            manager,
            settings,
            trackers: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &HealthSettings {
        &self.settings
    }

    /// Running instances whose last check is at least one interval old.
    pub fn due(&self, now_ms: u64) -> OrchestratorResult<Vec<ServiceInstance>> {
        let interval_ms = self.settings.interval.as_millis() as u64;
        Ok(self
            .manager
            .store()
            .list_by_status(ServiceStatus::Running)?
            .into_iter()
            .filter(|i| i.workspace_id == self.manager.workspace_id())
            .filter(|i| {
                i.last_health_check_at
                    .is_none_or(|at| now_ms.saturating_sub(at) >= interval_ms)
            })
            .collect())
    }

    /// Probe every due instance once and apply the results.
    pub async fn sweep(&self) -> OrchestratorResult<SweepReport> {
        let due = self.due(epoch_millis())?;
        let mut report = SweepReport::default();
        if due.is_empty() {
            self.prune();
            return Ok(report);
        }

        let permits = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let timeout = self.settings.check_timeout;
        let mut checks = JoinSet::new();
        for instance in due {
            let permits = Arc::clone(&permits);
            let engine = self.manager.engine();
            checks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let outcome =
                    tokio::time::timeout(timeout, probe_instance(engine.as_ref(), &instance, timeout))
                        .await
                        .unwrap_or((ProbeResult::Unreachable, None));
                (instance, outcome)
            });
        }

        while let Some(joined) = checks.join_next().await {
            let (instance, (result, container)) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(error = %e, "health check task failed");
                    report.panicked += 1;
                    continue;
                }
            };
            report.checked += 1;
            match self.apply(&instance, result, container.as_ref()).await {
                Ok(Some(updated)) if updated.status == ServiceStatus::Error => report.failed += 1,
                Ok(Some(_)) => {}
                Ok(None) => report.skipped += 1,
                Err(e) => warn!(id = %instance.id, error = %e, "health result not applied"),
            }
        }

        self.prune();
        debug!(?report, "health sweep finished");
        Ok(report)
    }

    async fn apply(
        &self,
        instance: &ServiceInstance,
        result: ProbeResult,
        container: Option<&ContainerReport>,
    ) -> OrchestratorResult<Option<ServiceInstance>> {
        // Runs under the instance lock, so a dropped poll never counts.
        let decide = |current: &ServiceInstance| {
            let mut trackers = self.trackers();
            let tracked = trackers.entry(current.id.clone()).or_insert_with(|| Tracked {
                started_at: current.started_at,
                tracker: HealthTracker::for_instance(&self.settings, current),
            });
            if tracked.started_at != current.started_at {
                debug!(id = %current.id, "instance restarted; health streak reset");
                *tracked = Tracked {
                    started_at: current.started_at,
                    tracker: HealthTracker::for_instance(&self.settings, current),
                };
            }
            let verdict = tracked.tracker.record(result);
            debug!(id = %current.id, ?result, ?verdict, "health probe");
            verdict
        };
        self.manager
            .apply_probe(&instance.id, instance.started_at, decide, container)
            .await
    }

    /// Drop trackers of instances that are no longer running.
    fn prune(&self) {
        let running: Vec<String> = match self.manager.store().list_by_status(ServiceStatus::Running) {
            Ok(list) => list.into_iter().map(|i| i.id).collect(),
            Err(e) => {
                warn!(error = %e, "cannot list running instances; trackers kept");
                return;
            }
        };
        self.trackers().retain(|id, _| running.contains(id));
    }

    fn trackers(&self) -> std::sync::MutexGuard<'_, HashMap<String, Tracked>> {
        self.trackers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn tracked(&self) -> usize {
        self.trackers().len()
    }

    /// Sweep once per interval until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        // tokio intervals must be non-zero.
        let period = self.settings.interval.max(Duration::from_millis(100));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval = ?self.settings.interval,
            workers = self.settings.workers,
            "health scheduler started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "health sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("health scheduler stopped");
    }
}
