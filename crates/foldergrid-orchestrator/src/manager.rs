//! OrchestrationManager drives service instances through their lifecycle.
//!
//! Every lifecycle action follows the same shape:
//! - take the per-instance lock (a held lock is a `Conflict`)
//! - validate the request against the stored instance
//! - persist the state transition, then call the engine with a timeout
//! - persist the outcome and append a deployment event
//!
//! Engine failures never escape without landing on the instance: the row
//! moves to `error` with the engine's message and an event records what
//! failed, whether it timed out, and how long it took.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use foldergrid_analyzer::DependencyGraph;
use foldergrid_core::workspace::normalize_path;
use foldergrid_core::{
    DeploymentConfig, EnginePolicy, HealthStatus, ServiceType, TopologyDetection, epoch_millis,
};
use foldergrid_registry::{
    DeploymentEvent, EventLog, EventType, InstanceMetrics, RegistryStore, ServiceInstance,
    ServiceStatus,
};

use crate::engine::{ContainerEngine, ContainerReport, EngineError};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::locks::{InstanceGuard, InstanceLocks};
use crate::notify::LifecycleNotification;
use crate::retry::{RetryPolicy, bounded};
use crate::strategy::StrategyRegistry;

const NOTIFY_CAPACITY: usize = 256;

/// Point-in-time view of an instance's health and resource use.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub instance_id: String,
    pub status: ServiceStatus,
    pub health_status: HealthStatus,
    pub replicas: u32,
    pub metrics: Option<InstanceMetrics>,
    pub last_health_check_at: Option<u64>,
    /// `None` when the engine was not asked or could not answer.
    pub container_running: Option<bool>,
    pub engine_reachable: bool,
}

/// Outcome of a health poll, as decided by the health tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthVerdict {
    /// Record the status; the instance stays running.
    Observed(HealthStatus),
    /// Consecutive unhealthy polls reached the threshold.
    ThresholdReached { consecutive_failures: u32 },
    /// The engine no longer knows the container.
    Gone { reason: String },
}

pub struct OrchestrationManager {
    store: RegistryStore,
    events: EventLog,
    engine: Arc<dyn ContainerEngine>,
    strategies: StrategyRegistry,
    policy: EnginePolicy,
    retry: RetryPolicy,
    locks: InstanceLocks,
    notify: broadcast::Sender<LifecycleNotification>,
    workspace_root: PathBuf,
    workspace_id: String,
}

impl OrchestrationManager {
    pub fn new(
        store: RegistryStore,
        engine: Arc<dyn ContainerEngine>,
        workspace_root: impl Into<PathBuf>,
        workspace_id: impl Into<String>,
    ) -> Self {
        let policy = EnginePolicy::default();
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            events: EventLog::new(store.clone()),
            store,
            engine,
            strategies: StrategyRegistry::with_defaults(),
            retry: RetryPolicy::from(&policy),
            policy,
            locks: InstanceLocks::new(),
            notify,
            workspace_root: workspace_root.into(),
            workspace_id: workspace_id.into(),
        }
    }

    pub fn with_policy(mut self, policy: EnginePolicy) -> Self {
        self.retry = RetryPolicy::from(&policy);
        self.policy = policy;
        self
    }

    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    pub fn engine(&self) -> Arc<dyn ContainerEngine> {
        Arc::clone(&self.engine)
    }

    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleNotification> {
        self.notify.subscribe()
    }

    pub fn is_locked(&self, id: &str) -> bool {
        self.locks.is_locked(id)
    }

    // ── CRUD ───────────────────────────────────────────────────────

    /// Register the analyzed folder as a new instance.
    ///
    /// The instance starts in `detecting` and is promoted to `deployable`
    /// when the folder's current detection is of a known type.
    pub fn register(
        &self,
        folder_path: &str,
        parent_id: Option<&str>,
    ) -> OrchestratorResult<ServiceInstance> {
        let folder = normalize_path(folder_path)
            .map_err(|e| OrchestratorError::Validation(e.to_string()))?;
        let detection = self.store.get_detection(&folder)?.ok_or_else(|| {
            OrchestratorError::Validation(format!("folder '{folder}' has not been analyzed"))
        })?;
        if let Some(parent) = parent_id {
            self.store.require_instance(parent)?;
        }

        let name = match folder.rsplit('/').next() {
            Some(last) if !last.is_empty() => last.to_string(),
            _ => self.workspace_id.clone(),
        };
        let mut instance =
            ServiceInstance::new(&self.workspace_id, name, &folder, detection.service_type);
        instance.parent_service_id = parent_id.map(str::to_string);
        instance.deployment_config = detection.recommended_config.clone();
        self.store.create_instance(&instance)?;
        info!(id = %instance.id, folder = %folder, service_type = %instance.service_type, "instance registered");

        if detection.is_deployable() {
            return self.move_to(&instance.id, ServiceStatus::Deployable, |_| {});
        }
        Ok(instance)
    }

    pub fn get(&self, id: &str) -> OrchestratorResult<ServiceInstance> {
        Ok(self.store.require_instance(id)?)
    }

    /// Instances of this workspace, removed ones included.
    pub fn list(&self) -> OrchestratorResult<Vec<ServiceInstance>> {
        Ok(self
            .store
            .list_instances()?
            .into_iter()
            .filter(|i| i.workspace_id == self.workspace_id)
            .collect())
    }

    /// Replace the deployment config. Takes effect on the next deploy.
    pub fn update_config(
        &self,
        id: &str,
        config: DeploymentConfig,
    ) -> OrchestratorResult<ServiceInstance> {
        config.validate()?;
        let _guard = self.lock(id)?;
        let instance = self.store.require_instance(id)?;
        if instance.status.is_terminal() {
            return Err(OrchestratorError::Validation(format!(
                "instance {id} has been removed"
            )));
        }
        let updated = self.store.update_instance(id, |inst| {
            inst.deployment_config = Some(config);
            Ok(())
        })?;
        debug!(%id, "deployment config replaced");
        Ok(updated)
    }

    /// Take a fresh detection into account.
    ///
    /// Instances not yet deployed adopt the new classification and config;
    /// a `detecting` instance is promoted once the folder is classifiable.
    /// A `deployable` instance ignores a detection it could not deploy.
    pub fn apply_detection(
        &self,
        id: &str,
        detection: &TopologyDetection,
    ) -> OrchestratorResult<ServiceInstance> {
        let _guard = self.lock(id)?;
        let instance = self.store.require_instance(id)?;
        let adopt = |inst: &mut ServiceInstance| {
            inst.service_type = detection.service_type;
            if detection.recommended_config.is_some() {
                inst.deployment_config = detection.recommended_config.clone();
            }
        };
        match instance.status {
            ServiceStatus::Detecting if detection.is_deployable() => {
                self.move_to(id, ServiceStatus::Deployable, adopt)
            }
            ServiceStatus::Deployable if !detection.is_deployable() => {
                warn!(
                    %id,
                    folder = %instance.folder_path,
                    detected = %detection.service_type,
                    "folder no longer classifiable; keeping previous classification"
                );
                Ok(instance)
            }
            ServiceStatus::Detecting | ServiceStatus::Deployable => {
                Ok(self.store.update_instance(id, |inst| {
                    adopt(inst);
                    Ok(())
                })?)
            }
            _ => Ok(instance),
        }
    }

    // ── Actions ────────────────────────────────────────────────────

    /// Build and run an instance: `deployable|error → deploying → running`.
    pub async fn deploy(&self, id: &str) -> OrchestratorResult<ServiceInstance> {
        let _guard = self.lock(id)?;
        self.deploy_locked(id).await
    }

    async fn deploy_locked(&self, id: &str) -> OrchestratorResult<ServiceInstance> {
        let instance = self.store.require_instance(id)?;
        if instance.service_type == ServiceType::Composite {
            return Err(OrchestratorError::Validation(format!(
                "{} is a composite; deploy its group instead",
                instance.name
            )));
        }
        let config = instance.deployment_config.clone().ok_or_else(|| {
            OrchestratorError::Validation(format!("instance {id} has no deployment config"))
        })?;
        config.validate()?;
        let plan = self
            .strategies
            .get(instance.service_type)?
            .plan(&instance, &config)?;

        self.move_to(id, ServiceStatus::Deploying, |_| {})?;
        self.record(
            DeploymentEvent::new(id, EventType::DeploymentStarted).with_payload(json!({
                "strategy": plan.strategy,
                "image": plan.build.tag,
                "low_confidence": config.low_confidence,
            })),
        )?;
        let started = Instant::now();

        let build = plan.build_request(&self.workspace_root);
        let image = match self
            .call("build", self.policy.build_timeout, || self.engine.build(&build))
            .await
        {
            Ok(image) => image,
            Err(e) => {
                let payload = json!({ "stage": "build" });
                return Err(self
                    .fail(id, EventType::DeploymentFailed, e, payload, None, started)
                    .await);
            }
        };

        let run = plan.run_request(&image);
        let reference = match self
            .call("run", self.policy.run_timeout, || self.engine.run(&run))
            .await
        {
            Ok(reference) => reference,
            Err(e) => {
                let payload = json!({ "stage": "run", "image": image });
                return Err(self
                    .fail(id, EventType::DeploymentFailed, e, payload, None, started)
                    .await);
            }
        };

        let mut replicas = 1;
        if plan.run.replicas > 1 {
            match self
                .call("scale", self.policy.scale_timeout, || {
                    self.engine.scale(&reference, plan.run.replicas)
                })
                .await
            {
                Ok(achieved) => replicas = achieved,
                Err(e) => {
                    let payload = json!({ "stage": "scale", "replicas": plan.run.replicas });
                    return Err(self
                        .fail(id, EventType::DeploymentFailed, e, payload, Some(&reference), started)
                        .await);
                }
            }
        }

        let elapsed = elapsed_ms(started);
        let now = epoch_millis();
        let running = self.move_to(id, ServiceStatus::Running, |inst| {
            inst.container_reference = Some(reference.clone());
            inst.deployed_at = Some(now);
            inst.started_at = Some(next_start(inst.started_at, now));
            inst.startup_time_ms = Some(elapsed);
            inst.replicas = replicas;
        })?;
        self.record(
            DeploymentEvent::new(id, EventType::DeploymentCompleted)
                .with_payload(json!({
                    "container_reference": reference,
                    "image": image,
                    "replicas": replicas,
                }))
                .with_duration_ms(elapsed),
        )?;
        info!(%id, %reference, elapsed_ms = elapsed, "deployment completed");
        Ok(running)
    }

    /// Restart a stopped instance's container.
    pub async fn start(&self, id: &str) -> OrchestratorResult<ServiceInstance> {
        let _guard = self.lock(id)?;
        self.start_locked(id).await
    }

    async fn start_locked(&self, id: &str) -> OrchestratorResult<ServiceInstance> {
        let instance = self.store.require_instance(id)?;
        match instance.status {
            ServiceStatus::Running => return Ok(instance),
            ServiceStatus::Stopped => {}
            from => {
                return Err(OrchestratorError::InvalidTransition {
                    from,
                    to: ServiceStatus::Running,
                });
            }
        }
        let reference = container_of(&instance)?;
        let started = Instant::now();

        if let Err(e) = self
            .call("start", self.policy.run_timeout, || self.engine.start(&reference))
            .await
        {
            return Err(self
                .fail(id, EventType::ServiceStarted, e, json!({}), Some(&reference), started)
                .await);
        }

        let now = epoch_millis();
        let running = self.move_to(id, ServiceStatus::Running, |inst| {
            inst.started_at = Some(next_start(inst.started_at, now));
        })?;
        self.record(
            DeploymentEvent::new(id, EventType::ServiceStarted)
                .with_payload(json!({ "container_reference": reference }))
                .with_duration_ms(elapsed_ms(started)),
        )?;
        info!(%id, "instance started");
        Ok(running)
    }

    /// Stop a running instance. Stopping a stopped instance is a no-op.
    ///
    /// The container gets `stop_grace` to exit before it is killed.
    pub async fn stop(&self, id: &str) -> OrchestratorResult<ServiceInstance> {
        let _guard = self.lock(id)?;
        let instance = self.store.require_instance(id)?;
        match instance.status {
            ServiceStatus::Stopped => {
                debug!(%id, "already stopped");
                return Ok(instance);
            }
            ServiceStatus::Running => {}
            from => {
                return Err(OrchestratorError::InvalidTransition {
                    from,
                    to: ServiceStatus::Stopped,
                });
            }
        }
        let reference = container_of(&instance)?;
        let started = Instant::now();
        let grace = self.policy.stop_grace;

        let mut forced = false;
        let stopped = self
            .call("stop", grace + self.policy.inspect_timeout, || {
                self.engine.stop(&reference, grace)
            })
            .await;
        if let Err(e) = stopped {
            if matches!(e, EngineError::Gone(_)) {
                return Err(self
                    .fail(id, EventType::ServiceStopped, e, json!({}), None, started)
                    .await);
            }
            warn!(%id, error = %e, "graceful stop failed; killing");
            forced = true;
            if let Err(e) = self
                .call("kill", self.policy.inspect_timeout, || self.engine.kill(&reference))
                .await
            {
                let payload = json!({ "forced": true });
                return Err(self
                    .fail(id, EventType::ServiceStopped, e, payload, None, started)
                    .await);
            }
        }

        let stopped = self.move_to(id, ServiceStatus::Stopped, |_| {})?;
        self.record(
            DeploymentEvent::new(id, EventType::ServiceStopped)
                .with_payload(json!({
                    "container_reference": reference,
                    "forced": forced,
                    "grace_secs": grace.as_secs(),
                }))
                .with_duration_ms(elapsed_ms(started)),
        )?;
        info!(%id, forced, "instance stopped");
        Ok(stopped)
    }

    /// Change the replica count of a running instance.
    ///
    /// Scaling to the current count is a no-op. A partial scale leaves the
    /// instance in `error` and is reported as an engine failure.
    pub async fn scale(&self, id: &str, replicas: u32) -> OrchestratorResult<ServiceInstance> {
        let _guard = self.lock(id)?;
        let instance = self.store.require_instance(id)?;
        if instance.status != ServiceStatus::Running {
            return Err(OrchestratorError::InvalidTransition {
                from: instance.status,
                to: ServiceStatus::Scaling,
            });
        }
        let config = instance.deployment_config.as_ref().ok_or_else(|| {
            OrchestratorError::Validation(format!("instance {id} has no deployment config"))
        })?;
        let bounds = &config.scaling;
        if replicas < bounds.min_replicas || replicas > bounds.max_replicas {
            return Err(OrchestratorError::Validation(format!(
                "replicas {replicas} outside [{}, {}]",
                bounds.min_replicas, bounds.max_replicas
            )));
        }
        if replicas == instance.replicas {
            debug!(%id, replicas, "already at requested scale");
            return Ok(instance);
        }
        let reference = container_of(&instance)?;
        let from = instance.replicas;
        let started = Instant::now();

        self.move_to(id, ServiceStatus::Scaling, |_| {})?;
        let achieved = match self
            .call("scale", self.policy.scale_timeout, || {
                self.engine.scale(&reference, replicas)
            })
            .await
        {
            Ok(achieved) => achieved,
            Err(e) => {
                let payload = json!({ "from": from, "requested": replicas });
                return Err(self
                    .fail(id, EventType::ServiceScaled, e, payload, Some(&reference), started)
                    .await);
            }
        };

        if achieved != replicas {
            let err = EngineError::Failed(format!(
                "scaled to {achieved} of {replicas} requested replicas"
            ));
            let payload = json!({
                "from": from,
                "requested": replicas,
                "achieved": achieved,
                "partial": true,
            });
            return Err(self
                .fail(id, EventType::ServiceScaled, err, payload, Some(&reference), started)
                .await);
        }

        let scaled = self.move_to(id, ServiceStatus::Running, |inst| {
            inst.replicas = achieved;
            if let Some(config) = inst.deployment_config.as_mut() {
                config.scaling.replicas = achieved;
            }
        })?;
        self.record(
            DeploymentEvent::new(id, EventType::ServiceScaled)
                .with_payload(json!({ "from": from, "to": achieved }))
                .with_duration_ms(elapsed_ms(started)),
        )?;
        info!(%id, from, to = achieved, "instance scaled");
        Ok(scaled)
    }

    /// Current health and metrics, refreshed from the engine when it answers.
    pub async fn status(&self, id: &str) -> OrchestratorResult<HealthSnapshot> {
        let instance = self.store.require_instance(id)?;
        let mut container_running = None;
        let mut engine_reachable = true;

        if let (ServiceStatus::Running, Some(reference)) =
            (instance.status, instance.container_reference.as_deref())
        {
            match bounded(self.policy.inspect_timeout, self.engine.inspect(reference)).await {
                Ok(report) => container_running = Some(report.running),
                Err(EngineError::Gone(_)) => container_running = Some(false),
                Err(e) => {
                    debug!(%id, error = %e, "engine did not answer status inspect");
                    engine_reachable = false;
                }
            }
        }

        let now = epoch_millis();
        let instance = self.store.update_instance(id, |inst| {
            inst.last_accessed_at = Some(now);
            Ok(())
        })?;
        Ok(HealthSnapshot {
            instance_id: instance.id,
            status: instance.status,
            health_status: instance.health_status,
            replicas: instance.replicas,
            metrics: instance.metrics,
            last_health_check_at: instance.last_health_check_at,
            container_running,
            engine_reachable,
        })
    }

    /// Delete an instance: tear down its container and release its folder.
    pub async fn remove(&self, id: &str) -> OrchestratorResult<ServiceInstance> {
        let _guard = self.lock(id)?;
        let instance = self.store.require_instance(id)?;
        if instance.status.is_terminal() {
            return Err(OrchestratorError::InvalidTransition {
                from: instance.status,
                to: ServiceStatus::Removed,
            });
        }

        if let Some(reference) = instance.container_reference.as_deref() {
            self.teardown(id, reference).await;
        }

        let removed = self.move_to(id, ServiceStatus::Removed, |_| {})?;
        self.record(
            DeploymentEvent::new(id, EventType::ServiceRemoved).with_payload(json!({
                "container_reference": instance.container_reference,
                "folder_path": instance.folder_path,
            })),
        )?;
        info!(%id, "instance removed");
        Ok(removed)
    }

    /// Deploy a composite's children, dependencies first.
    ///
    /// Children already running are left alone and stopped ones are
    /// restarted. The first failure halts the group; children deployed
    /// before it keep running.
    pub async fn deploy_group(&self, parent_id: &str) -> OrchestratorResult<Vec<ServiceInstance>> {
        let parent = self.store.require_instance(parent_id)?;
        if parent.service_type != ServiceType::Composite {
            return Err(OrchestratorError::Validation(format!(
                "{} is not a composite",
                parent.name
            )));
        }
        let detection = self.store.get_detection(&parent.folder_path)?.ok_or_else(|| {
            OrchestratorError::Validation(format!(
                "folder '{}' has no current detection",
                parent.folder_path
            ))
        })?;
        let order = DependencyGraph::from_map(&detection.dependency_map).topological_order()?;

        let children: BTreeMap<String, ServiceInstance> = self
            .store
            .list_children(parent_id)?
            .into_iter()
            .map(|c| (c.folder_path.clone(), c))
            .collect();
        let mut queue = Vec::new();
        for folder in order.iter().filter(|f| **f != parent.folder_path) {
            let child = children.get(folder).ok_or_else(|| {
                OrchestratorError::Validation(format!("child folder '{folder}' is not registered"))
            })?;
            queue.push(child.id.clone());
        }
        info!(parent = %parent_id, children = queue.len(), "deploying group");

        let mut deployed = Vec::with_capacity(queue.len());
        for child_id in queue {
            let _guard = self.lock(&child_id)?;
            let child = self.store.require_instance(&child_id)?;
            let result = match child.status {
                ServiceStatus::Running => Ok(child),
                ServiceStatus::Stopped => self.start_locked(&child_id).await,
                _ => self.deploy_locked(&child_id).await,
            };
            match result {
                Ok(instance) => deployed.push(instance),
                Err(e) => {
                    warn!(parent = %parent_id, child = %child_id, error = %e, "group deploy halted");
                    return Err(e);
                }
            }
        }
        Ok(deployed)
    }

    /// Apply a health poll outcome to a running instance.
    ///
    /// Returns `None` when the instance is locked by another operation or
    /// is no longer running; the poll is dropped for this round.
    pub async fn apply_health(
        &self,
        id: &str,
        verdict: HealthVerdict,
        report: Option<&ContainerReport>,
    ) -> OrchestratorResult<Option<ServiceInstance>> {
        self.settle_health(id, None, |_| verdict, report).await
    }

    /// Apply a probe taken against the start identified by `probed_start`
    /// (the instance's `started_at` when it was probed).
    ///
    /// `decide` turns the probe into a verdict and runs under the instance
    /// lock, only when the result will be applied. A busy instance, one
    /// that is no longer running, or one restarted since the probe yields
    /// `None` without calling it.
    pub async fn apply_probe<F>(
        &self,
        id: &str,
        probed_start: Option<u64>,
        decide: F,
        report: Option<&ContainerReport>,
    ) -> OrchestratorResult<Option<ServiceInstance>>
    where
        F: FnOnce(&ServiceInstance) -> HealthVerdict,
    {
        self.settle_health(id, Some(probed_start), decide, report).await
    }

    async fn settle_health<F>(
        &self,
        id: &str,
        probed_start: Option<Option<u64>>,
        decide: F,
        report: Option<&ContainerReport>,
    ) -> OrchestratorResult<Option<ServiceInstance>>
    where
        F: FnOnce(&ServiceInstance) -> HealthVerdict,
    {
        let Some(_guard) = self.locks.try_acquire(id) else {
            debug!(%id, "instance busy; health result skipped");
            return Ok(None);
        };
        let instance = self.store.require_instance(id)?;
        if instance.status != ServiceStatus::Running {
            return Ok(None);
        }
        if probed_start.is_some_and(|start| start != instance.started_at) {
            debug!(%id, "instance restarted since the probe; result dropped");
            return Ok(None);
        }
        let verdict = decide(&instance);
        let now = epoch_millis();
        let metrics = report.and_then(|r| sample_metrics(r, &instance, now));

        match verdict {
            HealthVerdict::Observed(health) => {
                let updated = self.store.update_instance(id, |inst| {
                    inst.health_status = health;
                    inst.last_health_check_at = Some(now);
                    if metrics.is_some() {
                        inst.metrics = metrics;
                    }
                    Ok(())
                })?;
                Ok(Some(updated))
            }
            HealthVerdict::ThresholdReached {
                consecutive_failures,
            } => {
                let message =
                    format!("health check failed {consecutive_failures} consecutive times");
                let reference = instance.container_reference.clone();
                let failed = self.move_to(id, ServiceStatus::Error, |inst| {
                    inst.health_status = HealthStatus::Unhealthy;
                    inst.last_health_check_at = Some(now);
                    inst.error_message = Some(message.clone());
                })?;
                self.record(
                    DeploymentEvent::new(id, EventType::HealthCheckFailed)
                        .with_payload(json!({
                            "consecutive_failures": consecutive_failures,
                            "container_reference": reference,
                        }))
                        .with_error(&message),
                )?;
                if let Some(reference) = reference.as_deref() {
                    self.teardown(id, reference).await;
                }
                warn!(%id, consecutive_failures, "instance failed health checks");
                Ok(Some(failed))
            }
            HealthVerdict::Gone { reason } => {
                let failed = self.move_to(id, ServiceStatus::Error, |inst| {
                    inst.last_health_check_at = Some(now);
                    inst.error_message = Some(reason.clone());
                })?;
                self.record(
                    DeploymentEvent::new(id, EventType::HealthCheckFailed)
                        .with_payload(json!({
                            "gone": true,
                            "container_reference": instance.container_reference,
                        }))
                        .with_error(&reason),
                )?;
                warn!(%id, %reason, "container gone");
                Ok(Some(failed))
            }
        }
    }

    // ── Reads ──────────────────────────────────────────────────────

    pub fn events(&self, id: &str, limit: usize) -> OrchestratorResult<Vec<DeploymentEvent>> {
        Ok(self.events.for_instance(id, limit)?)
    }

    pub fn recent_events(&self, limit: usize) -> OrchestratorResult<Vec<DeploymentEvent>> {
        Ok(self.events.recent(limit)?)
    }

    // ── Internals ──────────────────────────────────────────────────

    fn lock(&self, id: &str) -> OrchestratorResult<InstanceGuard> {
        self.locks.try_acquire(id).ok_or_else(|| {
            OrchestratorError::Conflict(format!("instance {id} has an operation in flight"))
        })
    }

    /// Engine call with the per-call timeout and the retry policy.
    async fn call<T, F, Fut>(
        &self,
        what: &str,
        limit: std::time::Duration,
        mut op: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, EngineError>>,
    {
        self.retry.run(what, || bounded(limit, op())).await
    }

    fn move_to<F>(&self, id: &str, to: ServiceStatus, mutate: F) -> OrchestratorResult<ServiceInstance>
    where
        F: FnOnce(&mut ServiceInstance),
    {
        let change = self.store.transition(id, to, mutate)?;
        info!(%id, from = %change.from, to = %change.instance.status, "status changed");
        let _ = self.notify.send(LifecycleNotification::status_changed(&change));
        Ok(change.instance)
    }

    fn record(&self, event: DeploymentEvent) -> OrchestratorResult<DeploymentEvent> {
        let stored = self.events.append(event)?;
        let _ = self.notify.send(LifecycleNotification::event_recorded(&stored));
        Ok(stored)
    }

    /// Land an engine failure on the instance and the event log.
    ///
    /// Returns the error to surface to the caller. A container the failed
    /// operation left behind is killed best-effort.
    async fn fail(
        &self,
        id: &str,
        event_type: EventType,
        error: EngineError,
        mut payload: serde_json::Value,
        container: Option<&str>,
        started: Instant,
    ) -> OrchestratorError {
        let message = error.to_string();
        let timed_out = error.is_timeout();
        warn!(%id, event = %event_type, timed_out, error = %message, "engine operation failed");

        if let Some(map) = payload.as_object_mut() {
            if let Some(reference) = container {
                map.insert("container_reference".to_string(), json!(reference));
            }
        }
        if let Err(e) = self.move_to(id, ServiceStatus::Error, |inst| {
            inst.error_message = Some(message.clone());
        }) {
            warn!(%id, error = %e, "could not record error state");
        }
        let event = DeploymentEvent::new(id, event_type)
            .with_payload(payload)
            .with_error(&message)
            .timed_out(timed_out)
            .with_duration_ms(elapsed_ms(started));
        if let Err(e) = self.record(event) {
            warn!(%id, error = %e, "could not record failure event");
        }

        if let Some(reference) = container {
            if !matches!(error, EngineError::Gone(_)) {
                self.teardown(id, reference).await;
            }
        }
        OrchestratorError::Engine(error)
    }

    /// Stop, kill if the stop fails, then delete the container so its
    /// name is free for the next deploy. Failures are logged, not returned.
    async fn teardown(&self, id: &str, reference: &str) {
        let grace = self.policy.stop_grace;
        let stopped = bounded(grace + self.policy.inspect_timeout, self.engine.stop(reference, grace)).await;
        match stopped {
            Ok(()) | Err(EngineError::Gone(_)) => {}
            Err(e) => {
                debug!(%id, error = %e, "teardown stop failed; killing");
                if let Err(e) = bounded(self.policy.inspect_timeout, self.engine.kill(reference)).await {
                    debug!(%id, error = %e, "teardown kill failed");
                }
            }
        }
        match bounded(self.policy.inspect_timeout, self.engine.remove(reference)).await {
            Ok(()) | Err(EngineError::Gone(_)) => {}
            Err(e) => warn!(%id, %reference, error = %e, "container may be orphaned"),
        }
    }
}

fn container_of(instance: &ServiceInstance) -> OrchestratorResult<String> {
    instance.container_reference.clone().ok_or_else(|| {
        OrchestratorError::Validation(format!("instance {} has no container", instance.id))
    })
}

/// Every start gets its own `started_at`, even within one millisecond.
/// Health streaks are keyed on it.
fn next_start(previous: Option<u64>, now: u64) -> u64 {
    previous.map_or(now, |prev| now.max(prev + 1))
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn sample_metrics(report: &ContainerReport, instance: &ServiceInstance, now: u64) -> Option<InstanceMetrics> {
    let memory_mb = report.memory_mb?;
    let uptime_secs = instance
        .started_at
        .map(|at| now.saturating_sub(at) / 1000)
        .unwrap_or_default();
    Some(InstanceMetrics {
        memory_mb,
        cpu_percent: report.cpu_percent.unwrap_or_default(),
        uptime_secs,
    })
}
