//! Domain types for the Foldergrid registry.
//!
//! All types serialize to JSON for storage in redb tables.

use std::fmt;

use serde::{Deserialize, Serialize};

use foldergrid_core::{DeploymentConfig, HealthStatus, ServiceType, epoch_millis};

/// UUID v4 string.
pub type InstanceId = String;

// ── Service instances ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Detecting,
    Deployable,
    Deploying,
    Running,
    Stopped,
    Scaling,
    Error,
    Removed,
}

impl ServiceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ServiceStatus::Detecting => "detecting",
            ServiceStatus::Deployable => "deployable",
            ServiceStatus::Deploying => "deploying",
            ServiceStatus::Running => "running",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Scaling => "scaling",
            ServiceStatus::Error => "error",
            ServiceStatus::Removed => "removed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == ServiceStatus::Removed
    }

    /// States in which an engine container may exist.
    pub fn holds_container(&self) -> bool {
        matches!(
            self,
            ServiceStatus::Deploying
                | ServiceStatus::Running
                | ServiceStatus::Stopped
                | ServiceStatus::Scaling
        )
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Resource usage sampled from the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceMetrics {
    pub memory_mb: u64,
    pub cpu_percent: f64,
    pub uptime_secs: u64,
}

/// A tracked deployable unit for one folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: InstanceId,
    pub workspace_id: String,
    pub name: String,
    /// Workspace-relative; unique per workspace among non-removed instances.
    pub folder_path: String,
    pub service_type: ServiceType,
    pub status: ServiceStatus,
    /// Opaque engine id; only set while `status.holds_container()`.
    pub container_reference: Option<String>,
    pub deployment_config: Option<DeploymentConfig>,
    /// Meaningful only while running.
    pub health_status: HealthStatus,
    pub parent_service_id: Option<InstanceId>,
    /// Engine error text, verbatim.
    pub error_message: Option<String>,
    pub metrics: Option<InstanceMetrics>,
    pub replicas: u32,
    pub startup_time_ms: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
    pub deployed_at: Option<u64>,
    pub started_at: Option<u64>,
    pub last_health_check_at: Option<u64>,
    pub last_accessed_at: Option<u64>,
}

impl ServiceInstance {
    /// A fresh instance in `detecting` with a new id.
    pub fn new(
        workspace_id: impl Into<String>,
        name: impl Into<String>,
        folder_path: impl Into<String>,
        service_type: ServiceType,
    ) -> Self {
        let now = epoch_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workspace_id: workspace_id.into(),
            name: name.into(),
            folder_path: folder_path.into(),
            service_type,
            status: ServiceStatus::Detecting,
            container_reference: None,
            deployment_config: None,
            health_status: HealthStatus::Unknown,
            parent_service_id: None,
            error_message: None,
            metrics: None,
            replicas: 0,
            startup_time_ms: None,
            created_at: now,
            updated_at: now,
            deployed_at: None,
            started_at: None,
            last_health_check_at: None,
            last_accessed_at: None,
        }
    }

    /// Key in the folder uniqueness index.
    pub fn path_key(&self) -> String {
        path_key(&self.workspace_id, &self.folder_path)
    }
}

pub fn path_key(workspace_id: &str, folder_path: &str) -> String {
    format!("{workspace_id}:{folder_path}")
}

// ── Deployment events ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DeploymentStarted,
    DeploymentCompleted,
    DeploymentFailed,
    ServiceStarted,
    ServiceStopped,
    ServiceScaled,
    HealthCheckFailed,
    ServiceRemoved,
}

impl EventType {
    pub fn label(&self) -> &'static str {
        match self {
            EventType::DeploymentStarted => "deployment_started",
            EventType::DeploymentCompleted => "deployment_completed",
            EventType::DeploymentFailed => "deployment_failed",
            EventType::ServiceStarted => "service_started",
            EventType::ServiceStopped => "service_stopped",
            EventType::ServiceScaled => "service_scaled",
            EventType::HealthCheckFailed => "health_check_failed",
            EventType::ServiceRemoved => "service_removed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Immutable audit record of a lifecycle action or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentEvent {
    /// Sequence number assigned on append; 0 before that.
    pub id: u64,
    pub service_instance_id: InstanceId,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub error_message: Option<String>,
    /// Set when the failure was an engine timeout.
    #[serde(default)]
    pub timed_out: bool,
    pub duration_ms: Option<u64>,
    pub occurred_at: u64,
}

impl DeploymentEvent {
    pub fn new(instance_id: impl Into<String>, event_type: EventType) -> Self {
        Self {
            id: 0,
            service_instance_id: instance_id.into(),
            event_type,
            payload: serde_json::Value::Null,
            error_message: None,
            timed_out: false,
            duration_ms: None,
            occurred_at: epoch_millis(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn timed_out(mut self, timed_out: bool) -> Self {
        self.timed_out = timed_out;
        self
    }
}
