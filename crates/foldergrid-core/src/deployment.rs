//! Deployment configuration documents.
//!
//! A `DeploymentConfig` is produced by the generator from a topology
//! detection, persisted alongside its service instance, and handed to a
//! deployment strategy to derive the concrete build/run plan. Maps are
//! `BTreeMap` so the serialized form is stable across round-trips.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything needed to build and run one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub build: BuildSpec,
    pub ports: Vec<PortMapping>,
    pub env: BTreeMap<String, String>,
    pub resources: ResourceLimits,
    pub health_check: HealthCheckSpec,
    pub scaling: ScalingSpec,
    /// Set when the build descriptor was synthesized rather than found.
    #[serde(default)]
    pub low_confidence: bool,
}

/// Build context and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Workspace-relative folder used as the build context.
    pub context: String,
    pub descriptor: BuildDescriptor,
}

/// Where the container descriptor comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildDescriptor {
    /// A descriptor file inside the build context (e.g. `Dockerfile`).
    Explicit { path: String },
    /// A minimal runtime descriptor inferred from the folder's language.
    Synthesized {
        base_image: String,
        install_command: Option<String>,
        start_command: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    /// Host port to bind; `None` lets the engine choose.
    pub host_port: Option<u16>,
    #[serde(default)]
    pub protocol: Protocol,
}

impl PortMapping {
    pub fn tcp(container_port: u16) -> Self {
        Self {
            container_port,
            host_port: None,
            protocol: Protocol::Tcp,
        }
    }
}

/// Resource limits per replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub memory_mb: u64,
    /// CPU quota in thousandths of a core.
    pub cpu_millis: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_mb: 512,
            cpu_millis: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealthProbe {
    Http { path: String, port: u16 },
    Tcp { port: u16 },
    /// Healthy while the container process is running.
    Process,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    pub probe: HealthProbe,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub unhealthy_threshold: u32,
}

impl HealthCheckSpec {
    pub fn for_probe(probe: HealthProbe) -> Self {
        Self {
            probe,
            interval_secs: 30,
            timeout_secs: 5,
            unhealthy_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingSpec {
    pub replicas: u32,
    pub min_replicas: u32,
    pub max_replicas: u32,
}

impl Default for ScalingSpec {
    fn default() -> Self {
        Self {
            replicas: 1,
            min_replicas: 1,
            max_replicas: 10,
        }
    }
}

/// Reasons a deployment config is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeploymentConfigError {
    #[error("build context must be a workspace-relative path: {0}")]
    InvalidContext(String),

    #[error("port 0 is not a valid container port")]
    ZeroPort,

    #[error("duplicate container port {0}")]
    DuplicatePort(u16),

    #[error("replicas {replicas} outside [{min}, {max}]")]
    ReplicasOutOfRange { replicas: u32, min: u32, max: u32 },

    #[error("memory limit must be non-zero")]
    ZeroMemory,

    #[error("synthesized descriptor has an empty start command")]
    EmptyStartCommand,
}

impl DeploymentConfig {
    /// Check structural invariants before the config is accepted.
    pub fn validate(&self) -> Result<(), DeploymentConfigError> {
        let context = &self.build.context;
        if context.starts_with('/') || context.split('/').any(|c| c == "..") {
            return Err(DeploymentConfigError::InvalidContext(context.clone()));
        }

        let mut seen = Vec::with_capacity(self.ports.len());
        for port in &self.ports {
            if port.container_port == 0 {
                return Err(DeploymentConfigError::ZeroPort);
            }
            if seen.contains(&port.container_port) {
                return Err(DeploymentConfigError::DuplicatePort(port.container_port));
            }
            seen.push(port.container_port);
        }

        let s = &self.scaling;
        if s.min_replicas > s.max_replicas || s.replicas < s.min_replicas || s.replicas > s.max_replicas
        {
            return Err(DeploymentConfigError::ReplicasOutOfRange {
                replicas: s.replicas,
                min: s.min_replicas,
                max: s.max_replicas,
            });
        }

        if self.resources.memory_mb == 0 {
            return Err(DeploymentConfigError::ZeroMemory);
        }

        if let BuildDescriptor::Synthesized { start_command, .. } = &self.build.descriptor {
            if start_command.trim().is_empty() {
                return Err(DeploymentConfigError::EmptyStartCommand);
            }
        }

        Ok(())
    }

    /// The first declared container port, if any.
    pub fn primary_port(&self) -> Option<u16> {
        self.ports.first().map(|p| p.container_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeploymentConfig {
        DeploymentConfig {
            build: BuildSpec {
                context: "services/api".to_string(),
                descriptor: BuildDescriptor::Explicit {
                    path: "Dockerfile".to_string(),
                },
            },
            ports: vec![PortMapping::tcp(8080)],
            env: BTreeMap::from([("PORT".to_string(), "8080".to_string())]),
            resources: ResourceLimits::default(),
            health_check: HealthCheckSpec::for_probe(HealthProbe::Tcp { port: 8080 }),
            scaling: ScalingSpec::default(),
            low_confidence: false,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert_eq!(sample().validate(), Ok(()));
    }

    #[test]
    fn rejects_escaping_context() {
        let mut config = sample();
        config.build.context = "../outside".to_string();
        assert!(matches!(
            config.validate(),
            Err(DeploymentConfigError::InvalidContext(_))
        ));
    }

    #[test]
    fn rejects_duplicate_ports() {
        let mut config = sample();
        config.ports.push(PortMapping::tcp(8080));
        assert_eq!(config.validate(), Err(DeploymentConfigError::DuplicatePort(8080)));
    }

    #[test]
    fn rejects_replicas_outside_bounds() {
        let mut config = sample();
        config.scaling.replicas = 11;
        assert!(matches!(
            config.validate(),
            Err(DeploymentConfigError::ReplicasOutOfRange { .. })
        ));
    }

    #[test]
    fn descriptor_serializes_with_kind_tag() {
        let json = serde_json::to_value(&sample().build.descriptor).unwrap();
        assert_eq!(json["kind"], "explicit");
        assert_eq!(json["path"], "Dockerfile");
    }
}
