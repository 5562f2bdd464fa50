//! Container engine adapter interface.
//!
//! The orchestrator never talks to a container runtime directly; it goes
//! through `ContainerEngine`, which `DockerCliEngine` implements over the
//! `docker` CLI and tests implement with a scripted fake.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use foldergrid_core::{HealthStatus, PortMapping};

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// The call did not finish within its budget. Never retried.
    #[error("engine call timed out after {0:?}")]
    Timeout(Duration),

    /// Worth retrying (registry hiccup, daemon busy).
    #[error("transient engine error: {0}")]
    Transient(String),

    #[error("engine error: {0}")]
    Failed(String),

    /// The container no longer exists.
    #[error("container gone: {0}")]
    Gone(String),

    /// The engine itself could not be reached.
    #[error("engine unreachable: {0}")]
    Unreachable(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_) | EngineError::Unreachable(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Timeout(_))
    }
}

/// Where the build reads its descriptor from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorSource {
    /// A file relative to the build context.
    File(String),
    /// Descriptor text passed to the engine directly.
    Inline(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub tag: String,
    /// Absolute path of the build context.
    pub context: PathBuf,
    pub descriptor: DescriptorSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub image: String,
    pub name: String,
    pub ports: Vec<PortMapping>,
    pub env: BTreeMap<String, String>,
    pub memory_mb: u64,
    pub cpu_millis: u32,
    pub labels: BTreeMap<String, String>,
}

/// What the engine knows about a container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerReport {
    pub running: bool,
    pub exit_code: Option<i32>,
    /// The engine's own health verdict, when the image declares a check.
    pub health: Option<HealthStatus>,
    /// container port → host port
    pub host_ports: BTreeMap<u16, u16>,
    pub memory_mb: Option<u64>,
    pub cpu_percent: Option<f64>,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Build an image and return its reference.
    async fn build(&self, request: &BuildRequest) -> EngineResult<String>;

    /// Start a container from a built image; returns the container reference.
    async fn run(&self, request: &RunRequest) -> EngineResult<String>;

    /// Restart a stopped container.
    async fn start(&self, container: &str) -> EngineResult<()>;

    /// Ask the container to stop, allowing `grace` before the engine kills it.
    async fn stop(&self, container: &str, grace: Duration) -> EngineResult<()>;

    async fn kill(&self, container: &str) -> EngineResult<()>;

    /// Delete the container and its replicas, running or not. Frees the
    /// name for the next run. A container that no longer exists is `Ok`.
    async fn remove(&self, container: &str) -> EngineResult<()>;

    async fn inspect(&self, container: &str) -> EngineResult<ContainerReport>;

    /// Set the replica count; returns how many replicas are actually running.
    async fn scale(&self, container: &str, replicas: u32) -> EngineResult<u32>;
}
