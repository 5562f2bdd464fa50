//! foldergrid-orchestrator — drives service instances through their
//! lifecycle against an external container engine.
//!
//! # Architecture
//!
//! ```text
//! OrchestrationManager
//!   ├── RegistryStore / EventLog (instances, detections, audit trail)
//!   ├── StrategyRegistry (service type → DeploymentStrategy → DeploymentPlan)
//!   ├── ContainerEngine (build/run/stop/kill/inspect/scale, each bounded by a timeout)
//!   ├── InstanceLocks (one in-flight transition per instance)
//!   └── broadcast::Sender<LifecycleNotification>
//!
//! TopologyService
//!   └── FolderScanner → TopologyDetector → RegistryStore::upsert_detection
//! ```

pub mod docker;
pub mod engine;
pub mod error;
pub mod locks;
pub mod manager;
pub mod notify;
pub mod retry;
pub mod strategy;
pub mod topology;

pub use docker::DockerCliEngine;
pub use engine::{
    BuildRequest, ContainerEngine, ContainerReport, DescriptorSource, EngineError, EngineResult,
    RunRequest,
};
pub use error::{OrchestratorError, OrchestratorResult};
pub use locks::{InstanceGuard, InstanceLocks};
pub use manager::{HealthSnapshot, HealthVerdict, OrchestrationManager};
pub use notify::{LifecycleNotification, NotificationKind};
pub use retry::RetryPolicy;
pub use strategy::{DeploymentPlan, DeploymentStrategy, StrategyRegistry};
pub use topology::TopologyService;
