//! Orchestrator error types.

use thiserror::Error;

use foldergrid_analyzer::AnalyzerError;
use foldergrid_core::DeploymentConfigError;
use foldergrid_registry::{RegistryError, ServiceStatus};

use crate::engine::EngineError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Bad input or a missing prerequisite. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Another transition on the same instance is in flight, or the folder
    /// is already registered.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid transition {from} -> {to}")]
    InvalidTransition {
        from: ServiceStatus,
        to: ServiceStatus,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("registry error: {0}")]
    Registry(RegistryError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl From<RegistryError> for OrchestratorError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(what) => OrchestratorError::NotFound(what),
            RegistryError::Conflict(what) => OrchestratorError::Conflict(what),
            RegistryError::InvalidTransition { from, to } => {
                OrchestratorError::InvalidTransition { from, to }
            }
            RegistryError::Precondition(what) => OrchestratorError::Validation(what),
            other => OrchestratorError::Registry(other),
        }
    }
}

impl From<DeploymentConfigError> for OrchestratorError {
    fn from(e: DeploymentConfigError) -> Self {
        OrchestratorError::Validation(e.to_string())
    }
}

impl From<AnalyzerError> for OrchestratorError {
    fn from(e: AnalyzerError) -> Self {
        match e {
            AnalyzerError::NotFound(what) => OrchestratorError::NotFound(what),
            other => OrchestratorError::Validation(other.to_string()),
        }
    }
}
