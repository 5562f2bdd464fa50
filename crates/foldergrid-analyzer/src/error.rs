//! Analyzer error types.

use thiserror::Error;

use foldergrid_core::WorkspaceError;

pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("folder not found: {0}")]
    NotFound(String),

    #[error("invalid folder path: {0}")]
    Validation(String),

    #[error("cannot generate deployment config: {0}")]
    Generation(String),

    #[error("dependency cycle involving {0}")]
    Cycle(String),

    #[error("workspace error: {0}")]
    Workspace(WorkspaceError),
}

impl From<WorkspaceError> for AnalyzerError {
    fn from(e: WorkspaceError) -> Self {
        match e {
            WorkspaceError::NotFound(path) => AnalyzerError::NotFound(path),
            WorkspaceError::InvalidPath(path) => AnalyzerError::Validation(path),
            other => AnalyzerError::Workspace(other),
        }
    }
}
