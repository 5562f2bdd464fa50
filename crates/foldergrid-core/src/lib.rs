pub mod config;
pub mod deployment;
pub mod detection;
pub mod types;
pub mod workspace;

pub use config::{EnginePolicy, FoldergridConfig, HealthSettings, ScannerSettings};
pub use deployment::*;
pub use detection::{CandidateScore, ChildDetection, TopologyDetection};
pub use types::*;
pub use workspace::{LocalWorkspace, Workspace, WorkspaceEntry, WorkspaceError};
