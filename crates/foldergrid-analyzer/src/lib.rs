//! foldergrid-analyzer — turns a workspace folder into a topology detection.
//!
//! ```text
//! FolderScanner::scan(folder) → FolderScan
//!   └── TopologyDetector::detect(&scan) → TopologyDetection
//!         ├── analyzers::*::votes()        (weighted indicators per type)
//!         ├── DependencyGraph               (composite edges, cycle suppression)
//!         └── ConfigGenerator::generate()   (recommended DeploymentConfig)
//! ```
//!
//! Everything here is a pure read of the workspace; persisting the result is
//! the registry's job.

pub mod analyzers;
pub mod detector;
pub mod error;
pub mod generator;
pub mod graph;
pub mod report;
pub mod scanner;

pub use detector::{Classification, TopologyDetector};
pub use error::{AnalyzerError, AnalyzerResult};
pub use generator::ConfigGenerator;
pub use graph::DependencyGraph;
pub use scanner::{FolderScan, FolderScanner, ScannedEntry};
