//! Topology detection results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::deployment::DeploymentConfig;
use crate::types::ServiceType;

/// The classification of one folder, with its children and dependency edges.
///
/// Detections are derivative: they can be recomputed from the folder
/// contents at any time. The registry keeps the latest one per folder as
/// "current" and every earlier one as immutable history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyDetection {
    /// Assigned by the registry on upsert.
    pub id: String,
    pub folder_path: String,
    pub service_type: ServiceType,
    pub confidence: f64,
    /// All types that received votes, best first.
    pub candidates: Vec<CandidateScore>,
    /// Classification of each eligible immediate subfolder.
    pub children: Vec<ChildDetection>,
    /// folder_path → folder_paths it depends on.
    pub dependency_map: BTreeMap<String, Vec<String>>,
    /// Dependency edges suppressed because they would close a cycle.
    pub conflicts: Vec<String>,
    /// Flags for partial results (skipped sniffs, truncated scans).
    pub warnings: Vec<String>,
    pub recommended_config: Option<DeploymentConfig>,
    /// SHA-256 over the scanned entries.
    pub fingerprint: String,
    /// Assigned by the registry on upsert; 1 for the first detection.
    pub version: u32,
    /// Unix timestamp (milliseconds).
    pub analyzed_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub service_type: ServiceType,
    pub score: f64,
    pub indicators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildDetection {
    pub folder_path: String,
    pub name: String,
    pub service_type: ServiceType,
    pub confidence: f64,
    pub recommended_config: Option<DeploymentConfig>,
}

impl TopologyDetection {
    pub fn is_deployable(&self) -> bool {
        self.service_type.is_known()
    }

    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty() || !self.conflicts.is_empty()
    }
}
