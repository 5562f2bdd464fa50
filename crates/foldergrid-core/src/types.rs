//! Shared types used across Foldergrid crates.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// The kind of service a folder was classified as.
///
/// Variant order is the tie-break precedence used by the detector: when two
/// candidates score identically, the one declared first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// Folder carries its own container descriptor (Dockerfile, Containerfile).
    Containerized,
    Node,
    Python,
    Go,
    Rust,
    /// Plain HTML/CSS/JS served by a static file server.
    Static,
    /// Folder whose subfolders are themselves services.
    Composite,
    Unknown,
}

impl ServiceType {
    /// Every classifiable type, in precedence order.
    pub const ALL: [ServiceType; 8] = [
        ServiceType::Containerized,
        ServiceType::Node,
        ServiceType::Python,
        ServiceType::Go,
        ServiceType::Rust,
        ServiceType::Static,
        ServiceType::Composite,
        ServiceType::Unknown,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ServiceType::Containerized => "containerized",
            ServiceType::Node => "node",
            ServiceType::Python => "python",
            ServiceType::Go => "go",
            ServiceType::Rust => "rust",
            ServiceType::Static => "static",
            ServiceType::Composite => "composite",
            ServiceType::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != ServiceType::Unknown
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Health status as determined by periodic polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    #[default]
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Current Unix epoch in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
