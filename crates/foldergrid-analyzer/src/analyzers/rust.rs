//! Rust indicators and Cargo.toml analysis.

use foldergrid_core::ServiceType;

use super::{Vote, cluster_vote};
use crate::scanner::FolderScan;

pub fn votes(scan: &FolderScan) -> Vec<Vote> {
    let mut votes = Vec::new();
    if scan.has_file("Cargo.toml") {
        votes.push(Vote::new(ServiceType::Rust, 0.6, "Cargo.toml"));
        if has_binary_target(scan) {
            votes.push(Vote::new(ServiceType::Rust, 0.2, "binary target"));
        }
    }
    if scan.has_file("Cargo.lock") {
        votes.push(Vote::new(ServiceType::Rust, 0.15, "Cargo.lock"));
    }
    votes.extend(cluster_vote(scan, ServiceType::Rust, &["rs"], 0.15));
    votes
}

/// Package name from Cargo.toml.
pub fn package_name(scan: &FolderScan) -> Option<String> {
    let manifest: toml::Value = toml::from_str(scan.sniff("Cargo.toml")?).ok()?;
    manifest
        .get("package")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

fn has_binary_target(scan: &FolderScan) -> bool {
    scan.entries.iter().any(|e| e.relative_path == "src/main.rs")
        || scan.sniff("Cargo.toml").is_some_and(|c| c.contains("[[bin]]"))
}
