//! Go indicators.

use foldergrid_core::ServiceType;

use super::{Vote, cluster_vote};
use crate::scanner::FolderScan;

pub fn votes(scan: &FolderScan) -> Vec<Vote> {
    let mut votes = Vec::new();
    if scan.has_file("go.mod") {
        votes.push(Vote::new(ServiceType::Go, 0.6, "go.mod"));
    }
    if scan.has_file("go.sum") {
        votes.push(Vote::new(ServiceType::Go, 0.15, "go.sum"));
    }
    if scan.has_file("main.go") {
        votes.push(Vote::new(ServiceType::Go, 0.2, "main.go"));
    }
    votes.extend(cluster_vote(scan, ServiceType::Go, &["go"], 0.15));
    votes
}

/// Module path declared in go.mod.
pub fn module_path(scan: &FolderScan) -> Option<String> {
    scan.sniff("go.mod")?
        .lines()
        .find_map(|l| l.trim().strip_prefix("module "))
        .map(|m| m.trim().to_string())
}
