//! Static site indicators.

use foldergrid_core::ServiceType;

use super::{Vote, cluster_vote};
use crate::scanner::FolderScan;

pub fn votes(scan: &FolderScan) -> Vec<Vote> {
    let mut votes = Vec::new();
    if scan.has_file("index.html") {
        votes.push(Vote::new(ServiceType::Static, 0.5, "index.html"));
    }
    votes.extend(cluster_vote(scan, ServiceType::Static, &["html", "css"], 0.2));
    votes
}
