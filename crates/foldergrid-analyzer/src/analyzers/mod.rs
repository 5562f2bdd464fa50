//! Indicator analyzers.
//!
//! Each submodule inspects a `FolderScan` and casts weighted votes for the
//! service type it knows about. Weights are independent evidence strengths
//! in `(0, 1)`; the detector combines them.

pub mod dockerfile;
pub mod go;
pub mod node;
pub mod python;
pub mod rust;
pub mod static_site;

use regex::Regex;

use foldergrid_core::ServiceType;

use crate::scanner::FolderScan;

/// Minimum number of files with an extension before the cluster counts.
pub const CLUSTER_MIN_FILES: usize = 2;

/// One piece of evidence for a service type.
#[derive(Debug, Clone, PartialEq)]
pub struct Vote {
    pub service_type: ServiceType,
    pub weight: f64,
    pub indicator: String,
}

impl Vote {
    pub fn new(service_type: ServiceType, weight: f64, indicator: impl Into<String>) -> Self {
        Self {
            service_type,
            weight,
            indicator: indicator.into(),
        }
    }
}

/// Collect every analyzer's votes for a folder.
pub fn collect_votes(scan: &FolderScan) -> Vec<Vote> {
    let mut votes = Vec::new();
    votes.extend(dockerfile::votes(scan));
    votes.extend(node::votes(scan));
    votes.extend(python::votes(scan));
    votes.extend(go::votes(scan));
    votes.extend(rust::votes(scan));
    votes.extend(static_site::votes(scan));
    votes
}

/// Vote when a folder holds a cluster of source files.
pub(crate) fn cluster_vote(
    scan: &FolderScan,
    service_type: ServiceType,
    exts: &[&str],
    weight: f64,
) -> Option<Vote> {
    let count = scan.count_extensions(exts);
    (count >= CLUSTER_MIN_FILES).then(|| {
        Vote::new(
            service_type,
            weight,
            format!("{count} *.{} files", exts.join("/*.")),
        )
    })
}

/// Find a port in free text: `PORT=3000`, `--port 8000`, `-p 3000`, `:8080`.
pub fn port_in_text(text: &str) -> Option<u16> {
    let re = Regex::new(r"(?:PORT\s*=\s*|--port[=\s]+|-p\s+|-l\s+|:)(\d{2,5})\b").ok()?;
    re.captures_iter(text)
        .filter_map(|c| c[1].parse::<u16>().ok())
        .find(|p| *p >= 80)
}

/// `PORT=` from a dotenv file.
pub fn port_from_env_file(scan: &FolderScan) -> Option<u16> {
    let re = Regex::new(r#"(?m)^\s*PORT\s*=\s*"?(\d{2,5})"?\s*$"#).ok()?;
    [".env", ".env.example"]
        .iter()
        .filter_map(|name| scan.sniff(name))
        .find_map(|content| re.captures(content).and_then(|c| c[1].parse().ok()))
}
