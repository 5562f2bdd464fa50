//! Node.js indicators and package.json analysis.

use serde_json::Value;

use foldergrid_core::ServiceType;

use super::{Vote, cluster_vote, port_in_text};
use crate::scanner::FolderScan;

pub const LOCKFILES: &[&str] = &["package-lock.json", "yarn.lock", "pnpm-lock.yaml", "bun.lockb"];

const ENTRY_FILES: &[&str] = &["server.js", "index.js", "app.js", "main.js"];

pub fn votes(scan: &FolderScan) -> Vec<Vote> {
    let mut votes = Vec::new();
    if scan.has_file("package.json") {
        votes.push(Vote::new(ServiceType::Node, 0.6, "package.json"));
        if package_info(scan).is_some_and(|p| p.start_script.is_some()) {
            votes.push(Vote::new(ServiceType::Node, 0.2, "package.json start script"));
        }
    }
    if let Some(lock) = scan.has_any_file(LOCKFILES) {
        votes.push(Vote::new(ServiceType::Node, 0.2, lock));
    }
    if let Some(entry) = scan.has_any_file(ENTRY_FILES) {
        votes.push(Vote::new(ServiceType::Node, 0.1, entry));
    }
    votes.extend(cluster_vote(scan, ServiceType::Node, &["js", "mjs", "ts"], 0.15));
    votes
}

/// The parts of package.json the generator uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageInfo {
    pub name: Option<String>,
    pub main: Option<String>,
    pub start_script: Option<String>,
}

impl PackageInfo {
    /// Port referenced by the start script.
    pub fn start_port(&self) -> Option<u16> {
        self.start_script.as_deref().and_then(port_in_text)
    }
}

/// Parse the sniffed package.json. `None` when missing or not valid JSON.
pub fn package_info(scan: &FolderScan) -> Option<PackageInfo> {
    let content = scan.sniff("package.json")?;
    let value: Value = serde_json::from_str(content).ok()?;
    let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);
    Some(PackageInfo {
        name: text(value.get("name")),
        main: text(value.get("main")),
        start_script: text(value.get("scripts").and_then(|s| s.get("start"))),
    })
}

/// Entry file to run with `node` when there is no start script.
pub fn entry_file(scan: &FolderScan, info: &PackageInfo) -> Option<String> {
    info.main
        .clone()
        .or_else(|| scan.has_any_file(ENTRY_FILES).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::tests::scan_of;

    const PACKAGE: &str = r#"{
  "name": "storefront",
  "main": "server.js",
  "scripts": { "start": "PORT=3000 node server.js", "test": "jest" }
}"#;

    #[test]
    fn package_json_with_start_script() {
        let scan = scan_of(&[("web/package.json", PACKAGE)], "web");
        let info = package_info(&scan).unwrap();
        assert_eq!(info.name.as_deref(), Some("storefront"));
        assert_eq!(info.start_port(), Some(3000));

        let weights: Vec<f64> = votes(&scan).iter().map(|v| v.weight).collect();
        assert_eq!(weights, vec![0.6, 0.2]);
    }

    #[test]
    fn malformed_package_json_still_votes_for_the_file() {
        let scan = scan_of(&[("web/package.json", "{ not json")], "web");
        assert!(package_info(&scan).is_none());
        assert_eq!(votes(&scan).len(), 1);
    }

    #[test]
    fn entry_file_prefers_main() {
        let scan = scan_of(&[("web/package.json", PACKAGE), ("web/index.js", "")], "web");
        let info = package_info(&scan).unwrap();
        assert_eq!(entry_file(&scan, &info).as_deref(), Some("server.js"));
    }
}
