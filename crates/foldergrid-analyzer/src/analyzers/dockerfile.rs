//! Container descriptor indicators and Dockerfile static analysis.

use regex::Regex;

use foldergrid_core::ServiceType;

use super::Vote;
use crate::scanner::FolderScan;

/// Descriptor file names, in lookup order.
pub const DESCRIPTOR_NAMES: &[&str] = &["Dockerfile", "Containerfile"];

const COMPOSE_NAMES: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

pub fn votes(scan: &FolderScan) -> Vec<Vote> {
    let mut votes = Vec::new();
    if let Some(name) = scan.has_any_file(DESCRIPTOR_NAMES) {
        votes.push(Vote::new(ServiceType::Containerized, 0.85, name));
    }
    if let Some(name) = scan.has_any_file(COMPOSE_NAMES) {
        votes.push(Vote::new(ServiceType::Containerized, 0.3, name));
    }
    if scan.has_file(".dockerignore") {
        votes.push(Vote::new(ServiceType::Containerized, 0.15, ".dockerignore"));
    }
    votes
}

/// The descriptor file present in the folder, if any.
pub fn descriptor_name(scan: &FolderScan) -> Option<&'static str> {
    DESCRIPTOR_NAMES.iter().copied().find(|n| scan.has_file(n))
}

/// Metadata extracted from a Dockerfile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DockerfileInfo {
    pub base_images: Vec<String>,
    pub exposed_ports: Vec<u16>,
    pub entrypoint: Option<String>,
    pub healthcheck: Option<String>,
}

pub fn parse_dockerfile(content: &str) -> DockerfileInfo {
    let mut info = DockerfileInfo::default();
    let (Ok(from_re), Ok(expose_re), Ok(entry_re), Ok(health_re)) = (
        Regex::new(r"(?i)^FROM\s+(\S+)"),
        Regex::new(r"(?i)^EXPOSE\s+(.+)"),
        Regex::new(r"(?i)^(?:ENTRYPOINT|CMD)\s+(.+)"),
        Regex::new(r"(?i)^HEALTHCHECK\s+(.+)"),
    ) else {
        return info;
    };

    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(caps) = from_re.captures(trimmed) {
            info.base_images.push(caps[1].to_string());
        }
        if let Some(caps) = expose_re.captures(trimmed) {
            // EXPOSE 8080 9090/udp
            for token in caps[1].split_whitespace() {
                let port = token.split('/').next().unwrap_or(token);
                if let Ok(port) = port.parse::<u16>() {
                    if port != 0 && !info.exposed_ports.contains(&port) {
                        info.exposed_ports.push(port);
                    }
                }
            }
        }
        if let Some(caps) = entry_re.captures(trimmed) {
            info.entrypoint = Some(caps[1].to_string());
        }
        if let Some(caps) = health_re.captures(trimmed) {
            info.healthcheck = Some(caps[1].to_string());
        }
    }

    info
}
