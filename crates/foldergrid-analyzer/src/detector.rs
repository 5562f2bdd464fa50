//! Topology detector.
//!
//! Indicator votes for the same service type are combined by noisy-OR
//! (`1 - Π(1 - w)`), so each extra indicator can only raise the score.
//! Scores are capped below certainty and rounded so re-running on the same
//! contents reproduces the same numbers.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::{debug, info, warn};

use foldergrid_core::config::DEFAULT_ACCEPTANCE_THRESHOLD;
use foldergrid_core::{
    CandidateScore, ChildDetection, DeploymentConfig, ServiceType, TopologyDetection,
    epoch_millis,
};

use crate::analyzers::collect_votes;
use crate::generator::ConfigGenerator;
use crate::graph::DependencyGraph;
use crate::scanner::FolderScan;

/// Upper bound on any combined score.
pub const MAX_CONFIDENCE: f64 = 0.99;

/// Minimum number of classified subfolders for a composite.
pub const COMPOSITE_MIN_CHILDREN: usize = 2;

/// The result of classifying a single folder.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub service_type: ServiceType,
    pub confidence: f64,
    /// Every type that received a vote, best first.
    pub candidates: Vec<CandidateScore>,
}

#[derive(Debug, Clone)]
pub struct TopologyDetector {
    threshold: f64,
    generator: ConfigGenerator,
}

impl Default for TopologyDetector {
    fn default() -> Self {
        Self::new(DEFAULT_ACCEPTANCE_THRESHOLD)
    }
}

impl TopologyDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            generator: ConfigGenerator::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Classify one folder from its own indicators.
    pub fn classify(&self, scan: &FolderScan) -> Classification {
        let mut tally: BTreeMap<ServiceType, (f64, Vec<String>)> = BTreeMap::new();
        for vote in collect_votes(scan) {
            let (miss, indicators) = tally.entry(vote.service_type).or_insert((1.0, Vec::new()));
            *miss *= 1.0 - vote.weight.clamp(0.0, 1.0);
            indicators.push(vote.indicator);
        }

        let mut candidates: Vec<CandidateScore> = tally
            .into_iter()
            .map(|(service_type, (miss, indicators))| CandidateScore {
                service_type,
                score: round_score((1.0 - miss).min(MAX_CONFIDENCE)),
                indicators,
            })
            .collect();
        // BTreeMap iteration is already in precedence order; a stable sort
        // keeps it for equal scores.
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        let best = candidates.first().map(|c| (c.service_type, c.score));
        let (service_type, confidence) = match best {
            Some((service_type, score)) if score >= self.threshold => (service_type, score),
            Some((_, score)) => (ServiceType::Unknown, score),
            None => (ServiceType::Unknown, 0.0),
        };

        Classification {
            service_type,
            confidence,
            candidates,
        }
    }

    /// Full detection: the folder, its immediate subfolders, and the
    /// dependency edges between them.
    ///
    /// Never fails; problems are reported through `warnings` and
    /// `conflicts`.
    pub fn detect(&self, scan: &FolderScan) -> TopologyDetection {
        let own = self.classify(scan);
        let mut warnings = scan.warnings.clone();

        let child_scans: Vec<FolderScan> = scan
            .subfolders()
            .into_iter()
            .map(|name| scan.subfolder(name))
            .collect();
        let mut children = Vec::with_capacity(child_scans.len());
        for child_scan in &child_scans {
            let class = self.classify(child_scan);
            let recommended_config = self.recommend(child_scan, class.service_type, &mut warnings);
            children.push(ChildDetection {
                folder_path: child_scan.folder_path.clone(),
                name: child_scan.folder_name().to_string(),
                service_type: class.service_type,
                confidence: class.confidence,
                recommended_config,
            });
        }

        let composite = children.len() >= COMPOSITE_MIN_CHILDREN
            && children.iter().all(|c| c.service_type.is_known());

        let mut candidates = own.candidates;
        let mut conflicts = Vec::new();
        let mut dependency_map = BTreeMap::new();
        let (service_type, confidence, recommended_config) = if composite {
            let weakest = children
                .iter()
                .map(|c| c.confidence)
                .fold(MAX_CONFIDENCE, f64::min);
            candidates.insert(
                0,
                CandidateScore {
                    service_type: ServiceType::Composite,
                    score: weakest,
                    indicators: vec![format!("{} classified subfolders", children.len())],
                },
            );

            let graph = build_graph(scan, &child_scans, &mut conflicts);
            for conflict in &conflicts {
                warn!(folder = %scan.folder_path, %conflict, "dependency edge suppressed");
            }
            dependency_map = graph.to_map();
            (ServiceType::Composite, weakest, None)
        } else {
            let config = self.recommend(scan, own.service_type, &mut warnings);
            (own.service_type, own.confidence, config)
        };

        info!(
            folder = %scan.folder_path,
            %service_type,
            confidence,
            children = children.len(),
            conflicts = conflicts.len(),
            "folder classified"
        );

        TopologyDetection {
            id: String::new(),
            folder_path: scan.folder_path.clone(),
            service_type,
            confidence,
            candidates,
            children,
            dependency_map,
            conflicts,
            warnings,
            recommended_config,
            fingerprint: scan.fingerprint(),
            version: 0,
            analyzed_at: epoch_millis(),
        }
    }

    fn recommend(
        &self,
        scan: &FolderScan,
        service_type: ServiceType,
        warnings: &mut Vec<String>,
    ) -> Option<DeploymentConfig> {
        if !service_type.is_known() {
            return None;
        }
        match self.generator.generate(scan, service_type) {
            Ok(config) => Some(config),
            Err(e) => {
                debug!(folder = %scan.folder_path, error = %e, "no recommended config");
                warnings.push(format!("{}: {e}", scan.folder_path));
                None
            }
        }
    }
}

fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

/// Composite edges first (folder → each child), then references between
/// siblings in name order. References back to the composite itself are
/// tried too and always end up as conflicts.
fn build_graph(
    scan: &FolderScan,
    child_scans: &[FolderScan],
    conflicts: &mut Vec<String>,
) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    graph.add_node(&scan.folder_path);
    for child in child_scans {
        if let Some(conflict) = graph.add_edge(&scan.folder_path, &child.folder_path) {
            conflicts.push(conflict);
        }
    }

    let mut targets: Vec<(&str, &str)> = child_scans
        .iter()
        .map(|c| (c.folder_name(), c.folder_path.as_str()))
        .collect();
    targets.push((scan.folder_name(), scan.folder_path.as_str()));

    for child in child_scans {
        for (name, path) in &targets {
            if *path == child.folder_path {
                continue;
            }
            let Some(pattern) = ReferencePattern::new(name) else {
                continue;
            };
            if child.sniffs().any(|(_, text)| pattern.matches(text)) {
                if let Some(conflict) = graph.add_edge(&child.folder_path, path) {
                    conflicts.push(conflict);
                }
            }
        }
    }
    graph
}

/// How a service refers to a sibling by name.
struct ReferencePattern {
    url: Regex,
    env: Regex,
    depends_item: Regex,
}

impl ReferencePattern {
    fn new(name: &str) -> Option<Self> {
        let escaped = regex::escape(name);
        let env_name = regex::escape(
            &name
                .to_ascii_uppercase()
                .replace(|c: char| !c.is_ascii_alphanumeric(), "_"),
        );
        Some(Self {
            url: Regex::new(&format!(r#"(?i)https?://{escaped}(?:[:/"'\s]|$)"#)).ok()?,
            env: Regex::new(&format!(r"(?:^|[^A-Z0-9]){env_name}_(?:URL|HOST)\b")).ok()?,
            depends_item: Regex::new(&format!(r#"(?m)^\s*-\s*["']?{escaped}["']?\s*$"#)).ok()?,
        })
    }

    fn matches(&self, text: &str) -> bool {
        self.url.is_match(text)
            || self.env.is_match(text)
            || (text.contains("depends_on") && self.depends_item.is_match(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::tests::scan_of;

    #[test]
    fn dockerfile_only_is_containerized() {
        let scan = scan_of(&[("svc/Dockerfile", "FROM alpine\nEXPOSE 8080\n")], "svc");
        let detection = TopologyDetector::default().detect(&scan);
        assert_eq!(detection.service_type, ServiceType::Containerized);
        assert!(detection.confidence >= 0.8);
        assert!(detection.recommended_config.is_some());
    }

    #[test]
    fn more_indicators_never_lower_the_score() {
        let detector = TopologyDetector::default();
        let base = detector.classify(&scan_of(&[("w/package.json", "{}")], "w"));
        let more = detector.classify(&scan_of(
            &[("w/package.json", "{}"), ("w/package-lock.json", "{}")],
            "w",
        ));
        assert!(more.candidates[0].score > base.candidates[0].score);
    }

    #[test]
    fn weak_evidence_is_unknown_with_partial_score() {
        let scan = scan_of(&[("x/compose.yaml", "services: {}")], "x");
        let detection = TopologyDetector::default().detect(&scan);
        assert_eq!(detection.service_type, ServiceType::Unknown);
        assert!(detection.confidence > 0.0 && detection.confidence < 0.5);
        assert!(detection.recommended_config.is_none());
    }

    #[test]
    fn equal_scores_break_by_precedence() {
        let scan = scan_of(
            &[
                ("m/Cargo.toml", "[package]\nname = \"m\"\n"),
                ("m/go.mod", "module m"),
            ],
            "m",
        );
        let class = TopologyDetector::default().classify(&scan);
        assert_eq!(class.service_type, ServiceType::Go);
        assert_eq!(class.candidates[1].service_type, ServiceType::Rust);
    }

    #[test]
    fn detection_is_idempotent() {
        let files = [
            ("app/package.json", r#"{"scripts":{"start":"node index.js"}}"#),
            ("app/index.js", ""),
            ("app/lib.js", ""),
        ];
        let detector = TopologyDetector::default();
        let a = detector.detect(&scan_of(&files, "app"));
        let b = detector.detect(&scan_of(&files, "app"));
        assert_eq!(a.service_type, b.service_type);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.candidates, b.candidates);
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn composite_with_sibling_reference() {
        let scan = scan_of(
            &[
                ("shop/api/Dockerfile", "FROM golang\nEXPOSE 8080\n"),
                ("shop/web/package.json", r#"{"scripts":{"start":"PORT=3000 node s.js"}}"#),
                ("shop/web/.env", "API_URL=http://api:8080\n"),
            ],
            "shop",
        );
        let detection = TopologyDetector::default().detect(&scan);

        assert_eq!(detection.service_type, ServiceType::Composite);
        let weakest = detection
            .children
            .iter()
            .map(|c| c.confidence)
            .fold(1.0, f64::min);
        assert_eq!(detection.confidence, weakest);
        assert!(detection.recommended_config.is_none());
        assert_eq!(
            detection.dependency_map["shop"],
            vec!["shop/api".to_string(), "shop/web".to_string()]
        );
        assert_eq!(detection.dependency_map["shop/web"], vec!["shop/api".to_string()]);
        assert!(detection.conflicts.is_empty());
    }

    #[test]
    fn mutual_references_record_a_conflict() {
        let scan = scan_of(
            &[
                ("duo/a/Dockerfile", "FROM alpine"),
                ("duo/a/.env", "B_URL=http://b\n"),
                ("duo/b/Dockerfile", "FROM alpine"),
                ("duo/b/.env", "A_URL=http://a\n"),
            ],
            "duo",
        );
        let detection = TopologyDetector::default().detect(&scan);

        assert_eq!(detection.service_type, ServiceType::Composite);
        assert_eq!(detection.dependency_map["duo/a"], vec!["duo/b".to_string()]);
        assert!(detection.dependency_map["duo/b"].is_empty());
        assert_eq!(detection.conflicts.len(), 1);
        assert!(detection.is_partial());
    }

    #[test]
    fn one_unknown_child_blocks_composite() {
        let scan = scan_of(
            &[
                ("mono/api/Dockerfile", "FROM alpine"),
                ("mono/docs/readme.md", "docs"),
            ],
            "mono",
        );
        let detection = TopologyDetector::default().detect(&scan);
        assert_eq!(detection.service_type, ServiceType::Unknown);
        assert_eq!(detection.children.len(), 2);
        assert!(detection.dependency_map.is_empty());
    }

    #[test]
    fn scan_warnings_carry_into_detection() {
        let mut scan = scan_of(&[("svc/Dockerfile", "FROM alpine")], "svc");
        scan.warnings.push("sniff skipped for x: denied".to_string());
        let detection = TopologyDetector::default().detect(&scan);
        assert_eq!(detection.service_type, ServiceType::Containerized);
        assert_eq!(detection.warnings.len(), 1);
    }
}
