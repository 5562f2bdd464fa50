//! Human-readable detection report.

use foldergrid_core::{BuildDescriptor, HealthProbe, TopologyDetection};

pub fn format_report(detection: &TopologyDetection) -> String {
    let mut out = String::new();

    out.push_str("\n╔══════════════════════════════════════════╗\n");
    out.push_str("║  Foldergrid Topology Detection           ║\n");
    out.push_str("╠══════════════════════════════════════════╣\n");
    out.push_str(&format!("║  Folder:     {:<28}║\n", display_folder(&detection.folder_path)));
    out.push_str(&format!("║  Type:       {:<28}║\n", detection.service_type.label()));
    out.push_str(&format!("║  Confidence: {:<28}║\n", format!("{:.0}%", detection.confidence * 100.0)));
    if detection.version > 0 {
        out.push_str(&format!("║  Version:    {:<28}║\n", detection.version));
    }
    out.push_str("╚══════════════════════════════════════════╝\n\n");

    if !detection.candidates.is_empty() {
        out.push_str("Candidates:\n");
        for c in &detection.candidates {
            out.push_str(&format!(
                "  {:<14} {:>4.0}%  {}\n",
                c.service_type.label(),
                c.score * 100.0,
                c.indicators.join(", ")
            ));
        }
        out.push('\n');
    }

    if !detection.children.is_empty() {
        out.push_str(&format!("Subfolders ({}):\n", detection.children.len()));
        for child in &detection.children {
            let marker = if child.service_type.is_known() { "✅" } else { "❔" };
            out.push_str(&format!(
                "  {marker} {:<20} {} ({:.0}%)\n",
                child.name,
                child.service_type.label(),
                child.confidence * 100.0
            ));
        }
        out.push('\n');
    }

    let edges: Vec<(&String, &String)> = detection
        .dependency_map
        .iter()
        .flat_map(|(from, deps)| deps.iter().map(move |to| (from, to)))
        .collect();
    if !edges.is_empty() {
        out.push_str("Dependencies:\n");
        for (from, to) in edges {
            out.push_str(&format!("  {from} → {to}\n"));
        }
        out.push('\n');
    }

    if !detection.conflicts.is_empty() {
        out.push_str("⚠️  SUPPRESSED EDGES:\n");
        for conflict in &detection.conflicts {
            out.push_str(&format!("  • {conflict}\n"));
        }
        out.push('\n');
    }

    if !detection.warnings.is_empty() {
        out.push_str("⚠️  WARNINGS:\n");
        for warning in &detection.warnings {
            out.push_str(&format!("  • {warning}\n"));
        }
        out.push('\n');
    }

    if let Some(config) = &detection.recommended_config {
        out.push_str("RECOMMENDED DEPLOYMENT:\n\n");
        match &config.build.descriptor {
            BuildDescriptor::Explicit { path } => {
                out.push_str(&format!("  Build:   {path} in {}\n", display_folder(&config.build.context)));
            }
            BuildDescriptor::Synthesized {
                base_image,
                install_command,
                start_command,
            } => {
                out.push_str(&format!("  Image:   {base_image} (synthesized)\n"));
                if let Some(install) = install_command {
                    out.push_str(&format!("  Install: {install}\n"));
                }
                out.push_str(&format!("  Start:   {start_command}\n"));
            }
        }
        if !config.ports.is_empty() {
            let ports: Vec<String> = config.ports.iter().map(|p| p.container_port.to_string()).collect();
            out.push_str(&format!("  Ports:   {}\n", ports.join(", ")));
        }
        let probe = match &config.health_check.probe {
            HealthProbe::Http { path, port } => format!("http :{port}{path}"),
            HealthProbe::Tcp { port } => format!("tcp :{port}"),
            HealthProbe::Process => "process".to_string(),
        };
        out.push_str(&format!("  Health:  {probe} every {}s\n", config.health_check.interval_secs));
        out.push_str(&format!(
            "  Limits:  {} MB, {} mCPU\n",
            config.resources.memory_mb, config.resources.cpu_millis
        ));
        if config.low_confidence {
            out.push_str("  ⚠️  descriptor was inferred; review before deploying\n");
        }
    }

    out
}

fn display_folder(path: &str) -> &str {
    if path.is_empty() { "." } else { path }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TopologyDetector;
    use crate::scanner::tests::scan_of;

    #[test]
    fn report_lists_type_and_recommendation() {
        let scan = scan_of(&[("svc/Dockerfile", "FROM alpine\nEXPOSE 8080\n")], "svc");
        let report = format_report(&TopologyDetector::default().detect(&scan));
        assert!(report.contains("containerized"));
        assert!(report.contains("Dockerfile in svc"));
        assert!(report.contains("tcp :8080"));
    }

    #[test]
    fn report_shows_composite_edges() {
        let scan = scan_of(
            &[
                ("shop/api/Dockerfile", "FROM alpine"),
                ("shop/web/index.html", "<a href=\"http://api/\">api</a>"),
            ],
            "shop",
        );
        let report = format_report(&TopologyDetector::default().detect(&scan));
        assert!(report.contains("Subfolders (2)"));
        assert!(report.contains("shop → shop/api"));
    }
}
