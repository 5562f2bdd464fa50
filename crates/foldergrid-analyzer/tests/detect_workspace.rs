//! Detection against a real directory tree through `LocalWorkspace`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use foldergrid_analyzer::{AnalyzerError, FolderScanner, TopologyDetector};
use foldergrid_core::{LocalWorkspace, ServiceType};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn scanner(root: &Path) -> FolderScanner {
    FolderScanner::new(Arc::new(LocalWorkspace::new(root)))
}

#[test]
fn composite_with_a_sibling_reference() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "shop/api/Dockerfile", "FROM python:3.12-slim\nEXPOSE 5000\n");
    write(
        root,
        "shop/web/package.json",
        r#"{"name":"web","scripts":{"start":"node server.js"}}"#,
    );
    write(root, "shop/web/server.js", "");
    write(root, "shop/web/config.json", r#"{"backend":"http://api:5000/v1"}"#);

    let scan = scanner(root).scan("shop").unwrap();
    let detection = TopologyDetector::default().detect(&scan);

    assert_eq!(detection.service_type, ServiceType::Composite);
    assert!(detection.recommended_config.is_none());
    assert_eq!(detection.children.len(), 2);

    let api = detection.children.iter().find(|c| c.name == "api").unwrap();
    assert_eq!(api.service_type, ServiceType::Containerized);
    assert_eq!(
        api.recommended_config.as_ref().and_then(|c| c.primary_port()),
        Some(5000)
    );
    let web = detection.children.iter().find(|c| c.name == "web").unwrap();
    assert_eq!(web.service_type, ServiceType::Node);

    let web_deps = &detection.dependency_map[&web.folder_path];
    assert!(web_deps.contains(&api.folder_path));
    assert!(detection.conflicts.is_empty());
}

#[test]
fn excluded_directories_are_not_scanned() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "site/index.html", "<html></html>");
    write(root, "site/node_modules/left-pad/package.json", "{}");
    write(root, "site/.foldergrid/registry.redb", "");

    let scan = scanner(root).scan("site").unwrap();
    assert!(
        scan.entries
            .iter()
            .all(|e| !e.relative_path.starts_with("node_modules")
                && !e.relative_path.starts_with(".foldergrid"))
    );
    assert!(scan.entries.iter().any(|e| e.name == "index.html"));
}

#[test]
fn unchanged_tree_keeps_its_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "svc/go.mod", "module example.com/svc\n");
    write(root, "svc/main.go", "package main\n");

    let scanner = scanner(root);
    let first = scanner.scan("svc").unwrap().fingerprint();
    assert_eq!(scanner.scan("svc").unwrap().fingerprint(), first);

    write(root, "svc/handler.go", "package main\n");
    assert_ne!(scanner.scan("svc").unwrap().fingerprint(), first);
}

#[test]
fn missing_folder_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = scanner(dir.path()).scan("nowhere").unwrap_err();
    assert!(matches!(err, AnalyzerError::NotFound(_)));
}
