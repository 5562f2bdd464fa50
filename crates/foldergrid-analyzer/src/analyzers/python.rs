//! Python indicators.

use foldergrid_core::ServiceType;

use super::{Vote, cluster_vote, port_in_text};
use crate::scanner::FolderScan;

pub const ENTRY_FILES: &[&str] = &["app.py", "main.py", "manage.py", "wsgi.py", "asgi.py"];

pub fn votes(scan: &FolderScan) -> Vec<Vote> {
    let mut votes = Vec::new();
    for (file, weight) in [
        ("requirements.txt", 0.55),
        ("pyproject.toml", 0.55),
        ("Pipfile", 0.5),
        ("setup.py", 0.4),
    ] {
        if scan.has_file(file) {
            votes.push(Vote::new(ServiceType::Python, weight, file));
        }
    }
    if let Some(entry) = scan.has_any_file(ENTRY_FILES) {
        votes.push(Vote::new(ServiceType::Python, 0.2, entry));
    }
    votes.extend(cluster_vote(scan, ServiceType::Python, &["py"], 0.15));
    votes
}

/// The `web:` process from a Procfile.
pub fn procfile_web(scan: &FolderScan) -> Option<String> {
    scan.sniff("Procfile")?
        .lines()
        .find_map(|l| l.trim().strip_prefix("web:"))
        .map(|cmd| cmd.trim().to_string())
        .filter(|cmd| !cmd.is_empty())
}

/// Start command and port for a Python service, best effort.
pub fn start_command(scan: &FolderScan) -> Option<(String, Option<u16>)> {
    if let Some(cmd) = procfile_web(scan) {
        let port = port_in_text(&cmd);
        return Some((cmd, port));
    }
    if scan.has_file("manage.py") {
        return Some((
            "python manage.py runserver 0.0.0.0:8000".to_string(),
            Some(8000),
        ));
    }
    scan.has_any_file(&["app.py", "main.py"])
        .map(|entry| (format!("python {entry}"), None))
}

/// Dependency install command for the manifest present.
pub fn install_command(scan: &FolderScan) -> Option<String> {
    if scan.has_file("requirements.txt") {
        Some("pip install --no-cache-dir -r requirements.txt".to_string())
    } else if scan.has_file("pyproject.toml") || scan.has_file("setup.py") {
        Some("pip install --no-cache-dir .".to_string())
    } else if scan.has_file("Pipfile") {
        Some("pip install pipenv && pipenv install --system --deploy".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::tests::scan_of;

    #[test]
    fn procfile_drives_start_command() {
        let scan = scan_of(
            &[
                ("api/requirements.txt", "flask"),
                ("api/Procfile", "web: gunicorn app:app --bind 0.0.0.0:5000\n"),
                ("api/app.py", ""),
            ],
            "api",
        );
        let (cmd, port) = start_command(&scan).unwrap();
        assert!(cmd.starts_with("gunicorn"));
        assert_eq!(port, Some(5000));
    }

    #[test]
    fn manage_py_means_django() {
        let scan = scan_of(&[("site/manage.py", ""), ("site/requirements.txt", "django")], "site");
        let (cmd, port) = start_command(&scan).unwrap();
        assert!(cmd.contains("runserver"));
        assert_eq!(port, Some(8000));
    }

    #[test]
    fn no_entry_point_means_no_start_command() {
        let scan = scan_of(&[("lib/requirements.txt", "requests")], "lib");
        assert!(start_command(&scan).is_none());
        assert_eq!(votes(&scan).len(), 1);
    }
}
