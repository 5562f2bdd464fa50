//! Workspace access: the directory-listing and read-bytes surface the
//! scanner consumes.
//!
//! Paths handed to a `Workspace` are workspace-relative with `/`
//! separators. Absolute paths and `..` components are rejected before any
//! filesystem access happens.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directories that never contain deployable sources of their own.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "__pycache__",
    "vendor",
    ".venv",
    "venv",
    "dist",
    ".foldergrid",
];

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("path not found in workspace: {0}")]
    NotFound(String),

    #[error("invalid workspace path: {0}")]
    InvalidPath(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// One listed file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceEntry {
    /// Path relative to the listed folder, `/`-separated.
    pub relative_path: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub is_directory: bool,
}

impl WorkspaceEntry {
    /// Number of path components below the listed folder (1 = direct child).
    pub fn depth(&self) -> usize {
        self.relative_path.split('/').count()
    }
}

/// Read-only view of a workspace's files.
pub trait Workspace: Send + Sync {
    /// List a folder's contents down to `max_depth` levels.
    fn list(&self, folder: &str, max_depth: usize) -> Result<Vec<WorkspaceEntry>, WorkspaceError>;

    /// Read at most `limit` bytes from the start of a file.
    fn read_bytes(&self, path: &str, limit: usize) -> Result<Vec<u8>, WorkspaceError>;
}

/// Normalize a workspace-relative folder path.
///
/// `""`, `"."` and `"/"`-trimmed variants all denote the workspace root.
pub fn normalize_path(path: &str) -> Result<String, WorkspaceError> {
    if path.starts_with('/') || path.contains('\\') {
        return Err(WorkspaceError::InvalidPath(path.to_string()));
    }
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(WorkspaceError::InvalidPath(path.to_string())),
            p => parts.push(p),
        }
    }
    Ok(parts.join("/"))
}

/// Join a folder and a child name into a workspace-relative path.
pub fn join_path(folder: &str, child: &str) -> String {
    if folder.is_empty() {
        child.to_string()
    } else {
        format!("{folder}/{child}")
    }
}

/// Guess a content type from a file name.
pub fn content_type_for(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if matches!(lower.as_str(), "dockerfile" | "containerfile") || lower.ends_with(".dockerfile") {
        return "text/x-dockerfile";
    }
    if matches!(lower.as_str(), "procfile" | "makefile" | ".env") || lower.starts_with(".env.") {
        return "text/plain";
    }
    match lower.rsplit_once('.').map(|(_, ext)| ext) {
        Some("json") => "application/json",
        Some("toml") => "application/toml",
        Some("yaml" | "yml") => "application/yaml",
        Some("js" | "mjs" | "cjs") => "text/javascript",
        Some("ts" | "tsx") => "text/typescript",
        Some("py") => "text/x-python",
        Some("go") => "text/x-go",
        Some("rs") => "text/x-rust",
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("md") => "text/markdown",
        Some("txt" | "lock" | "mod" | "sum" | "cfg" | "ini") => "text/plain",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// A workspace rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<(String, PathBuf), WorkspaceError> {
        let normalized = normalize_path(path)?;
        let full = if normalized.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&normalized)
        };
        Ok((normalized, full))
    }
}

impl Workspace for LocalWorkspace {
    fn list(&self, folder: &str, max_depth: usize) -> Result<Vec<WorkspaceEntry>, WorkspaceError> {
        let (normalized, base) = self.resolve(folder)?;
        if !base.is_dir() {
            return Err(WorkspaceError::NotFound(normalized));
        }

        let walker = WalkDir::new(&base)
            .min_depth(1)
            .max_depth(max_depth.max(1))
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && e.file_name()
                        .to_str()
                        .is_some_and(|n| EXCLUDED_DIRS.contains(&n)))
            });

        let mut entries = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(folder = %normalized, error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let Ok(rel) = entry.path().strip_prefix(&base) else {
                continue;
            };
            let relative_path = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let name = entry.file_name().to_string_lossy().to_string();
            let is_directory = entry.file_type().is_dir();
            let size = if is_directory {
                0
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            };
            let content_type = if is_directory {
                "inode/directory".to_string()
            } else {
                content_type_for(&name).to_string()
            };
            entries.push(WorkspaceEntry {
                relative_path,
                name,
                size,
                content_type,
                is_directory,
            });
        }

        debug!(folder = %normalized, count = entries.len(), "folder listed");
        Ok(entries)
    }

    fn read_bytes(&self, path: &str, limit: usize) -> Result<Vec<u8>, WorkspaceError> {
        let (normalized, full) = self.resolve(path)?;
        let file = File::open(&full).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => WorkspaceError::NotFound(normalized.clone()),
            _ => WorkspaceError::Io {
                path: normalized.clone(),
                source: e,
            },
        })?;
        let mut buf = Vec::new();
        file.take(limit as u64)
            .read_to_end(&mut buf)
            .map_err(|e| WorkspaceError::Io {
                path: normalized,
                source: e,
            })?;
        Ok(buf)
    }
}
