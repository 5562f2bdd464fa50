//! Folder scanner: lists a folder to a bounded depth and sniffs the
//! small text files the indicators need.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use foldergrid_core::workspace::{join_path, normalize_path};
use foldergrid_core::{ScannerSettings, Workspace};

use crate::error::AnalyzerResult;

/// File names whose content the detector and generator read.
const SNIFF_NAMES: &[&str] = &[
    "Dockerfile",
    "Containerfile",
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
    "package.json",
    "Procfile",
    "requirements.txt",
    "pyproject.toml",
    "Cargo.toml",
    "go.mod",
    ".env",
    ".env.example",
];

/// Extensions ambiguous enough that only content tells what they configure.
const SNIFF_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json", "ini", "cfg"];

/// One scanned file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedEntry {
    /// Path relative to the scanned folder, `/`-separated.
    pub relative_path: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub is_directory: bool,
    /// Leading bytes of the file as text, when sniffed.
    pub sniff: Option<String>,
}

impl ScannedEntry {
    pub fn depth(&self) -> usize {
        self.relative_path.split('/').count()
    }

    pub fn extension(&self) -> Option<&str> {
        if self.is_directory {
            return None;
        }
        self.name
            .rsplit_once('.')
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext)
    }
}

/// The flattened scan of one folder.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FolderScan {
    /// Workspace-relative path of the scanned folder (`""` = root).
    pub folder_path: String,
    pub entries: Vec<ScannedEntry>,
    /// Per-file problems that degraded the scan.
    pub warnings: Vec<String>,
    /// Set when the entry cap cut the listing short.
    pub truncated: bool,
}

impl FolderScan {
    /// Last path component, or `"workspace"` for the root.
    pub fn folder_name(&self) -> &str {
        self.folder_path
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or("workspace")
    }

    /// Files directly inside the folder.
    pub fn top_level_files(&self) -> impl Iterator<Item = &ScannedEntry> {
        self.entries
            .iter()
            .filter(|e| !e.is_directory && e.depth() == 1)
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.top_level_files().any(|e| e.name == name)
    }

    /// The first of `names` present at the top level.
    pub fn has_any_file<'a>(&self, names: &[&'a str]) -> Option<&'a str> {
        names.iter().copied().find(|n| self.has_file(n))
    }

    /// Sniffed content of a top-level file.
    pub fn sniff(&self, name: &str) -> Option<&str> {
        self.top_level_files()
            .find(|e| e.name == name)
            .and_then(|e| e.sniff.as_deref())
    }

    /// All sniffed contents anywhere in the folder.
    pub fn sniffs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|e| e.sniff.as_deref().map(|s| (e.relative_path.as_str(), s)))
    }

    /// Count files (any depth) with one of the given extensions.
    pub fn count_extensions(&self, exts: &[&str]) -> usize {
        self.entries
            .iter()
            .filter(|e| e.extension().is_some_and(|x| exts.contains(&x)))
            .count()
    }

    /// Immediate subfolders that can hold a service (hidden ones skipped).
    pub fn subfolders(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.is_directory && e.depth() == 1 && !e.name.starts_with('.'))
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Re-root the scan at an immediate subfolder.
    pub fn subfolder(&self, name: &str) -> FolderScan {
        let prefix = format!("{name}/");
        let entries = self
            .entries
            .iter()
            .filter_map(|e| {
                e.relative_path.strip_prefix(&prefix).map(|rest| ScannedEntry {
                    relative_path: rest.to_string(),
                    ..e.clone()
                })
            })
            .collect();
        let warnings = self
            .warnings
            .iter()
            .filter(|w| w.contains(&prefix))
            .cloned()
            .collect();
        FolderScan {
            folder_path: join_path(&self.folder_path, name),
            entries,
            warnings,
            truncated: self.truncated,
        }
    }

    /// SHA-256 over paths, sizes, and sniffed contents.
    ///
    /// Two scans of unchanged contents produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            hasher.update(entry.relative_path.as_bytes());
            hasher.update([0u8, entry.is_directory as u8]);
            hasher.update(entry.size.to_le_bytes());
            if let Some(sniff) = &entry.sniff {
                hasher.update(sniff.as_bytes());
            }
            hasher.update([0xffu8]);
        }
        hex::encode(hasher.finalize())
    }
}

/// Lists folders through a `Workspace` and sniffs interesting files.
#[derive(Clone)]
pub struct FolderScanner {
    workspace: Arc<dyn Workspace>,
    settings: ScannerSettings,
}

impl FolderScanner {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self::with_settings(workspace, ScannerSettings::default())
    }

    pub fn with_settings(workspace: Arc<dyn Workspace>, settings: ScannerSettings) -> Self {
        Self { workspace, settings }
    }

    pub fn settings(&self) -> &ScannerSettings {
        &self.settings
    }

    /// Scan a workspace-relative folder.
    ///
    /// Fails only when the folder itself is missing or the path is invalid;
    /// unreadable files lose their sniff and are recorded as warnings.
    pub fn scan(&self, folder: &str) -> AnalyzerResult<FolderScan> {
        let folder_path = normalize_path(folder)?;
        let mut listed = self.workspace.list(&folder_path, self.settings.max_depth)?;

        let mut warnings = Vec::new();
        let truncated = listed.len() > self.settings.max_entries;
        if truncated {
            listed.truncate(self.settings.max_entries);
            warnings.push(format!(
                "scan of '{folder_path}' truncated at {} entries",
                self.settings.max_entries
            ));
            warn!(folder = %folder_path, cap = self.settings.max_entries, "scan truncated");
        }

        let mut entries = Vec::with_capacity(listed.len());
        for item in listed {
            let sniff = if !item.is_directory && item.size > 0 && should_sniff(&item.name) {
                let path = join_path(&folder_path, &item.relative_path);
                match self.workspace.read_bytes(&path, self.settings.sniff_bytes) {
                    Ok(bytes) if bytes.contains(&0) => None,
                    Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                    Err(e) => {
                        warn!(file = %path, error = %e, "sniff skipped");
                        warnings.push(format!("sniff skipped for {}: {e}", item.relative_path));
                        None
                    }
                }
            } else {
                None
            };
            entries.push(ScannedEntry {
                relative_path: item.relative_path,
                name: item.name,
                size: item.size,
                content_type: item.content_type,
                is_directory: item.is_directory,
                sniff,
            });
        }

        debug!(folder = %folder_path, entries = entries.len(), warnings = warnings.len(), "folder scanned");
        Ok(FolderScan {
            folder_path,
            entries,
            warnings,
            truncated,
        })
    }
}

fn should_sniff(name: &str) -> bool {
    if SNIFF_NAMES.contains(&name) {
        return true;
    }
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| SNIFF_EXTENSIONS.contains(&ext))
}
