//! Wiring of the workspace, registry, orchestrator and analyzer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use foldergrid_analyzer::{FolderScanner, TopologyDetector};
use foldergrid_core::{FoldergridConfig, LocalWorkspace};
use foldergrid_orchestrator::{DockerCliEngine, OrchestrationManager, TopologyService};
use foldergrid_registry::RegistryStore;

const CONFIG_FILE: &str = "foldergrid.toml";

pub struct App {
    pub config: FoldergridConfig,
    pub root: PathBuf,
    pub scanner: FolderScanner,
    pub manager: Arc<OrchestrationManager>,
    pub topology: TopologyService,
}

impl App {
    pub fn open(workspace: &Path, data_dir: &Path, config: Option<&Path>) -> anyhow::Result<Self> {
        let root = workspace
            .canonicalize()
            .with_context(|| format!("workspace {} not found", workspace.display()))?;
        let config = load_config(&root, config)?;

        let data_dir = if data_dir.is_absolute() {
            data_dir.to_path_buf()
        } else {
            root.join(data_dir)
        };
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("cannot create {}", data_dir.display()))?;
        let db_path = config.store_path(&data_dir);
        let store = RegistryStore::open(&db_path)
            .with_context(|| format!("cannot open registry at {}", db_path.display()))?;
        let workspace_id = workspace_id(&root);
        debug!(path = ?db_path, %workspace_id, "registry opened");

        let scanner = FolderScanner::with_settings(
            Arc::new(LocalWorkspace::new(&root)),
            config.scanner_settings(),
        );
        let detector = TopologyDetector::new(config.acceptance_threshold());
        let manager = Arc::new(
            OrchestrationManager::new(store, Arc::new(DockerCliEngine::new()), &root, workspace_id)
                .with_policy(config.engine_policy()),
        );
        let topology = TopologyService::new(scanner.clone(), detector, manager.clone());
        info!(root = %root.display(), "workspace opened");

        Ok(Self {
            config,
            root,
            scanner,
            manager,
            topology,
        })
    }
}

/// An explicit config path must exist; otherwise `foldergrid.toml` in the
/// workspace root is used when present.
fn load_config(root: &Path, explicit: Option<&Path>) -> anyhow::Result<FoldergridConfig> {
    if let Some(path) = explicit {
        return FoldergridConfig::from_file(path)
            .with_context(|| format!("cannot load config {}", path.display()));
    }
    let default = root.join(CONFIG_FILE);
    if default.is_file() {
        return FoldergridConfig::from_file(&default)
            .with_context(|| format!("cannot load config {}", default.display()));
    }
    Ok(FoldergridConfig::default())
}

/// Stable id of a workspace, derived from its canonical root path.
fn workspace_id(root: &Path) -> String {
    let digest = Sha256::digest(root.to_string_lossy().as_bytes());
    hex::encode(&digest[..6])
}
