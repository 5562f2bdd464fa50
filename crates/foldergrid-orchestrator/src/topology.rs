//! Re-analysis of folders and registration of the services found in them.

use std::sync::Arc;

use tracing::{info, warn};

use foldergrid_analyzer::{FolderScanner, TopologyDetector};
use foldergrid_core::{ServiceType, TopologyDetection};
use foldergrid_registry::{RegistryStore, ServiceInstance};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::manager::OrchestrationManager;

pub struct TopologyService {
    scanner: FolderScanner,
    detector: TopologyDetector,
    store: RegistryStore,
    manager: Arc<OrchestrationManager>,
}

impl TopologyService {
    pub fn new(
        scanner: FolderScanner,
        detector: TopologyDetector,
        manager: Arc<OrchestrationManager>,
    ) -> Self {
        Self {
            scanner,
            detector,
            store: manager.store().clone(),
            manager,
        }
    }

    /// Scan and classify a folder, then record the result as its current
    /// detection. A composite's children get their own detections too.
    ///
    /// Instances registered for the folder pick up the new classification;
    /// one that is mid-operation keeps its old one until the next analysis.
    pub fn reanalyze(&self, folder: &str) -> OrchestratorResult<TopologyDetection> {
        let stored = self.analyze_one(folder)?;
        if stored.service_type == ServiceType::Composite {
            for child in &stored.children {
                self.analyze_one(&child.folder_path)?;
            }
        }
        Ok(stored)
    }

    fn analyze_one(&self, folder: &str) -> OrchestratorResult<TopologyDetection> {
        let scan = self.scanner.scan(folder)?;
        let detection = self.detector.detect(&scan);
        let stored = self.store.upsert_detection(&detection)?;
        info!(
            folder = %stored.folder_path,
            service_type = %stored.service_type,
            confidence = stored.confidence,
            version = stored.version,
            "folder analyzed"
        );

        let existing = self
            .store
            .find_by_path(self.manager.workspace_id(), &stored.folder_path)?;
        if let Some(instance) = existing {
            match self.manager.apply_detection(&instance.id, &stored) {
                Ok(_) => {}
                Err(OrchestratorError::Conflict(reason)) => {
                    warn!(id = %instance.id, %reason, "instance busy; detection not applied");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(stored)
    }

    /// Register the folder and, for a composite, each of its children.
    ///
    /// Folders that already have a live instance are not registered again;
    /// their existing instances are returned in place. The folder's own
    /// instance comes first.
    pub fn register_services(&self, folder: &str) -> OrchestratorResult<Vec<ServiceInstance>> {
        let detection = self.reanalyze(folder)?;
        let parent = self.register_or_existing(&detection.folder_path, None)?;
        let mut instances = vec![parent.clone()];
        if detection.service_type == ServiceType::Composite {
            for child in &detection.children {
                instances.push(self.register_or_existing(&child.folder_path, Some(&parent.id))?);
            }
        }
        Ok(instances)
    }

    fn register_or_existing(
        &self,
        folder: &str,
        parent_id: Option<&str>,
    ) -> OrchestratorResult<ServiceInstance> {
        match self.store.find_by_path(self.manager.workspace_id(), folder)? {
            Some(existing) => Ok(existing),
            None => self.manager.register(folder, parent_id),
        }
    }
}
