//! RegistryStore: redb-backed persistence for service instances,
//! topology detections, and deployment events.
//!
//! Values are JSON in `&[u8]` columns. Each public write is a single redb
//! write transaction, so uniqueness checks, lifecycle checks, and sequence
//! allocation are atomic with the write they guard.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use foldergrid_core::{TopologyDetection, epoch_millis};

use crate::error::{RegistryError, RegistryResult};
use crate::lifecycle::apply_transition;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `RegistryError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| RegistryError::$variant(e.to_string())
    };
}

fn encode<T: Serialize>(value: &T) -> RegistryResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> RegistryResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Outcome of a successful status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub from: ServiceStatus,
    pub instance: ServiceInstance,
}

/// Thread-safe registry backed by redb.
#[derive(Clone)]
pub struct RegistryStore {
    db: Arc<Database>,
}

impl RegistryStore {
    /// Open (or create) a persistent registry at the given path.
    pub fn open(path: &Path) -> RegistryResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "registry opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory registry (for testing).
    pub fn open_in_memory() -> RegistryResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory registry opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> RegistryResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.open_table(INSTANCE_PATHS).map_err(map_err!(Table))?;
        txn.open_table(DETECTIONS).map_err(map_err!(Table))?;
        txn.open_table(DETECTION_HISTORY).map_err(map_err!(Table))?;
        txn.open_table(EVENTS).map_err(map_err!(Table))?;
        txn.open_table(INSTANCE_EVENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Insert a new instance. Fails with `Conflict` when another live
    /// instance already owns the same workspace folder.
    pub fn create_instance(&self, instance: &ServiceInstance) -> RegistryResult<()> {
        let path_key = instance.path_key();
        let value = encode(instance)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut paths = txn.open_table(INSTANCE_PATHS).map_err(map_err!(Table))?;
            if let Some(owner) = paths.get(path_key.as_str()).map_err(map_err!(Read))? {
                return Err(RegistryError::Conflict(format!(
                    "folder '{}' is already registered as instance {}",
                    instance.folder_path,
                    owner.value()
                )));
            }
            let mut instances = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            if instances
                .get(instance.id.as_str())
                .map_err(map_err!(Read))?
                .is_some()
            {
                return Err(RegistryError::Conflict(format!(
                    "instance {} already exists",
                    instance.id
                )));
            }
            instances
                .insert(instance.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            if !instance.status.is_terminal() {
                paths
                    .insert(path_key.as_str(), instance.id.as_str())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(id = %instance.id, folder = %instance.folder_path, "instance created");
        Ok(())
    }

    pub fn get_instance(&self, id: &str) -> RegistryResult<Option<ServiceInstance>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Like `get_instance`, but a missing id is an error.
    pub fn require_instance(&self, id: &str) -> RegistryResult<ServiceInstance> {
        self.get_instance(id)?
            .ok_or_else(|| RegistryError::NotFound(format!("instance {id}")))
    }

    /// The live instance registered for a folder, if any.
    pub fn find_by_path(
        &self,
        workspace_id: &str,
        folder_path: &str,
    ) -> RegistryResult<Option<ServiceInstance>> {
        let key = path_key(workspace_id, folder_path);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let paths = txn.open_table(INSTANCE_PATHS).map_err(map_err!(Table))?;
        let Some(id) = paths.get(key.as_str()).map_err(map_err!(Read))? else {
            return Ok(None);
        };
        let instances = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        match instances.get(id.value()).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn list_instances(&self) -> RegistryResult<Vec<ServiceInstance>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    pub fn list_by_status(&self, status: ServiceStatus) -> RegistryResult<Vec<ServiceInstance>> {
        Ok(self
            .list_instances()?
            .into_iter()
            .filter(|i| i.status == status)
            .collect())
    }

    /// Live child instances of a composite.
    pub fn list_children(&self, parent_id: &str) -> RegistryResult<Vec<ServiceInstance>> {
        Ok(self
            .list_instances()?
            .into_iter()
            .filter(|i| i.parent_service_id.as_deref() == Some(parent_id))
            .filter(|i| !i.status.is_terminal())
            .collect())
    }

    /// Read-modify-write of fields other than `status`.
    ///
    /// Status, id, and folder are restored if the closure touches them;
    /// use `transition` to change status.
    pub fn update_instance<F>(&self, id: &str, mutate: F) -> RegistryResult<ServiceInstance>
    where
        F: FnOnce(&mut ServiceInstance) -> RegistryResult<()>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated = {
            let mut instance = read_instance(&txn, id)?;
            let (status, folder, workspace) = (
                instance.status,
                instance.folder_path.clone(),
                instance.workspace_id.clone(),
            );
            mutate(&mut instance)?;
            instance.id = id.to_string();
            instance.status = status;
            instance.folder_path = folder;
            instance.workspace_id = workspace;
            instance.updated_at = epoch_millis();
            write_instance(&txn, &instance)?;
            instance
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%id, "instance updated");
        Ok(updated)
    }

    /// Move an instance to `to`, then let `mutate` fill in the fields that
    /// accompany the new state. Both happen in one write transaction; on any
    /// error the stored row is unchanged.
    ///
    /// `detecting → deployable` additionally requires a current detection
    /// of a known type for the instance's folder. Moving to `removed`
    /// releases the folder for a new registration.
    pub fn transition<F>(&self, id: &str, to: ServiceStatus, mutate: F) -> RegistryResult<StatusChange>
    where
        F: FnOnce(&mut ServiceInstance),
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let change = {
            let mut instance = read_instance(&txn, id)?;

            if instance.status == ServiceStatus::Detecting && to == ServiceStatus::Deployable {
                let detections = txn.open_table(DETECTIONS).map_err(map_err!(Table))?;
                let current: Option<TopologyDetection> =
                    match detections.get(instance.folder_path.as_str()).map_err(map_err!(Read))? {
                        Some(guard) => Some(decode(guard.value())?),
                        None => None,
                    };
                match current {
                    Some(d) if d.is_deployable() => {}
                    Some(d) => {
                        return Err(RegistryError::Precondition(format!(
                            "folder '{}' is classified as {}",
                            instance.folder_path, d.service_type
                        )));
                    }
                    None => {
                        return Err(RegistryError::Precondition(format!(
                            "folder '{}' has no current detection",
                            instance.folder_path
                        )));
                    }
                }
            }

            let from = apply_transition(&mut instance, to, epoch_millis())?;
            mutate(&mut instance);
            // mutate may not smuggle a reference into a non-container state
            if !instance.status.holds_container() {
                instance.container_reference = None;
            }
            write_instance(&txn, &instance)?;

            if to == ServiceStatus::Removed {
                let mut paths = txn.open_table(INSTANCE_PATHS).map_err(map_err!(Table))?;
                let key = instance.path_key();
                let owned = paths
                    .get(key.as_str())
                    .map_err(map_err!(Read))?
                    .is_some_and(|owner| owner.value() == instance.id);
                if owned {
                    paths.remove(key.as_str()).map_err(map_err!(Write))?;
                }
            }
            StatusChange { from, instance }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%id, from = %change.from, %to, "instance transitioned");
        Ok(change)
    }

    // ── Detections ─────────────────────────────────────────────────

    /// Record a new detection as current for its folder and append it to
    /// the history. Assigns `version` and `id`.
    pub fn upsert_detection(&self, detection: &TopologyDetection) -> RegistryResult<TopologyDetection> {
        let mut detection = detection.clone();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut current = txn.open_table(DETECTIONS).map_err(map_err!(Table))?;
            let previous: Option<TopologyDetection> =
                match current.get(detection.folder_path.as_str()).map_err(map_err!(Read))? {
                    Some(guard) => Some(decode(guard.value())?),
                    None => None,
                };
            detection.version = previous.map(|p| p.version + 1).unwrap_or(1);
            let short = detection
                .fingerprint
                .get(..16)
                .unwrap_or(detection.fingerprint.as_str());
            detection.id = format!("{short}-v{}", detection.version);

            let value = encode(&detection)?;
            current
                .insert(detection.folder_path.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;

            let mut history = txn.open_table(DETECTION_HISTORY).map_err(map_err!(Table))?;
            let key = history_key(&detection.folder_path, detection.version);
            history
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(folder = %detection.folder_path, version = detection.version, "detection stored");
        Ok(detection)
    }

    pub fn get_detection(&self, folder_path: &str) -> RegistryResult<Option<TopologyDetection>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DETECTIONS).map_err(map_err!(Table))?;
        match table.get(folder_path).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Every detection recorded for a folder, oldest first.
    pub fn detection_history(&self, folder_path: &str) -> RegistryResult<Vec<TopologyDetection>> {
        let start = format!("{folder_path}@");
        let end = format!("{folder_path}A");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DETECTION_HISTORY).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    // ── Events ─────────────────────────────────────────────────────

    /// Append an event, assigning the next sequence number.
    pub fn append_event(&self, event: &DeploymentEvent) -> RegistryResult<DeploymentEvent> {
        let mut event = event.clone();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut events = txn.open_table(EVENTS).map_err(map_err!(Table))?;
            let next = events
                .last()
                .map_err(map_err!(Read))?
                .map(|(seq, _)| seq.value() + 1)
                .unwrap_or(1);
            event.id = next;
            let value = encode(&event)?;
            events.insert(next, value.as_slice()).map_err(map_err!(Write))?;

            let mut index = txn.open_table(INSTANCE_EVENTS).map_err(map_err!(Table))?;
            let key = event_key(&event.service_instance_id, next);
            index.insert(key.as_str(), next).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(seq = event.id, instance = %event.service_instance_id, event = %event.event_type, "event appended");
        Ok(event)
    }

    /// Events for one instance, most recent first.
    pub fn events_for_instance(&self, instance_id: &str, limit: usize) -> RegistryResult<Vec<DeploymentEvent>> {
        let start = format!("{instance_id}:");
        let end = format!("{instance_id};");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index = txn.open_table(INSTANCE_EVENTS).map_err(map_err!(Table))?;
        let events = txn.open_table(EVENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in index
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
            .rev()
            .take(limit)
        {
            let (_, seq) = entry.map_err(map_err!(Read))?;
            if let Some(guard) = events.get(seq.value()).map_err(map_err!(Read))? {
                results.push(decode(guard.value())?);
            }
        }
        Ok(results)
    }

    /// Most recent events across all instances, newest first.
    pub fn recent_events(&self, limit: usize) -> RegistryResult<Vec<DeploymentEvent>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev().take(limit) {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }
}

fn read_instance(txn: &WriteTransaction, id: &str) -> RegistryResult<ServiceInstance> {
    let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
    let guard = table
        .get(id)
        .map_err(map_err!(Read))?
        .ok_or_else(|| RegistryError::NotFound(format!("instance {id}")))?;
    decode(guard.value())
}

fn write_instance(txn: &WriteTransaction, instance: &ServiceInstance) -> RegistryResult<()> {
    let value = encode(instance)?;
    let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
    table
        .insert(instance.id.as_str(), value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}

fn history_key(folder_path: &str, version: u32) -> String {
    format!("{folder_path}@{version:010}")
}

fn event_key(instance_id: &str, seq: u64) -> String {
    format!("{instance_id}:{seq:020}")
}
