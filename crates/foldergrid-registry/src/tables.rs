//! redb table definitions for the Foldergrid registry.
//!
//! Document tables use `&str` keys and `&[u8]` values (JSON). The event log
//! is keyed by its own monotonic sequence number.

use redb::TableDefinition;

/// Service instances keyed by `{instance_id}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Folder uniqueness index: `{workspace_id}:{folder_path}` → instance id.
/// Removed instances drop out of this index.
pub const INSTANCE_PATHS: TableDefinition<&str, &str> = TableDefinition::new("instance_paths");

/// Current detection keyed by `{folder_path}`.
pub const DETECTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("detections");

/// Every detection ever computed, keyed by `{folder_path}@{version:010}`.
pub const DETECTION_HISTORY: TableDefinition<&str, &[u8]> =
    TableDefinition::new("detection_history");

/// Deployment events keyed by sequence number.
pub const EVENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("events");

/// Per-instance event index: `{instance_id}:{seq:020}` → sequence number.
pub const INSTANCE_EVENTS: TableDefinition<&str, u64> = TableDefinition::new("instance_events");
