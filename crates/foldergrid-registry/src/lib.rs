//! foldergrid-registry — persisted service instances, detections, and the
//! deployment event log.
//!
//! Backed by [redb](https://docs.rs/redb). Domain types are JSON-serialized
//! into `&[u8]` value columns; composite keys (`{workspace_id}:{folder_path}`,
//! `{instance_id}:{seq}`) give ordered prefix scans.
//!
//! Every status change goes through [`RegistryStore::transition`], which
//! checks the lifecycle table in [`lifecycle`] and enforces the
//! container-reference and health invariants inside the same write
//! transaction.
//!
//! `RegistryStore` is `Clone + Send + Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod event_log;
pub mod lifecycle;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use event_log::EventLog;
pub use store::{RegistryStore, StatusChange};
pub use types::*;
