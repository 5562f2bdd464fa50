//! Append-only deployment event log.
//!
//! A narrow view over the registry's event tables: there is no way to
//! update or delete an event through this type.

use crate::error::RegistryResult;
use crate::store::RegistryStore;
use crate::types::DeploymentEvent;

#[derive(Clone)]
pub struct EventLog {
    store: RegistryStore,
}

impl EventLog {
    pub fn new(store: RegistryStore) -> Self {
        Self { store }
    }

    /// Append and return the stored event with its sequence number.
    pub fn append(&self, event: DeploymentEvent) -> RegistryResult<DeploymentEvent> {
        self.store.append_event(&event)
    }

    /// Most recent first.
    pub fn for_instance(&self, instance_id: &str, limit: usize) -> RegistryResult<Vec<DeploymentEvent>> {
        self.store.events_for_instance(instance_id, limit)
    }

    /// Most recent first, across all instances.
    pub fn recent(&self, limit: usize) -> RegistryResult<Vec<DeploymentEvent>> {
        self.store.recent_events(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;
    use serde_json::json;

    #[test]
    fn append_assigns_sequence_and_keeps_payload() {
        let log = EventLog::new(RegistryStore::open_in_memory().unwrap());
        let stored = log
            .append(
                DeploymentEvent::new("inst-1", EventType::DeploymentFailed)
                    .with_error("build exceeded 120s")
                    .with_payload(json!({ "phase": "build" }))
                    .timed_out(true)
                    .with_duration_ms(120_000),
            )
            .unwrap();

        assert_eq!(stored.id, 1);
        let read = log.for_instance("inst-1", 5).unwrap();
        assert_eq!(read, vec![stored]);
        assert!(read[0].timed_out);
        assert_eq!(read[0].payload["phase"], "build");
    }

    #[test]
    fn recent_respects_limit() {
        let log = EventLog::new(RegistryStore::open_in_memory().unwrap());
        for i in 0..5 {
            log.append(DeploymentEvent::new(format!("inst-{i}"), EventType::ServiceStarted))
                .unwrap();
        }
        let recent = log.recent(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].service_instance_id, "inst-4");
    }
}
