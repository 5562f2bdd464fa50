//! Lifecycle notifications published on a broadcast channel.

use serde::Serialize;

use foldergrid_core::epoch_millis;
use foldergrid_registry::{DeploymentEvent, EventType, ServiceStatus, StatusChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ServiceStatusChanged,
    DeploymentEventRecorded,
}

/// What subscribers see. Sending never blocks and a subscriber falling
/// behind only loses notifications, never lifecycle progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleNotification {
    pub kind: NotificationKind,
    pub instance_id: String,
    pub old_status: Option<ServiceStatus>,
    pub new_status: Option<ServiceStatus>,
    pub event_type: Option<EventType>,
    pub timestamp: u64,
}

impl LifecycleNotification {
    pub fn status_changed(change: &StatusChange) -> Self {
        Self {
            kind: NotificationKind::ServiceStatusChanged,
            instance_id: change.instance.id.clone(),
            old_status: Some(change.from),
            new_status: Some(change.instance.status),
            event_type: None,
            timestamp: change.instance.updated_at,
        }
    }

    pub fn event_recorded(event: &DeploymentEvent) -> Self {
        Self {
            kind: NotificationKind::DeploymentEventRecorded,
            instance_id: event.service_instance_id.clone(),
            old_status: None,
            new_status: None,
            event_type: Some(event.event_type),
            timestamp: epoch_millis().max(event.occurred_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldergrid_core::ServiceType;
    use foldergrid_registry::ServiceInstance;

    #[test]
    fn status_change_carries_both_states() {
        let mut instance = ServiceInstance::new("ws", "api", "api", ServiceType::Go);
        instance.status = ServiceStatus::Running;
        let change = StatusChange {
            from: ServiceStatus::Deploying,
            instance,
        };
        let note = LifecycleNotification::status_changed(&change);
        assert_eq!(note.kind, NotificationKind::ServiceStatusChanged);
        assert_eq!(note.old_status, Some(ServiceStatus::Deploying));
        assert_eq!(note.new_status, Some(ServiceStatus::Running));

        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["kind"], "service_status_changed");
        assert_eq!(json["new_status"], "running");
    }
}
