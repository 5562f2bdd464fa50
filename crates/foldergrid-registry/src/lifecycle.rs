//! Service instance lifecycle.
//!
//! ```text
//! detecting ──► deployable ──► deploying ──► running ◄──► stopped
//!                                 ▲   │        │  ▲
//!                                 │   ▼        ▼  │
//!                               error ◄───── scaling
//! ```
//!
//! Any non-terminal state may also move to `error` or `removed`.
//! `removed` is terminal.

use foldergrid_core::HealthStatus;

use crate::error::{RegistryError, RegistryResult};
use crate::types::{ServiceInstance, ServiceStatus};

/// Whether `from → to` is a lifecycle edge.
pub fn is_valid_transition(from: ServiceStatus, to: ServiceStatus) -> bool {
    use ServiceStatus::*;

    if from.is_terminal() || from == to {
        return false;
    }
    matches!(
        (from, to),
        (Detecting, Deployable)
            | (Deployable | Error, Deploying)
            | (Deploying, Running)
            | (Running, Stopped)
            | (Stopped, Running)
            | (Running, Scaling)
            | (Scaling, Running)
            | (_, Error)
            | (_, Removed)
    )
}

pub fn check_transition(from: ServiceStatus, to: ServiceStatus) -> RegistryResult<()> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(RegistryError::InvalidTransition { from, to })
    }
}

/// Move `instance` to `to` and restore the status invariants.
///
/// The container reference survives only in container-holding states and
/// health is only tracked while running.
pub fn apply_transition(
    instance: &mut ServiceInstance,
    to: ServiceStatus,
    now: u64,
) -> RegistryResult<ServiceStatus> {
    let from = instance.status;
    check_transition(from, to)?;

    instance.status = to;
    instance.updated_at = now;
    if !to.holds_container() {
        instance.container_reference = None;
    }
    if to != ServiceStatus::Running {
        instance.health_status = HealthStatus::Unknown;
    }
    if to != ServiceStatus::Error && to != ServiceStatus::Removed {
        instance.error_message = None;
    }
    Ok(from)
}
