//! foldergrid-health — health checking for running service instances.
//!
//! # Architecture
//!
//! ```text
//! HealthScheduler (one tick every `interval`)
//!   ├── due queue: running instances whose last check is older than `interval`
//!   ├── Semaphore(workers) + JoinSet: bounded pool, per-check timeout,
//!   │   panics isolated per task
//!   │   └── probe_instance() → inspect, then process / tcp / http probe
//!   ├── HealthTracker per instance → HealthVerdict
//!   └── OrchestrationManager::apply_health (takes the instance lock)
//! ```
//!
//! Unhealthy polls count toward the instance's threshold and a healthy
//! poll resets the count. Polls that cannot reach the engine or the
//! container neither count nor reset; enough of them in a row degrade
//! the reported health to `unknown` without failing the instance.

pub mod checker;
pub mod scheduler;

pub use checker::{HealthTracker, ProbeResult, http_probe, probe_instance, tcp_probe};
pub use scheduler::{HealthScheduler, SweepReport};
