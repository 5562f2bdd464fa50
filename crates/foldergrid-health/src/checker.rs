//! Health probes and per-instance failure tracking.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, warn};

use foldergrid_core::{HealthProbe, HealthSettings, HealthStatus};
use foldergrid_orchestrator::{ContainerEngine, ContainerReport, EngineError, HealthVerdict};
use foldergrid_registry::ServiceInstance;

/// Host the engine publishes container ports on.
const PROBE_HOST: &str = "127.0.0.1";

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The service answered as expected.
    Healthy,
    /// The container is down, refuses connections, or answered non-2xx.
    Unhealthy,
    /// The engine or the probe itself did not answer in time.
    Unreachable,
    /// The engine no longer knows the container.
    Gone,
}

/// Tracks consecutive probe results for a single instance.
#[derive(Debug)]
pub struct HealthTracker {
    status: HealthStatus,
    consecutive_failures: u32,
    consecutive_unreachable: u32,
    unhealthy_threshold: u32,
    unreachable_threshold: u32,
}

impl HealthTracker {
    pub fn new(settings: &HealthSettings) -> Self {
        Self::with_thresholds(settings.unhealthy_threshold, settings.unreachable_threshold)
    }

    /// Settings-wide thresholds, overridden by the instance's own health
    /// check spec when it has one.
    pub fn for_instance(settings: &HealthSettings, instance: &ServiceInstance) -> Self {
        let unhealthy = instance
            .deployment_config
            .as_ref()
            .map(|c| c.health_check.unhealthy_threshold)
            .unwrap_or(settings.unhealthy_threshold);
        Self::with_thresholds(unhealthy, settings.unreachable_threshold)
    }

    pub fn with_thresholds(unhealthy_threshold: u32, unreachable_threshold: u32) -> Self {
        Self {
            status: HealthStatus::Unknown,
            consecutive_failures: 0,
            consecutive_unreachable: 0,
            unhealthy_threshold: unhealthy_threshold.max(1),
            unreachable_threshold: unreachable_threshold.max(1),
        }
    }

    /// Record a probe result and decide what happens to the instance.
    pub fn record(&mut self, result: ProbeResult) -> HealthVerdict {
        match result {
            ProbeResult::Healthy => {
                if self.status != HealthStatus::Healthy {
                    debug!(failures = self.consecutive_failures, "instance healthy");
                }
                self.consecutive_failures = 0;
                self.consecutive_unreachable = 0;
                self.status = HealthStatus::Healthy;
                HealthVerdict::Observed(self.status)
            }
            ProbeResult::Unhealthy => {
                self.consecutive_unreachable = 0;
                self.consecutive_failures += 1;
                self.status = HealthStatus::Unhealthy;
                if self.consecutive_failures >= self.unhealthy_threshold {
                    warn!(
                        failures = self.consecutive_failures,
                        threshold = self.unhealthy_threshold,
                        "unhealthy threshold reached"
                    );
                    HealthVerdict::ThresholdReached {
                        consecutive_failures: self.consecutive_failures,
                    }
                } else {
                    HealthVerdict::Observed(self.status)
                }
            }
            ProbeResult::Unreachable => {
                // Neither counts toward nor resets the unhealthy streak.
                self.consecutive_unreachable += 1;
                if self.consecutive_unreachable >= self.unreachable_threshold {
                    self.status = HealthStatus::Unknown;
                }
                HealthVerdict::Observed(self.status)
            }
            ProbeResult::Gone => HealthVerdict::Gone {
                reason: "container no longer exists".to_string(),
            },
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn consecutive_unreachable(&self) -> u32 {
        self.consecutive_unreachable
    }
}

/// Probe a running instance: ask the engine first, then the service.
///
/// The report is returned whenever the engine answered, so callers can
/// sample metrics from it.
pub async fn probe_instance(
    engine: &dyn ContainerEngine,
    instance: &ServiceInstance,
    timeout: Duration,
) -> (ProbeResult, Option<ContainerReport>) {
    let Some(reference) = instance.container_reference.as_deref() else {
        return (ProbeResult::Gone, None);
    };
    let report = match tokio::time::timeout(timeout, engine.inspect(reference)).await {
        Ok(Ok(report)) => report,
        Ok(Err(EngineError::Gone(_))) => return (ProbeResult::Gone, None),
        Ok(Err(e)) => {
            debug!(id = %instance.id, error = %e, "inspect failed");
            return (ProbeResult::Unreachable, None);
        }
        Err(_) => return (ProbeResult::Unreachable, None),
    };

    if !report.running || report.health == Some(HealthStatus::Unhealthy) {
        return (ProbeResult::Unhealthy, Some(report));
    }

    let probe = instance
        .deployment_config
        .as_ref()
        .map(|c| c.health_check.probe.clone())
        .unwrap_or(HealthProbe::Process);
    let result = match &probe {
        HealthProbe::Process => ProbeResult::Healthy,
        HealthProbe::Tcp { port } => match report.host_ports.get(port) {
            Some(host) => tcp_probe(&format!("{PROBE_HOST}:{host}"), timeout).await,
            None => ProbeResult::Healthy,
        },
        HealthProbe::Http { path, port } => match report.host_ports.get(port) {
            Some(host) => http_probe(&format!("{PROBE_HOST}:{host}"), path, timeout).await,
            None => ProbeResult::Healthy,
        },
    };
    (result, Some(report))
}

/// Connect-only probe.
pub async fn tcp_probe(address: &str, timeout: Duration) -> ProbeResult {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(_)) => ProbeResult::Healthy,
        Ok(Err(e)) => {
            debug!(error = %e, %address, "tcp probe refused");
            ProbeResult::Unhealthy
        }
        Err(_) => ProbeResult::Unreachable,
    }
}

/// HTTP GET probe: 2xx is healthy, any other status or a refused
/// connection is unhealthy, and running out of time is unreachable.
pub async fn http_probe(address: &str, path: &str, timeout: Duration) -> ProbeResult {
    let uri = format!("http://{address}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match TcpStream::connect(address).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %uri, "health probe connection failed");
                return ProbeResult::Unhealthy;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %uri, "health probe handshake failed");
                return ProbeResult::Unhealthy;
            }
        };
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let request = http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", address)
            .header("user-agent", "foldergrid-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new());
        let request = match request {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, %uri, "invalid health probe request");
                return ProbeResult::Unhealthy;
            }
        };

        match sender.send_request(request).await {
            Ok(resp) if resp.status().is_success() => ProbeResult::Healthy,
            Ok(resp) => {
                debug!(status = %resp.status(), %uri, "health probe non-2xx");
                ProbeResult::Unhealthy
            }
            Err(e) => {
                debug!(error = %e, %uri, "health probe request failed");
                ProbeResult::Unhealthy
            }
        }
    })
    .await;

    result.unwrap_or_else(|_| {
        debug!(%uri, "health probe timed out");
        ProbeResult::Unreachable
    })
}
