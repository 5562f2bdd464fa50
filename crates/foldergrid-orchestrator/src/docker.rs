//! `ContainerEngine` over the `docker` CLI.
//!
//! Every call shells out with `tokio::process::Command` and classifies the
//! CLI's stderr into an `EngineError`. Replicas beyond the primary are
//! sibling containers named `{primary}-r{n}` and labelled with the primary.

use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use foldergrid_core::HealthStatus;

use crate::engine::{
    BuildRequest, ContainerEngine, ContainerReport, DescriptorSource, EngineError, EngineResult,
    RunRequest,
};

const PRIMARY_LABEL: &str = "foldergrid.primary";

pub struct DockerCliEngine {
    binary: String,
    /// Run requests by container reference, for starting replicas.
    launched: Mutex<HashMap<String, RunRequest>>,
}

impl DockerCliEngine {
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Use a different CLI with the same surface (e.g. `podman`).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            launched: Mutex::new(HashMap::new()),
        }
    }

    async fn exec(&self, args: &[String], stdin: Option<&str>) -> EngineResult<String> {
        debug!(binary = %self.binary, ?args, "engine command");
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| EngineError::Unreachable(format!("{}: {e}", self.binary)))?;
        if let (Some(text), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(text.as_bytes())
                .await
                .map_err(|e| EngineError::Failed(format!("writing descriptor: {e}")))?;
            drop(pipe);
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| EngineError::Unreachable(e.to_string()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(classify_failure(&String::from_utf8_lossy(&output.stderr)))
        }
    }

    fn remember(&self, reference: &str, request: &RunRequest) {
        if let Ok(mut launched) = self.launched.lock() {
            launched.insert(reference.to_string(), request.clone());
        }
    }

    fn forget(&self, reference: &str) {
        if let Ok(mut launched) = self.launched.lock() {
            launched.remove(reference);
        }
    }

    fn recall(&self, reference: &str) -> Option<RunRequest> {
        self.launched.lock().ok()?.get(reference).cloned()
    }

    async fn replicas_of(&self, reference: &str) -> EngineResult<Vec<String>> {
        let out = self
            .exec(
                &args([
                    "ps",
                    "-a",
                    "--filter",
                    &format!("label={PRIMARY_LABEL}={reference}"),
                    "--format",
                    "{{.Names}}",
                ]),
                None,
            )
            .await?;
        let mut names: Vec<String> = out.lines().map(str::to_string).collect();
        names.sort();
        Ok(names)
    }

    async fn stats(&self, reference: &str) -> Option<(u64, f64)> {
        let out = self
            .exec(
                &args(["stats", "--no-stream", "--format", "{{json .}}", reference]),
                None,
            )
            .await
            .ok()?;
        parse_stats(&out)
    }
}

impl Default for DockerCliEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn run_args(request: &RunRequest, name: &str, extra_labels: &[(String, String)]) -> Vec<String> {
    let mut out = args(["run", "-d", "--name", name]);
    out.push("--memory".to_string());
    out.push(format!("{}m", request.memory_mb));
    out.push("--cpus".to_string());
    out.push(format!("{:.3}", f64::from(request.cpu_millis) / 1000.0));
    let labels = request.labels.iter().map(|(k, v)| (k.clone(), v.clone()));
    for (key, value) in labels.chain(extra_labels.iter().cloned()) {
        out.push("--label".to_string());
        out.push(format!("{key}={value}"));
    }
    for (key, value) in &request.env {
        out.push("-e".to_string());
        out.push(format!("{key}={value}"));
    }
    for port in &request.ports {
        out.push("-p".to_string());
        match port.host_port {
            Some(host) => out.push(format!("{host}:{}", port.container_port)),
            None => out.push(port.container_port.to_string()),
        }
    }
    out.push(request.image.clone());
    out
}

/// Map CLI stderr onto an engine error.
pub fn classify_failure(stderr: &str) -> EngineError {
    let message = stderr.trim().to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("no such container") || lower.contains("no such object") {
        EngineError::Gone(message)
    } else if lower.contains("cannot connect to the docker daemon")
        || lower.contains("connection refused")
        || lower.contains("error during connect")
    {
        EngineError::Unreachable(message)
    } else if lower.contains("timeout")
        || lower.contains("temporarily unavailable")
        || lower.contains("too many requests")
    {
        EngineError::Transient(message)
    } else {
        EngineError::Failed(message)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    running: bool,
    #[serde(default)]
    exit_code: Option<i32>,
    #[serde(default)]
    health: Option<InspectHealth>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHealth {
    status: String,
}

pub fn parse_state(json: &str) -> EngineResult<ContainerReport> {
    let state: InspectState = serde_json::from_str(json)
        .map_err(|e| EngineError::Failed(format!("unexpected inspect output: {e}")))?;
    let health = state.health.map(|h| match h.status.as_str() {
        "healthy" => HealthStatus::Healthy,
        "unhealthy" => HealthStatus::Unhealthy,
        _ => HealthStatus::Unknown,
    });
    Ok(ContainerReport {
        running: state.running,
        exit_code: state.exit_code,
        health,
        ..ContainerReport::default()
    })
}

/// Parse `docker port` output: `80/tcp -> 0.0.0.0:8080`.
pub fn parse_ports(output: &str) -> BTreeMap<u16, u16> {
    let mut ports = BTreeMap::new();
    for line in output.lines() {
        let Some((container, host)) = line.split_once(" -> ") else {
            continue;
        };
        let container = container.split('/').next().and_then(|p| p.trim().parse().ok());
        let host = host.rsplit(':').next().and_then(|p| p.trim().parse().ok());
        if let (Some(container), Some(host)) = (container, host) {
            ports.entry(container).or_insert(host);
        }
    }
    ports
}

#[derive(Debug, Deserialize)]
struct StatsLine {
    #[serde(rename = "MemUsage")]
    mem_usage: String,
    #[serde(rename = "CPUPerc")]
    cpu_perc: String,
}

/// Memory in MiB and CPU percent from one `docker stats` JSON line.
pub fn parse_stats(output: &str) -> Option<(u64, f64)> {
    let line: StatsLine = serde_json::from_str(output.lines().next()?).ok()?;
    let used = line.mem_usage.split('/').next()?.trim();
    let cpu = line.cpu_perc.trim().trim_end_matches('%').parse().ok()?;
    Some((parse_mib(used)?, cpu))
}

fn parse_mib(size: &str) -> Option<u64> {
    let split = size.find(|c: char| c.is_ascii_alphabetic())?;
    let (number, unit) = size.split_at(split);
    let number: f64 = number.trim().parse().ok()?;
    let mib = match unit {
        "B" => number / (1024.0 * 1024.0),
        "KiB" | "kB" => number / 1024.0,
        "MiB" | "MB" => number,
        "GiB" | "GB" => number * 1024.0,
        _ => return None,
    };
    Some(mib.round() as u64)
}

#[async_trait]
impl ContainerEngine for DockerCliEngine {
    async fn build(&self, request: &BuildRequest) -> EngineResult<String> {
        let context = request.context.to_string_lossy().to_string();
        let mut argv = args(["build", "-q", "-t", &request.tag]);
        let stdin = match &request.descriptor {
            DescriptorSource::File(path) => {
                argv.push("-f".to_string());
                argv.push(request.context.join(path).to_string_lossy().to_string());
                None
            }
            DescriptorSource::Inline(text) => {
                argv.push("-f".to_string());
                argv.push("-".to_string());
                Some(text.as_str())
            }
        };
        argv.push(context);
        self.exec(&argv, stdin).await?;
        Ok(request.tag.clone())
    }

    async fn run(&self, request: &RunRequest) -> EngineResult<String> {
        // Names are fixed per instance; clear whatever an earlier attempt left.
        self.remove(&request.name).await?;
        self.exec(&run_args(request, &request.name, &[]), None).await?;
        self.remember(&request.name, request);
        Ok(request.name.clone())
    }

    async fn start(&self, container: &str) -> EngineResult<()> {
        self.exec(&args(["start", container]), None).await?;
        for replica in self.replicas_of(container).await? {
            self.exec(&args(["start", &replica]), None).await?;
        }
        Ok(())
    }

    async fn stop(&self, container: &str, grace: Duration) -> EngineResult<()> {
        let secs = grace.as_secs().to_string();
        for replica in self.replicas_of(container).await? {
            if let Err(e) = self.exec(&args(["stop", "-t", &secs, &replica]), None).await {
                warn!(%replica, error = %e, "replica stop failed");
            }
        }
        self.exec(&args(["stop", "-t", &secs, container]), None).await?;
        Ok(())
    }

    async fn kill(&self, container: &str) -> EngineResult<()> {
        for replica in self.replicas_of(container).await? {
            let _ = self.exec(&args(["kill", &replica]), None).await;
        }
        self.exec(&args(["kill", container]), None).await?;
        Ok(())
    }

    async fn remove(&self, container: &str) -> EngineResult<()> {
        for replica in self.replicas_of(container).await? {
            match self.exec(&args(["rm", "-f", &replica]), None).await {
                Ok(_) | Err(EngineError::Gone(_)) => {}
                Err(e) => return Err(e),
            }
        }
        match self.exec(&args(["rm", "-f", container]), None).await {
            Ok(_) | Err(EngineError::Gone(_)) => {}
            Err(e) => return Err(e),
        }
        self.forget(container);
        Ok(())
    }

    async fn inspect(&self, container: &str) -> EngineResult<ContainerReport> {
        let state = self
            .exec(&args(["inspect", "--format", "{{json .State}}", container]), None)
            .await?;
        let mut report = parse_state(&state)?;
        if report.running {
            if let Ok(out) = self.exec(&args(["port", container]), None).await {
                report.host_ports = parse_ports(&out);
            }
            if let Some((memory_mb, cpu)) = self.stats(container).await {
                report.memory_mb = Some(memory_mb);
                report.cpu_percent = Some(cpu);
            }
        }
        Ok(report)
    }

    async fn scale(&self, container: &str, replicas: u32) -> EngineResult<u32> {
        let existing = self.replicas_of(container).await?;
        let wanted = replicas.saturating_sub(1) as usize;

        if existing.len() > wanted {
            for replica in &existing[wanted..] {
                self.exec(&args(["rm", "-f", replica]), None).await?;
            }
            return Ok(replicas);
        }

        let Some(request) = self.recall(container) else {
            return Err(EngineError::Failed(format!(
                "no launch record for {container}; redeploy before scaling up"
            )));
        };
        let mut running = 1 + existing.len() as u32;
        let label = [(PRIMARY_LABEL.to_string(), container.to_string())];
        for n in existing.len() + 1..=wanted {
            // Replicas never bind fixed host ports.
            let mut replica = request.clone();
            for port in &mut replica.ports {
                port.host_port = None;
            }
            let name = format!("{container}-r{n}");
            match self.exec(&run_args(&replica, &name, &label), None).await {
                Ok(_) => running += 1,
                Err(e) => {
                    warn!(%name, error = %e, "replica launch failed");
                    break;
                }
            }
        }
        Ok(running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldergrid_core::PortMapping;

    #[test]
    fn stderr_classification() {
        assert!(matches!(
            classify_failure("Error: No such container: fg-api"),
            EngineError::Gone(_)
        ));
        assert!(matches!(
            classify_failure("Cannot connect to the Docker daemon at unix:///var/run/docker.sock."),
            EngineError::Unreachable(_)
        ));
        assert!(matches!(
            classify_failure("toomanyrequests: Too Many Requests"),
            EngineError::Transient(_)
        ));
        assert!(matches!(
            classify_failure("failed to solve: process \"npm ci\" did not complete"),
            EngineError::Failed(_)
        ));
    }

    #[test]
    fn inspect_state_parses() {
        let report = parse_state(
            r#"{"Status":"running","Running":true,"ExitCode":0,"Health":{"Status":"unhealthy"}}"#,
        )
        .unwrap();
        assert!(report.running);
        assert_eq!(report.health, Some(HealthStatus::Unhealthy));

        let report = parse_state(r#"{"Status":"exited","Running":false,"ExitCode":137}"#).unwrap();
        assert!(!report.running);
        assert_eq!(report.exit_code, Some(137));
        assert_eq!(report.health, None);
    }

    #[test]
    fn port_output_parses() {
        let ports = parse_ports("80/tcp -> 0.0.0.0:8080\n80/tcp -> [::]:8080\n9090/udp -> 0.0.0.0:49153\n");
        assert_eq!(ports, BTreeMap::from([(80, 8080), (9090, 49153)]));
    }

    #[test]
    fn stats_line_parses() {
        let (mem, cpu) = parse_stats(
            r#"{"CPUPerc":"12.50%","MemUsage":"256MiB / 1GiB","Name":"fg-api"}"#,
        )
        .unwrap();
        assert_eq!(mem, 256);
        assert!((cpu - 12.5).abs() < f64::EPSILON);
        assert_eq!(parse_mib("1.5GiB"), Some(1536));
        assert_eq!(parse_stats("not json"), None);
    }

    #[test]
    fn run_args_include_limits_and_ports() {
        let request = RunRequest {
            image: "foldergrid/api:1234abcd".to_string(),
            name: "fg-api-1234abcd".to_string(),
            ports: vec![PortMapping::tcp(8080)],
            env: BTreeMap::from([("PORT".to_string(), "8080".to_string())]),
            memory_mb: 256,
            cpu_millis: 500,
            labels: BTreeMap::from([("foldergrid.instance".to_string(), "abc".to_string())]),
        };
        let argv = run_args(&request, &request.name, &[]);
        let joined = argv.join(" ");
        assert!(joined.starts_with("run -d --name fg-api-1234abcd --memory 256m --cpus 0.500"));
        assert!(joined.contains("--label foldergrid.instance=abc"));
        assert!(joined.contains("-e PORT=8080"));
        assert!(joined.ends_with("-p 8080 foldergrid/api:1234abcd"));
    }
}
