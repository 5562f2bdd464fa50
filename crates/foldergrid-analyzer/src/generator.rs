//! Deployment config generation.
//!
//! Containerized folders keep their own descriptor; every other known type
//! gets a minimal synthesized one, flagged low-confidence.

use std::collections::BTreeMap;

use tracing::debug;

use foldergrid_core::{
    BuildDescriptor, BuildSpec, DeploymentConfig, HealthCheckSpec, HealthProbe, PortMapping,
    ResourceLimits, ScalingSpec, ServiceType,
};

use crate::analyzers::{dockerfile, go, node, port_from_env_file, python, rust};
use crate::error::{AnalyzerError, AnalyzerResult};
use crate::scanner::FolderScan;

const NODE_IMAGE: &str = "node:20-alpine";
const PYTHON_IMAGE: &str = "python:3.12-slim";
const GO_IMAGE: &str = "golang:1.22-alpine";
const RUST_IMAGE: &str = "rust:1-slim";
const STATIC_IMAGE: &str = "nginx:alpine";

/// Runtime defaults for a synthesized descriptor.
struct Runtime {
    base_image: &'static str,
    install_command: Option<String>,
    start_command: String,
    port: u16,
    env: BTreeMap<String, String>,
    resources: ResourceLimits,
    probe: HealthProbe,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigGenerator;

impl ConfigGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Recommend a deployment config for a classified folder.
    pub fn generate(
        &self,
        scan: &FolderScan,
        service_type: ServiceType,
    ) -> AnalyzerResult<DeploymentConfig> {
        let config = match service_type {
            ServiceType::Containerized => self.containerized(scan)?,
            ServiceType::Node => synthesized(scan, node_runtime(scan)?),
            ServiceType::Python => synthesized(scan, python_runtime(scan)?),
            ServiceType::Go => synthesized(scan, go_runtime(scan)),
            ServiceType::Rust => synthesized(scan, rust_runtime(scan)?),
            ServiceType::Static => synthesized(scan, static_runtime()),
            ServiceType::Composite | ServiceType::Unknown => {
                return Err(AnalyzerError::Generation(format!(
                    "{service_type} folders have no single deployment config"
                )));
            }
        };

        config
            .validate()
            .map_err(|e| AnalyzerError::Generation(e.to_string()))?;
        debug!(folder = %scan.folder_path, %service_type, low_confidence = config.low_confidence, "config generated");
        Ok(config)
    }

    fn containerized(&self, scan: &FolderScan) -> AnalyzerResult<DeploymentConfig> {
        let path = dockerfile::descriptor_name(scan).ok_or_else(|| {
            AnalyzerError::Generation(format!(
                "no Dockerfile or Containerfile in '{}'",
                scan.folder_path
            ))
        })?;
        let info = scan
            .sniff(path)
            .map(dockerfile::parse_dockerfile)
            .unwrap_or_default();

        let ports: Vec<PortMapping> = info.exposed_ports.iter().copied().map(PortMapping::tcp).collect();
        let probe = match info.exposed_ports.first() {
            Some(&port) => HealthProbe::Tcp { port },
            None => HealthProbe::Process,
        };

        Ok(DeploymentConfig {
            build: BuildSpec {
                context: scan.folder_path.clone(),
                descriptor: BuildDescriptor::Explicit {
                    path: path.to_string(),
                },
            },
            ports,
            env: BTreeMap::new(),
            resources: ResourceLimits::default(),
            health_check: HealthCheckSpec::for_probe(probe),
            scaling: ScalingSpec::default(),
            low_confidence: false,
        })
    }
}

fn synthesized(scan: &FolderScan, runtime: Runtime) -> DeploymentConfig {
    DeploymentConfig {
        build: BuildSpec {
            context: scan.folder_path.clone(),
            descriptor: BuildDescriptor::Synthesized {
                base_image: runtime.base_image.to_string(),
                install_command: runtime.install_command,
                start_command: runtime.start_command,
            },
        },
        ports: vec![PortMapping::tcp(runtime.port)],
        env: runtime.env,
        resources: runtime.resources,
        health_check: HealthCheckSpec::for_probe(runtime.probe),
        scaling: ScalingSpec::default(),
        low_confidence: true,
    }
}

fn env_with_port(port: u16, extra: &[(&str, &str)]) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = extra
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    env.insert("PORT".to_string(), port.to_string());
    env
}

fn limits(memory_mb: u64, cpu_millis: u32) -> ResourceLimits {
    ResourceLimits {
        memory_mb,
        cpu_millis,
    }
}

fn node_runtime(scan: &FolderScan) -> AnalyzerResult<Runtime> {
    let info = node::package_info(scan).unwrap_or_default();
    let port = info
        .start_port()
        .or_else(|| port_from_env_file(scan))
        .unwrap_or(3000);

    let start_command = if info.start_script.is_some() {
        "npm start".to_string()
    } else if let Some(entry) = node::entry_file(scan, &info) {
        format!("node {entry}")
    } else {
        return Err(AnalyzerError::Generation(format!(
            "no start script or entry file in '{}'",
            scan.folder_path
        )));
    };

    let install_command = if scan.has_file("package-lock.json") {
        "npm ci --omit=dev"
    } else if scan.has_file("yarn.lock") {
        "yarn install --frozen-lockfile --production"
    } else if scan.has_file("pnpm-lock.yaml") {
        "corepack enable && pnpm install --frozen-lockfile --prod"
    } else {
        "npm install --omit=dev"
    };

    Ok(Runtime {
        base_image: NODE_IMAGE,
        install_command: Some(install_command.to_string()),
        start_command,
        port,
        env: env_with_port(port, &[("NODE_ENV", "production")]),
        resources: limits(512, 500),
        probe: HealthProbe::Tcp { port },
    })
}

fn python_runtime(scan: &FolderScan) -> AnalyzerResult<Runtime> {
    let (start_command, command_port) = python::start_command(scan).ok_or_else(|| {
        AnalyzerError::Generation(format!("no Python entry point in '{}'", scan.folder_path))
    })?;
    let port = command_port
        .or_else(|| port_from_env_file(scan))
        .unwrap_or(8000);

    Ok(Runtime {
        base_image: PYTHON_IMAGE,
        install_command: python::install_command(scan),
        start_command,
        port,
        env: env_with_port(port, &[("PYTHONUNBUFFERED", "1")]),
        resources: limits(512, 500),
        probe: HealthProbe::Tcp { port },
    })
}

fn go_runtime(scan: &FolderScan) -> Runtime {
    let port = port_from_env_file(scan).unwrap_or(8080);
    let install_command = if go::module_path(scan).is_some() {
        "go mod download && CGO_ENABLED=0 go build -o /app/server ."
    } else {
        "CGO_ENABLED=0 go build -o /app/server ."
    };
    Runtime {
        base_image: GO_IMAGE,
        install_command: Some(install_command.to_string()),
        start_command: "/app/server".to_string(),
        port,
        env: env_with_port(port, &[]),
        resources: limits(256, 500),
        probe: HealthProbe::Tcp { port },
    }
}

fn rust_runtime(scan: &FolderScan) -> AnalyzerResult<Runtime> {
    let name = rust::package_name(scan).ok_or_else(|| {
        AnalyzerError::Generation(format!(
            "Cargo.toml in '{}' has no package name",
            scan.folder_path
        ))
    })?;
    let port = port_from_env_file(scan).unwrap_or(8080);
    Ok(Runtime {
        base_image: RUST_IMAGE,
        install_command: Some("cargo build --release".to_string()),
        start_command: format!("./target/release/{name}"),
        port,
        env: env_with_port(port, &[("RUST_LOG", "info")]),
        resources: limits(256, 500),
        probe: HealthProbe::Tcp { port },
    })
}

fn static_runtime() -> Runtime {
    Runtime {
        base_image: STATIC_IMAGE,
        install_command: None,
        start_command: "nginx -g 'daemon off;'".to_string(),
        port: 80,
        env: BTreeMap::new(),
        resources: limits(128, 250),
        probe: HealthProbe::Http {
            path: "/".to_string(),
            port: 80,
        },
    }
}
