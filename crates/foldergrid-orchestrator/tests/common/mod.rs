//! Scripted container engine and registry fixtures shared by the
//! orchestration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use foldergrid_core::{
    BuildDescriptor, BuildSpec, ChildDetection, DeploymentConfig, HealthCheckSpec, HealthProbe,
    PortMapping, ResourceLimits, ScalingSpec, ServiceType, TopologyDetection,
};
use foldergrid_orchestrator::{
    BuildRequest, ContainerEngine, ContainerReport, EngineError, EngineResult,
    OrchestrationManager, RunRequest,
};
use foldergrid_registry::RegistryStore;

pub const WORKSPACE: &str = "ws-test";

#[derive(Default)]
pub struct FakeEngine {
    failures: Mutex<HashMap<&'static str, VecDeque<EngineError>>>,
    hang_build: AtomicBool,
    scale_shortfall: AtomicU32,
    calls: Mutex<HashMap<&'static str, u32>>,
    runs: Mutex<Vec<String>>,
    pub build_started: Notify,
    pub report: Mutex<ContainerReport>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            report: Mutex::new(ContainerReport {
                running: true,
                ..ContainerReport::default()
            }),
            ..Self::default()
        })
    }

    /// Make the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: &'static str, error: EngineError) {
        self.failures
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(error);
    }

    pub fn hang_builds(&self, hang: bool) {
        self.hang_build.store(hang, Ordering::SeqCst);
    }

    /// Scale reaches `shortfall` fewer replicas than requested.
    pub fn short_scale_by(&self, shortfall: u32) {
        self.scale_shortfall.store(shortfall, Ordering::SeqCst);
    }

    pub fn calls(&self, op: &str) -> u32 {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Container names in launch order.
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }

    fn enter(&self, op: &'static str) -> EngineResult<()> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
        match self.failures.lock().unwrap().get_mut(op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn build(&self, request: &BuildRequest) -> EngineResult<String> {
        self.build_started.notify_one();
        self.enter("build")?;
        if self.hang_build.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(request.tag.clone())
    }

    async fn run(&self, request: &RunRequest) -> EngineResult<String> {
        self.enter("run")?;
        self.runs.lock().unwrap().push(request.name.clone());
        Ok(format!("ctr-{}", request.name))
    }

    async fn start(&self, _container: &str) -> EngineResult<()> {
        self.enter("start")
    }

    async fn stop(&self, _container: &str, _grace: Duration) -> EngineResult<()> {
        self.enter("stop")
    }

    async fn kill(&self, _container: &str) -> EngineResult<()> {
        self.enter("kill")
    }

    async fn remove(&self, _container: &str) -> EngineResult<()> {
        self.enter("remove")
    }

    async fn inspect(&self, _container: &str) -> EngineResult<ContainerReport> {
        self.enter("inspect")?;
        Ok(self.report.lock().unwrap().clone())
    }

    async fn scale(&self, _container: &str, replicas: u32) -> EngineResult<u32> {
        self.enter("scale")?;
        Ok(replicas.saturating_sub(self.scale_shortfall.load(Ordering::SeqCst)))
    }
}

pub fn dockerfile_config(context: &str, port: u16) -> DeploymentConfig {
    DeploymentConfig {
        build: BuildSpec {
            context: context.to_string(),
            descriptor: BuildDescriptor::Explicit {
                path: "Dockerfile".to_string(),
            },
        },
        ports: vec![PortMapping::tcp(port)],
        env: BTreeMap::new(),
        resources: ResourceLimits::default(),
        health_check: HealthCheckSpec::for_probe(HealthProbe::Tcp { port }),
        scaling: ScalingSpec::default(),
        low_confidence: false,
    }
}

pub fn detection(folder: &str, service_type: ServiceType) -> TopologyDetection {
    let recommended_config = match service_type {
        ServiceType::Composite | ServiceType::Unknown => None,
        _ => Some(dockerfile_config(folder, 8080)),
    };
    TopologyDetection {
        id: String::new(),
        folder_path: folder.to_string(),
        service_type,
        confidence: 0.9,
        candidates: Vec::new(),
        children: Vec::new(),
        dependency_map: BTreeMap::new(),
        conflicts: Vec::new(),
        warnings: Vec::new(),
        recommended_config,
        fingerprint: format!("{:0>64}", folder.len()),
        version: 0,
        analyzed_at: 0,
    }
}

/// A composite `shop` over the given children and dependency edges.
pub fn composite(children: &[&str], edges: &[(&str, &str)]) -> TopologyDetection {
    let mut parent = detection("shop", ServiceType::Composite);
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for child in children {
        let path = format!("shop/{child}");
        parent.children.push(ChildDetection {
            folder_path: path.clone(),
            name: child.to_string(),
            service_type: ServiceType::Containerized,
            confidence: 0.9,
            recommended_config: Some(dockerfile_config(&path, 8080)),
        });
        map.entry("shop".to_string()).or_default().push(path.clone());
        map.entry(path).or_default();
    }
    for (from, to) in edges {
        map.entry(format!("shop/{from}"))
            .or_default()
            .push(format!("shop/{to}"));
    }
    parent.dependency_map = map;
    parent
}

pub struct Harness {
    pub store: RegistryStore,
    pub engine: Arc<FakeEngine>,
    pub manager: Arc<OrchestrationManager>,
}

pub fn harness() -> Harness {
    let store = RegistryStore::open_in_memory().unwrap();
    let engine = FakeEngine::new();
    let manager = Arc::new(OrchestrationManager::new(
        store.clone(),
        engine.clone(),
        "/srv/workspace",
        WORKSPACE,
    ));
    Harness {
        store,
        engine,
        manager,
    }
}

impl Harness {
    /// Record a detection for `folder` and register it.
    pub fn registered(&self, folder: &str, service_type: ServiceType) -> String {
        self.store
            .upsert_detection(&detection(folder, service_type))
            .unwrap();
        self.manager.register(folder, None).unwrap().id
    }
}
