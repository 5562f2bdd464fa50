use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use foldergrid_core::{
    BuildDescriptor, BuildSpec, DeploymentConfig, HealthCheckSpec, HealthProbe, HealthSettings,
    HealthStatus, ResourceLimits, ScalingSpec, ServiceType, TopologyDetection,
};
use foldergrid_health::HealthScheduler;
use foldergrid_orchestrator::{
    BuildRequest, ContainerEngine, ContainerReport, EngineError, EngineResult,
    OrchestrationManager, RunRequest,
};
use foldergrid_registry::{EventType, RegistryStore, ServiceStatus};

/// Engine whose inspect answer is set per container name prefix.
#[derive(Default)]
struct ProbeEngine {
    answers: Mutex<HashMap<String, Answer>>,
}

#[derive(Clone)]
enum Answer {
    Running,
    Exited,
    Gone,
    Hang,
    Panic,
}

impl ProbeEngine {
    fn answer(&self, folder: &str, answer: Answer) {
        self.answers
            .lock()
            .unwrap()
            .insert(format!("fg-{folder}-"), answer);
    }

    fn lookup(&self, container: &str) -> Answer {
        self.answers
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| container.starts_with(prefix.as_str()))
            .map(|(_, a)| a.clone())
            .unwrap_or(Answer::Running)
    }
}

#[async_trait]
impl ContainerEngine for ProbeEngine {
    async fn build(&self, request: &BuildRequest) -> EngineResult<String> {
        Ok(request.tag.clone())
    }

    async fn run(&self, request: &RunRequest) -> EngineResult<String> {
        Ok(request.name.clone())
    }

    async fn start(&self, _container: &str) -> EngineResult<()> {
        Ok(())
    }

    async fn stop(&self, _container: &str, _grace: Duration) -> EngineResult<()> {
        Ok(())
    }

    async fn kill(&self, _container: &str) -> EngineResult<()> {
        Ok(())
    }

    async fn remove(&self, _container: &str) -> EngineResult<()> {
        Ok(())
    }

    async fn inspect(&self, container: &str) -> EngineResult<ContainerReport> {
        match self.lookup(container) {
            Answer::Running => Ok(ContainerReport {
                running: true,
                memory_mb: Some(64),
                cpu_percent: Some(1.5),
                ..ContainerReport::default()
            }),
            Answer::Exited => Ok(ContainerReport {
                running: false,
                exit_code: Some(1),
                ..ContainerReport::default()
            }),
            Answer::Gone => Err(EngineError::Gone(container.to_string())),
            Answer::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Answer::Panic => panic!("inspect blew up for {container}"),
        }
    }

    async fn scale(&self, _container: &str, replicas: u32) -> EngineResult<u32> {
        Ok(replicas)
    }
}

fn process_config(folder: &str) -> DeploymentConfig {
    DeploymentConfig {
        build: BuildSpec {
            context: folder.to_string(),
            descriptor: BuildDescriptor::Explicit {
                path: "Dockerfile".to_string(),
            },
        },
        ports: Vec::new(),
        env: BTreeMap::new(),
        resources: ResourceLimits::default(),
        health_check: HealthCheckSpec::for_probe(HealthProbe::Process),
        scaling: ScalingSpec::default(),
        low_confidence: false,
    }
}

fn detection(folder: &str) -> TopologyDetection {
    TopologyDetection {
        id: String::new(),
        folder_path: folder.to_string(),
        service_type: ServiceType::Containerized,
        confidence: 0.85,
        candidates: Vec::new(),
        children: Vec::new(),
        dependency_map: BTreeMap::new(),
        conflicts: Vec::new(),
        warnings: Vec::new(),
        recommended_config: Some(process_config(folder)),
        fingerprint: "f".repeat(64),
        version: 0,
        analyzed_at: 0,
    }
}

struct Fixture {
    engine: Arc<ProbeEngine>,
    manager: Arc<OrchestrationManager>,
    scheduler: HealthScheduler,
}

fn fixture() -> Fixture {
    let store = RegistryStore::open_in_memory().unwrap();
    let engine = Arc::new(ProbeEngine::default());
    let manager = Arc::new(OrchestrationManager::new(
        store,
        engine.clone(),
        "/srv/ws",
        "ws",
    ));
    let settings = HealthSettings {
        interval: Duration::ZERO,
        check_timeout: Duration::from_secs(1),
        ..HealthSettings::default()
    };
    let scheduler = HealthScheduler::new(manager.clone(), settings);
    Fixture {
        engine,
        manager,
        scheduler,
    }
}

async fn running(f: &Fixture, folder: &str) -> String {
    f.manager.store().upsert_detection(&detection(folder)).unwrap();
    let id = f.manager.register(folder, None).unwrap().id;
    f.manager.deploy(&id).await.unwrap();
    id
}

#[tokio::test]
async fn healthy_instance_records_health_and_metrics() {
    let f = fixture();
    let id = running(&f, "api").await;

    let report = f.scheduler.sweep().await.unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.failed, 0);

    let instance = f.manager.get(&id).unwrap();
    assert_eq!(instance.health_status, HealthStatus::Healthy);
    assert!(instance.last_health_check_at.is_some());
    assert_eq!(instance.metrics.unwrap().memory_mb, 64);
}

#[tokio::test]
async fn three_unhealthy_sweeps_fail_the_instance() {
    let f = fixture();
    let id = running(&f, "api").await;
    f.engine.answer("api", Answer::Exited);

    for _ in 0..2 {
        let report = f.scheduler.sweep().await.unwrap();
        assert_eq!(report.failed, 0);
    }
    assert_eq!(f.manager.get(&id).unwrap().status, ServiceStatus::Running);

    let report = f.scheduler.sweep().await.unwrap();
    assert_eq!(report.failed, 1);
    let instance = f.manager.get(&id).unwrap();
    assert_eq!(instance.status, ServiceStatus::Error);
    assert_eq!(f.manager.events(&id, 1).unwrap()[0].event_type, EventType::HealthCheckFailed);
    assert_eq!(f.scheduler.tracked(), 0);
}

#[tokio::test]
async fn two_unhealthy_then_healthy_keeps_running() {
    let f = fixture();
    let id = running(&f, "api").await;
    f.engine.answer("api", Answer::Exited);
    f.scheduler.sweep().await.unwrap();
    f.scheduler.sweep().await.unwrap();
    f.engine.answer("api", Answer::Running);
    f.scheduler.sweep().await.unwrap();
    f.engine.answer("api", Answer::Exited);
    f.scheduler.sweep().await.unwrap();

    let instance = f.manager.get(&id).unwrap();
    assert_eq!(instance.status, ServiceStatus::Running);
    assert_eq!(instance.health_status, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn restart_begins_a_new_failure_streak() {
    let f = fixture();
    let id = running(&f, "api").await;
    f.engine.answer("api", Answer::Exited);
    f.scheduler.sweep().await.unwrap();
    f.scheduler.sweep().await.unwrap();

    f.manager.stop(&id).await.unwrap();
    f.manager.start(&id).await.unwrap();

    let report = f.scheduler.sweep().await.unwrap();
    assert_eq!(report.failed, 0);
    let instance = f.manager.get(&id).unwrap();
    assert_eq!(instance.status, ServiceStatus::Running);
    assert_eq!(instance.health_status, HealthStatus::Unhealthy);

    f.scheduler.sweep().await.unwrap();
    let report = f.scheduler.sweep().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(f.manager.get(&id).unwrap().status, ServiceStatus::Error);
}

#[tokio::test]
async fn redeploy_after_failure_starts_clean() {
    let f = fixture();
    let id = running(&f, "api").await;
    f.engine.answer("api", Answer::Exited);
    for _ in 0..3 {
        f.scheduler.sweep().await.unwrap();
    }
    assert_eq!(f.manager.get(&id).unwrap().status, ServiceStatus::Error);

    f.manager.deploy(&id).await.unwrap();
    let report = f.scheduler.sweep().await.unwrap();
    assert_eq!(report.failed, 0);
    assert_eq!(f.manager.get(&id).unwrap().status, ServiceStatus::Running);
}

#[tokio::test]
async fn gone_container_fails_on_first_sweep() {
    let f = fixture();
    let id = running(&f, "api").await;
    f.engine.answer("api", Answer::Gone);

    let report = f.scheduler.sweep().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(f.manager.get(&id).unwrap().status, ServiceStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn hung_checks_degrade_to_unknown_without_failing() {
    let f = fixture();
    let id = running(&f, "api").await;
    f.engine.answer("api", Answer::Running);
    f.scheduler.sweep().await.unwrap();
    f.engine.answer("api", Answer::Hang);

    for _ in 0..3 {
        f.scheduler.sweep().await.unwrap();
    }
    let instance = f.manager.get(&id).unwrap();
    assert_eq!(instance.status, ServiceStatus::Running);
    assert_eq!(instance.health_status, HealthStatus::Unknown);
}

#[tokio::test]
async fn panicking_check_is_isolated() {
    let f = fixture();
    let ok = running(&f, "api").await;
    let boom = running(&f, "boom").await;
    f.engine.answer("boom", Answer::Panic);

    let report = f.scheduler.sweep().await.unwrap();
    assert_eq!(report.panicked, 1);
    assert_eq!(report.checked, 1);
    assert_eq!(f.manager.get(&ok).unwrap().health_status, HealthStatus::Healthy);
    assert_eq!(f.manager.get(&boom).unwrap().status, ServiceStatus::Running);
}


#[tokio::test]
async fn run_loop_stops_on_shutdown() {
    let f = fixture();
    let id = running(&f, "api").await;
    let scheduler = Arc::new(f.scheduler);
    let (tx, rx) = tokio::sync::watch::channel(false);

    let handle = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(rx).await })
    };
    // The first tick fires immediately.
    while f.manager.get(&id).unwrap().last_health_check_at.is_none() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tx.send(true).unwrap();
    handle.await.unwrap();
}
