mod common;

use foldergrid_core::ServiceType;
use foldergrid_orchestrator::StrategyRegistry;
use foldergrid_registry::{RegistryStore, ServiceInstance};

#[test]
fn reloaded_config_produces_an_identical_plan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.redb");
    let strategies = StrategyRegistry::with_defaults();

    let mut instance = ServiceInstance::new(common::WORKSPACE, "api", "api", ServiceType::Containerized);
    let mut config = common::dockerfile_config("api", 8080);
    config.env.insert("RUST_LOG".to_string(), "info".to_string());
    instance.deployment_config = Some(config.clone());

    let before = strategies
        .get(ServiceType::Containerized)
        .unwrap()
        .plan(&instance, &config)
        .unwrap();
    {
        let store = RegistryStore::open(&path).unwrap();
        store.create_instance(&instance).unwrap();
    }

    let store = RegistryStore::open(&path).unwrap();
    let reloaded = store.require_instance(&instance.id).unwrap();
    let reloaded_config = reloaded.deployment_config.clone().unwrap();
    assert_eq!(reloaded_config, config);

    let after = strategies
        .get(reloaded.service_type)
        .unwrap()
        .plan(&reloaded, &reloaded_config)
        .unwrap();
    assert_eq!(before, after);
}
