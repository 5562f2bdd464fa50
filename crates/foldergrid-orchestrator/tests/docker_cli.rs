//! `DockerCliEngine` driven by the manager against a stand-in `docker`
//! script that keeps container names taken until `rm` frees them.

#![cfg(unix)]

mod common;

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use foldergrid_core::ServiceType;
use foldergrid_orchestrator::{DockerCliEngine, HealthVerdict, OrchestrationManager};
use foldergrid_registry::{RegistryStore, ServiceStatus};

const FAKE_DOCKER: &str = r#"#!/bin/sh
state="@STATE@"
echo "$*" >> "$state/calls.log"
cmd="$1"
shift
case "$cmd" in
  build)
    echo "sha256:0123"
    ;;
  run)
    while [ $# -gt 0 ]; do
      if [ "$1" = "--name" ]; then name="$2"; fi
      shift
    done
    if [ -e "$state/ctr-$name" ]; then
      echo "docker: Error response from daemon: Conflict. The container name \"/$name\" is already in use." >&2
      exit 125
    fi
    touch "$state/ctr-$name"
    echo "$name"
    ;;
  rm|stop|kill|start)
    for last; do :; done
    if [ ! -e "$state/ctr-$last" ]; then
      echo "Error response from daemon: No such container: $last" >&2
      exit 1
    fi
    if [ "$cmd" = "rm" ]; then rm "$state/ctr-$last"; fi
    echo "$last"
    ;;
  inspect)
    echo '{"Status":"running","Running":true,"ExitCode":0}'
    ;;
esac
exit 0
"#;

fn install_fake_docker(dir: &Path) -> String {
    let state = dir.join("state");
    fs::create_dir_all(&state).unwrap();
    let script = dir.join("docker");
    fs::write(&script, FAKE_DOCKER.replace("@STATE@", &state.to_string_lossy())).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script.to_string_lossy().into_owned()
}

fn container_exists(dir: &Path, name: &str) -> bool {
    dir.join("state").join(format!("ctr-{name}")).exists()
}

#[tokio::test]
async fn fixed_container_names_are_freed_for_redeploy() {
    let dir = tempfile::tempdir().unwrap();
    let binary = install_fake_docker(dir.path());

    let store = RegistryStore::open_in_memory().unwrap();
    store
        .upsert_detection(&common::detection("api", ServiceType::Containerized))
        .unwrap();
    let engine = Arc::new(DockerCliEngine::with_binary(binary));
    let manager = OrchestrationManager::new(store, engine, dir.path(), common::WORKSPACE);
    let id = manager.register("api", None).unwrap().id;

    let running = manager.deploy(&id).await.unwrap();
    let reference = running.container_reference.clone().unwrap();
    assert!(container_exists(dir.path(), &reference));

    let failed = manager
        .apply_health(
            &id,
            HealthVerdict::ThresholdReached {
                consecutive_failures: 3,
            },
            None,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, ServiceStatus::Error);
    assert!(!container_exists(dir.path(), &reference));

    let redeployed = manager.deploy(&id).await.unwrap();
    assert_eq!(redeployed.status, ServiceStatus::Running);
    assert_eq!(redeployed.container_reference.as_deref(), Some(reference.as_str()));
    assert!(container_exists(dir.path(), &reference));

    manager.remove(&id).await.unwrap();
    assert!(!container_exists(dir.path(), &reference));

    let calls = fs::read_to_string(dir.path().join("state/calls.log")).unwrap();
    assert!(calls.lines().any(|l| l == format!("rm -f {reference}")));

    // A container from an attempt the registry never saw complete.
    let store = manager.store();
    store
        .upsert_detection(&common::detection("web", ServiceType::Containerized))
        .unwrap();
    let web = manager.register("web", None).unwrap().id;
    let name = format!("fg-web-{}", &web[..8]);
    fs::write(dir.path().join("state").join(format!("ctr-{name}")), "").unwrap();

    let running = manager.deploy(&web).await.unwrap();
    assert_eq!(running.container_reference.as_deref(), Some(name.as_str()));
    assert!(container_exists(dir.path(), &name));
}
