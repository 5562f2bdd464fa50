use foldergrid_core::ServiceType;
use foldergrid_registry::ServiceInstance;

use crate::app::App;

fn print_instance(instance: &ServiceInstance) {
    println!(
        "{}  {:<10} {:<13} {}{}",
        instance.id,
        instance.status,
        instance.service_type,
        instance.folder_path,
        instance
            .error_message
            .as_deref()
            .map(|e| format!("  ({e})"))
            .unwrap_or_default()
    );
}

pub fn register(app: &App, folder: &str) -> anyhow::Result<()> {
    for instance in app.topology.register_services(folder)? {
        print_instance(&instance);
    }
    Ok(())
}

pub fn list(app: &App) -> anyhow::Result<()> {
    let mut instances = app.manager.list()?;
    instances.sort_by(|a, b| a.folder_path.cmp(&b.folder_path));
    for instance in &instances {
        print_instance(instance);
    }
    Ok(())
}

pub async fn deploy(app: &App, id: &str) -> anyhow::Result<()> {
    let instance = app.manager.get(id)?;
    if instance.service_type == ServiceType::Composite {
        for child in app.manager.deploy_group(id).await? {
            print_instance(&child);
        }
    } else {
        print_instance(&app.manager.deploy(id).await?);
    }
    Ok(())
}

pub async fn start(app: &App, id: &str) -> anyhow::Result<()> {
    print_instance(&app.manager.start(id).await?);
    Ok(())
}

pub async fn stop(app: &App, id: &str) -> anyhow::Result<()> {
    print_instance(&app.manager.stop(id).await?);
    Ok(())
}

pub async fn scale(app: &App, id: &str, replicas: u32) -> anyhow::Result<()> {
    print_instance(&app.manager.scale(id, replicas).await?);
    Ok(())
}

pub async fn status(app: &App, id: &str) -> anyhow::Result<()> {
    let snapshot = app.manager.status(id).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

pub async fn remove(app: &App, id: &str) -> anyhow::Result<()> {
    print_instance(&app.manager.remove(id).await?);
    Ok(())
}

pub fn events(app: &App, instance: Option<&str>, limit: usize) -> anyhow::Result<()> {
    let events = match instance {
        Some(id) => app.manager.events(id, limit)?,
        None => app.manager.recent_events(limit)?,
    };
    for event in events {
        let outcome = match (&event.error_message, event.timed_out) {
            (Some(e), true) => format!("timed out: {e}"),
            (Some(e), false) => format!("failed: {e}"),
            (None, _) => event.payload.to_string(),
        };
        println!(
            "#{:<6} {}  {:<21} {}  {}",
            event.id, event.occurred_at, event.event_type, event.service_instance_id, outcome
        );
    }
    Ok(())
}
