use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use foldergrid_health::HealthScheduler;

use crate::app::App;

/// Run the health scheduler until Ctrl-C, logging lifecycle notifications.
pub async fn run(app: App) -> anyhow::Result<()> {
    let settings = app.config.health_settings();
    let scheduler = Arc::new(HealthScheduler::new(app.manager.clone(), settings));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let health = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    let mut notes = app.manager.subscribe();
    let notifications = tokio::spawn(async move {
        while let Ok(note) = notes.recv().await {
            info!(
                instance = %note.instance_id,
                kind = ?note.kind,
                old = ?note.old_status,
                new = ?note.new_status,
                event = ?note.event_type,
                "lifecycle"
            );
        }
    });

    info!(root = %app.root.display(), "foldergridd running; Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = health.await;
    notifications.abort();

    info!("foldergridd stopped");
    Ok(())
}
