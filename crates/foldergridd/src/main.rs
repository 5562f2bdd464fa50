//! foldergridd — the Foldergrid daemon and command line.
//!
//! One binary wires the workspace, registry, orchestrator and health
//! scheduler together. One-shot subcommands act on the registry and exit;
//! `run` keeps the health scheduler going until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! foldergridd --workspace ~/projects/shop detect . --json
//! foldergridd register services/api
//! foldergridd deploy <instance-id>
//! foldergridd run
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod app;
mod commands;

use app::App;

#[derive(Parser)]
#[command(
    name = "foldergridd",
    about = "Foldergrid: turn workspace folders into running services",
    version,
    propagate_version = true
)]
struct Cli {
    /// Workspace root directory.
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Directory for the registry database.
    #[arg(long, global = true, default_value = ".foldergrid")]
    data_dir: PathBuf,

    /// Config file (default: <workspace>/foldergrid.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List what the scanner sees in a folder.
    Scan { folder: String },
    /// Classify a folder and record the detection.
    Detect {
        folder: String,
        /// Print the detection as JSON instead of a report.
        #[arg(long)]
        json: bool,
    },
    /// Register a folder (and a composite's children) as service instances.
    Register { folder: String },
    /// List registered instances.
    List,
    /// Build and run an instance, or every child of a composite.
    Deploy { id: String },
    /// Restart a stopped instance.
    Start { id: String },
    /// Stop a running instance.
    Stop { id: String },
    /// Change the replica count of a running instance.
    Scale { id: String, replicas: u32 },
    /// Health and metrics of an instance.
    Status { id: String },
    /// Tear down an instance and release its folder.
    Remove { id: String },
    /// Deployment events, most recent first.
    Events {
        #[arg(long)]
        instance: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Run the health scheduler until interrupted.
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    let app = App::open(&cli.workspace, &cli.data_dir, cli.config.as_deref())?;

    match cli.command {
        Command::Scan { folder } => commands::inspect::scan(&app, &folder),
        Command::Detect { folder, json } => commands::inspect::detect(&app, &folder, json),
        Command::Register { folder } => commands::lifecycle::register(&app, &folder),
        Command::List => commands::lifecycle::list(&app),
        Command::Deploy { id } => commands::lifecycle::deploy(&app, &id).await,
        Command::Start { id } => commands::lifecycle::start(&app, &id).await,
        Command::Stop { id } => commands::lifecycle::stop(&app, &id).await,
        Command::Scale { id, replicas } => commands::lifecycle::scale(&app, &id, replicas).await,
        Command::Status { id } => commands::lifecycle::status(&app, &id).await,
        Command::Remove { id } => commands::lifecycle::remove(&app, &id).await,
        Command::Events { instance, limit } => {
            commands::lifecycle::events(&app, instance.as_deref(), limit)
        }
        Command::Run => commands::daemon::run(app).await,
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,foldergrid=debug"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
