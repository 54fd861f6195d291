//! wanrec-enrich - WAN circuit reconciliation
//!
//! Runs a reconciliation pass from the command line, serves the HTTP control
//! surface, or runs the note parser / registry resolver on a single input for
//! diagnosis.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use wanrec_common::config::{resolve_database_path, resolve_root_folder, TomlConfig};

use wanrec_enrich::config::ReconSettings;
use wanrec_enrich::models::WanInterface;
use wanrec_enrich::services::{parse_raw_notes, ReconciliationOrchestrator};
use wanrec_enrich::AppState;

/// Command-line arguments for wanrec-enrich
#[derive(Parser, Debug)]
#[command(name = "wanrec-enrich")]
#[command(about = "Reconcile gateway telemetry, circuit feed and registry data per site")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, global = true, env = "WANREC_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long, global = true, env = "WANREC_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Explicit database file, overrides <root>/wanrec.db
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one reconciliation pass and print the run report as JSON
    Run,

    /// Serve the HTTP control surface
    Serve {
        #[arg(long, default_value = "127.0.0.1:5780", env = "WANREC_BIND")]
        bind: SocketAddr,
    },

    /// Resolve one uplink address to its registry organization
    Resolve {
        ip: String,

        /// Gateway dynamic-DNS hostname, used when the address is private
        #[arg(long)]
        ddns: Option<String>,

        /// Uplink the address belongs to (1 or 2)
        #[arg(long, default_value = "1", value_parser = parse_wan)]
        wan: WanInterface,
    },

    /// Parse a device notes blob and print both interfaces
    ParseNotes { text: String },
}

fn parse_wan(value: &str) -> Result<WanInterface, String> {
    match value.trim().to_ascii_lowercase().trim_start_matches("wan") {
        "1" => Ok(WanInterface::Wan1),
        "2" => Ok(WanInterface::Wan2),
        other => Err(format!("expected 1 or 2, got '{}'", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("wanrec-enrich {}", env!("CARGO_PKG_VERSION"));

    if let Command::ParseNotes { text } = &args.command {
        let parsed = parse_raw_notes(text);
        println!("{}", serde_json::to_string_pretty(&parsed)?);
        return Ok(());
    }

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let db_path = resolve_database_path(args.database.as_deref(), &root_folder, &toml_config);
    info!("Database: {}", db_path.display());

    let db = wanrec_enrich::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    match args.command {
        Command::Run => {
            let settings = ReconSettings::resolve(&db, &toml_config).await?;
            let orchestrator = ReconciliationOrchestrator::with_default_clients(db, settings)?;

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                warn!("Stopping dispatch; sites in flight will finish");
                on_signal.cancel();
            });

            let report = orchestrator.run(Uuid::new_v4(), cancel).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve { bind } => {
            let app = wanrec_enrich::build_router(AppState::new(db, toml_config));

            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("Failed to bind to {}", bind))?;
            info!("Listening on http://{}", bind);
            info!("Health check: http://{}/health", bind);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("Server error")?;
            info!("Server shutdown complete");
        }
        Command::Resolve { ip, ddns, wan } => {
            let settings = ReconSettings::resolve(&db, &toml_config).await?;
            let orchestrator = ReconciliationOrchestrator::with_default_clients(db, settings)?;
            let resolver = orchestrator.build_resolver().await?;

            let resolution = resolver.resolve_interface(&ip, ddns.as_deref(), wan).await;
            orchestrator.flush_registry_cache(&resolver).await?;
            println!("{}", serde_json::to_string_pretty(&resolution)?);
        }
        Command::ParseNotes { .. } => {}
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
