use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use raven_gate::{
    build_app,
    config::RavenGateConfig,
    gate::RavenGate,
    observability,
    session::{MemorySessionStore, SharedSessionStore, start_cleanup_task},
};

/// CLI arguments for the Raven authentication gate
#[derive(Parser, Debug)]
#[command(version, about = "Raven single-sign-on gate", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "raven-gate.toml")]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the server (default)
    Serve,
    /// Load and validate the configuration and signing keys, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::CheckConfig) => run_check_config(&args.config),
        Some(Command::Serve) | None => run_server(&args.config).await,
    }
}

fn load_config(path: &Path) -> RavenGateConfig {
    match RavenGateConfig::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn run_check_config(path: &Path) {
    let config = load_config(path);
    if let Err(e) = RavenGate::new(&config.raven) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    for warning in config.warnings() {
        eprintln!("Warning: {}", warning);
    }
    println!("Configuration OK: {}", path.display());
}

async fn run_server(config_path: &Path) {
    let config = load_config(config_path);

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Failed to initialize tracing: {}", e);
        std::process::exit(1);
    }

    tracing::info!(
        config_file = %config_path.display(),
        auth_endpoint = %config.raven.auth_endpoint,
        test_mode = config.raven.test_mode,
        "Starting Raven gate"
    );

    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    let gate = match RavenGate::new(&config.raven) {
        Ok(gate) => Arc::new(gate),
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize authentication gate");
            std::process::exit(1);
        }
    };

    let sessions: SharedSessionStore = Arc::new(MemorySessionStore::new(Duration::from_secs(
        config.session.duration_secs,
    )));
    let cleanup_handle = start_cleanup_task(
        sessions.clone(),
        Duration::from_secs(config.session.cleanup_interval_secs),
    );

    let app = build_app(&config, gate, sessions);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %bind_addr, error = %e, "Failed to bind to address");
            std::process::exit(1);
        }
    };
    tracing::info!("Server listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    cleanup_handle.abort();
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
