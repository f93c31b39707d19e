//! Roboflow Server - Entry Point
//!
//! Accepts raybot WebSocket connections and runs workflows against them.

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::sync::Arc;

use roboflow::app::run::run;
use roboflow::app::settings::Settings;
use roboflow::logs::init_logging;
use roboflow::models::raybot::Raybot;
use roboflow::storage::memory::MemoryStore;
use roboflow::storage::{RaybotStore, Store};
use roboflow::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to serialize version: {e}"),
        }
        return;
    }

    // Retrieve the settings
    let settings = match cli_args.get("config") {
        Some(path) => match Settings::load(Path::new(path)).await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Unable to read settings: {e:#}");
                return;
            }
        },
        None => Settings::default(),
    };
    let settings = match settings.apply_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid environment configuration: {e:#}");
            return;
        }
    };

    // Initialize logging, the guard flushes file logs on exit
    let _log_guard = match init_logging(settings.log_options()) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    // Seed the store with the configured raybots
    let memory_store = MemoryStore::new();
    for raybot in &settings.raybots {
        if let Err(e) = memory_store
            .create_raybot(Raybot::new(raybot.id, raybot.name.clone()))
            .await
        {
            error!("Failed to register raybot {}: {}", raybot.id, e);
        }
    }
    let store: Arc<dyn Store> = Arc::new(memory_store);

    // Run the server
    let options = settings.to_options();
    info!(
        "Running Roboflow server {} with options: {:?}",
        version.version, options
    );
    if let Err(e) = run(options, store, await_shutdown_signal()).await {
        error!("Failed to run the server: {e}");
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Failed to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
