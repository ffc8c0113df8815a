// src/main.rs

use std::time::Duration;

use dotenvy::dotenv;
use postledger::config::Config;
use postledger::ingest::batch::{ingest_batch, load_directory};
use postledger::routes;
use postledger::state::AppState;
use postledger::store::Store;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "postledger.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Open the store with retry
    let mut retry_count = 0;
    let store = loop {
        match Store::connect(&config).await {
            Ok(store) => break store,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    tracing::error!("Failed to open store after 5 retries: {}", e);
                    return;
                }
                tracing::warn!("Store not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Store connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    if let Err(e) = store.migrate().await {
        tracing::error!("Failed to run store migrations: {}", e);
        return;
    }
    tracing::info!("Migrations applied successfully.");

    // Ingest the startup directory, if any
    if let Some(dir) = &config.ingest_dir {
        if !ingest_startup_directory(&store, &config, dir).await {
            store.close().await;
            return;
        }
    }

    let state = AppState {
        store: store.clone(),
        config: config.clone(),
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.bind_addr, e);
            return;
        }
    };
    tracing::info!("Listening on {}", config.bind_addr);

    // Start the server
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }

    store.close().await;
}

/// Returns false when the batch was aborted by a store failure.
async fn ingest_startup_directory(store: &Store, config: &Config, dir: &std::path::Path) -> bool {
    let docs = match load_directory(dir, config.ingest_observed_at).await {
        Ok(docs) => docs,
        Err(e) => {
            tracing::error!("Failed to read ingest directory {}: {}", dir.display(), e);
            return false;
        }
    };

    match ingest_batch(store, docs, config.ingest_concurrency).await {
        Ok(report) => {
            for conflict in &report.conflicts {
                tracing::warn!("Quarantined {}: {}", conflict.source, conflict.reason);
            }
            true
        }
        Err(aborted) => {
            tracing::error!("{}", aborted);
            for source in &aborted.report.not_attempted {
                tracing::error!("Not attempted: {}", source);
            }
            false
        }
    }
}
