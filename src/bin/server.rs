use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use bobs_bytes::clock::SystemClock;
use bobs_bytes::config::AppConfig;
use bobs_bytes::handlers::{routes, AppState};
use bobs_bytes::mail::LogMailer;
use bobs_bytes::security_logger::{SecurityEvent, SecurityLogger};
use bobs_bytes::storage::{MemoryStorageProvider, StorageProvider};

#[tokio::main]
async fn main() {
    // Initialize env
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match dotenv_result {
        Ok(_) => info!("Environment variables loaded from .env file"),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    let security = Arc::new(SecurityLogger::new());

    // Load config from the environment
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            security
                .log_event(SecurityEvent::ConfigurationError {
                    component: "config".to_string(),
                    error: e.to_string(),
                })
                .await;
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration: host={}, port={}", config.host, config.port);
    if config.admin_email.is_none() {
        warn!("BLOG_ADMIN is not set; no account will receive the Administrator role");
    }

    let storage: Arc<dyn StorageProvider> = Arc::new(MemoryStorageProvider::new());
    if let Err(e) = storage.initialize().await {
        error!("Failed to initialize storage: {}", e);
        std::process::exit(1);
    }

    let state = AppState::new(
        &config,
        storage,
        Arc::new(LogMailer),
        Arc::new(SystemClock),
        security.clone(),
    );

    match state.accounts.insert_roles().await {
        Ok(report) => info!(
            "Roles seeded: {} created, {} unchanged, {} overwritten",
            report.created.len(),
            report.unchanged.len(),
            report.overridden.len()
        ),
        Err(e) => {
            error!("Failed to seed roles: {}", e);
            std::process::exit(1);
        }
    }

    security.start_cleanup_task();

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Bob's Bytes on {}", addr);
    warp::serve(routes(state)).run(addr).await;
}
