//! Session processing worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use showcase_queue::JobQueue;
use showcase_store::StoreConfig;
use showcase_worker::{JobExecutor, JobHandlers, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("showcase=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting showcase-worker");

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        match addr.parse() {
            Ok(addr) => {
                if let Err(e) = showcase_worker::metrics::init_metrics(addr) {
                    warn!("Failed to start metrics exporter: {}", e);
                }
            }
            Err(e) => warn!("Invalid METRICS_ADDR '{}': {}", addr, e),
        }
    }

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let store = match StoreConfig::from_env() {
        Ok(store_config) => match store_config.connect().await {
            Ok(store) => store,
            Err(e) => {
                error!("Failed to open session store: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!("Invalid store configuration: {}", e);
            std::process::exit(1);
        }
    };

    let queue = match JobQueue::from_env() {
        Ok(q) => Arc::new(q),
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let handlers = match JobHandlers::from_env(config.clone(), store, queue.clone()) {
        Ok(h) => h,
        Err(e) => {
            error!("Failed to create job handlers: {}", e);
            std::process::exit(1);
        }
    };

    let executor = Arc::new(JobExecutor::new(config, queue, handlers));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
