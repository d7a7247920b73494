//! ML compute worker binary.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vindex_ml_worker::{HttpInferenceEngine, InferenceJobHandler, MlExecutor, MlWorkerConfig};
use vindex_queue::Broker;
use vindex_store::{ArtifactStore, Database, RunRepository};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive("vindex=info".parse().unwrap()))
        .init();

    info!("Starting vindex-ml-worker");

    if let Err(e) = PrometheusBuilder::new().install() {
        error!("Failed to install metrics exporter: {e}");
    }

    let config = MlWorkerConfig::from_env();
    info!("ML worker config: {:?}", config);

    let db = match Database::from_env().await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to connect to database: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = db.migrate().await {
        error!("Failed to run migrations: {e}");
        std::process::exit(1);
    }

    let broker = match Broker::from_env() {
        Ok(b) => Arc::new(b),
        Err(e) => {
            error!("Failed to create broker client: {e}");
            std::process::exit(1);
        }
    };

    let engine = Arc::new(HttpInferenceEngine::new(config.inference_url.clone()));
    let handler = InferenceJobHandler::new(
        ArtifactStore::new(db.clone()),
        RunRepository::new(db),
        engine,
    );

    let executor = Arc::new(MlExecutor::new(config, broker, handler));

    // Setup signal handler
    let shutdown_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {e}");
        std::process::exit(1);
    }

    info!("ML worker shutdown complete");
}
