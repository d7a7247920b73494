//! Backend worker binary.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vindex_queue::Broker;
use vindex_store::{
    ArtifactStore, Database, TaskRepository, VideoRepository,
};
use vindex_worker::{
    BackendTaskHandler, FfmpegFrameExtractor, LiveBroker, Reconciler, TaskOrchestrator,
    ThumbnailExtractor, WorkerConfig, WorkerExecutor,
};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive("vindex=info".parse().unwrap()))
        .init();

    info!("Starting vindex-worker");

    if let Err(e) = PrometheusBuilder::new().install() {
        error!("Failed to install metrics exporter: {e}");
    }

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

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

    let live = Arc::new(LiveBroker::new(Arc::clone(&broker)));
    let videos = VideoRepository::new(db.clone());
    let tasks = TaskRepository::new(db.clone());
    let artifacts = ArtifactStore::new(db.clone());

    let orchestrator = TaskOrchestrator::new(
        videos.clone(),
        tasks.clone(),
        live.clone(),
        config.ocr_language.clone(),
    );
    let thumbnails = ThumbnailExtractor::new(
        artifacts.clone(),
        Arc::new(FfmpegFrameExtractor),
        config.thumbnail_root.clone(),
    );
    let handler = BackendTaskHandler::new(
        tasks.clone(),
        videos.clone(),
        artifacts,
        TaskOrchestrator::new(
            videos.clone(),
            tasks.clone(),
            live.clone(),
            config.ocr_language.clone(),
        ),
        live.clone(),
        thumbnails,
        config.clone(),
    );
    let reconciler = Reconciler::new(
        tasks,
        videos,
        live.clone(),
        live,
        config.long_running_threshold,
    );

    let executor = Arc::new(WorkerExecutor::new(
        config,
        broker,
        handler,
        orchestrator,
        reconciler,
    ));

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

    info!("Worker shutdown complete");
}
