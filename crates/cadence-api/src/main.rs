use tokio::net::TcpListener;
use tracing::{info, warn};

use cadence_api::config::AppConfig;
use cadence_api::telemetry::{init_tracing, LogConfig};
use cadence_api::{router, AppState, EngineSettings};
use cadence_db::{Database, PoolConfig};
use cadence_jobs::{SweepWorker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _log_guard = init_tracing(
        &LogConfig::from_env(),
        "cadence_api=debug,cadence_jobs=info,cadence_provider=info,cadence_db=info,tower_http=debug",
    );

    let config = AppConfig::from_env();

    info!("Connecting to database...");
    let db = Database::connect_with_config(&config.database_url, PoolConfig::from_env()).await?;
    db.migrate().await?;
    info!("Database connected");

    let state = AppState::from_database(&db, EngineSettings::from_env(config.admin_token.clone()))?;
    if state.admin_token.is_none() {
        warn!("ADMIN_TOKEN is not set; admin routes are unauthenticated");
    }

    let worker = SweepWorker::new(state.engine.clone(), WorkerConfig::from_env()).start();

    let app = router(state);
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Starting server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = worker.shutdown().await {
        warn!(error = %e, "Sweep worker was not running at shutdown");
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
