//! # cadence-api
//!
//! HTTP surface for cadence: submissions, provider callbacks, job lookup and
//! administrative recovery. The `cadence-api` binary serves the router and
//! runs the periodic sweep; `cadence-recover` drives the same engine from the
//! command line.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use cadence_core::defaults::{CALLBACK_PATH, DEFERRED_SWEEP_DELAY_SECS};
use cadence_core::{
    ArtifactFetcher, CallbackLogRepository, CatalogRepository, GenerationProvider,
    GenerationRepository,
};
use cadence_db::{
    ArtifactStore, Database, PgCallbackLogRepository, PgCatalogRepository, PgGenerationRepository,
};
use cadence_jobs::{
    CallbackReceiver, CompletionPipeline, DeferredSweeper, GatewayConfig, PipelineConfig,
    ReconcileConfig, ReconciliationEngine, SubmissionGateway,
};
use cadence_provider::{HttpArtifactFetcher, ProviderClient};

/// Request bodies are small JSON documents.
const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// Collaborators the engine is assembled from.
pub struct Components {
    pub provider: Arc<dyn GenerationProvider>,
    pub generations: Arc<dyn GenerationRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub callback_log: Arc<dyn CallbackLogRepository>,
    pub fetcher: Arc<dyn ArtifactFetcher>,
    pub artifacts: ArtifactStore,
}

/// Tunables for the assembled engine.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub pipeline: PipelineConfig,
    pub reconcile: ReconcileConfig,
    pub gateway: GatewayConfig,
    /// Delay of the per-submission safety-net sweep; no sweep when `None`.
    pub deferred_sweep_delay: Option<Duration>,
    pub admin_token: Option<String>,
}

impl EngineSettings {
    /// Every section from its own environment variables.
    /// `DEFERRED_SWEEP_DELAY_SECS=0` disables the deferred sweep.
    pub fn from_env(admin_token: Option<String>) -> Self {
        let deferred_secs = std::env::var("DEFERRED_SWEEP_DELAY_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFERRED_SWEEP_DELAY_SECS);
        Self {
            pipeline: PipelineConfig::from_env(),
            reconcile: ReconcileConfig::from_env(),
            gateway: GatewayConfig::from_env(),
            deferred_sweep_delay: (deferred_secs > 0).then(|| Duration::from_secs(deferred_secs)),
            admin_token,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<SubmissionGateway>,
    pub callbacks: Arc<CallbackReceiver>,
    pub engine: ReconciliationEngine,
    pub generations: Arc<dyn GenerationRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub provider: Arc<dyn GenerationProvider>,
    pub admin_token: Option<String>,
}

impl AppState {
    /// Wire the pipeline, engine, receiver and gateway around `components`.
    pub fn assemble(components: Components, settings: EngineSettings) -> Self {
        let Components {
            provider,
            generations,
            catalog,
            callback_log,
            fetcher,
            artifacts,
        } = components;

        let pipeline = Arc::new(CompletionPipeline::new(
            generations.clone(),
            fetcher,
            artifacts,
            settings.pipeline,
        ));
        let engine = ReconciliationEngine::new(
            provider.clone(),
            generations.clone(),
            pipeline.clone(),
            settings.reconcile,
        );
        let callbacks = Arc::new(CallbackReceiver::new(
            generations.clone(),
            callback_log,
            pipeline,
        ));

        let mut gateway =
            SubmissionGateway::new(provider.clone(), generations.clone(), settings.gateway);
        if let Some(delay) = settings.deferred_sweep_delay {
            gateway = gateway.with_deferred_sweeper(DeferredSweeper::new(engine.clone(), delay));
        }

        Self {
            gateway: Arc::new(gateway),
            callbacks,
            engine,
            generations,
            catalog,
            provider,
            admin_token: settings.admin_token,
        }
    }

    /// Production wiring: Postgres repositories, the HTTP provider client
    /// and filesystem artifact storage, all configured from the environment.
    pub fn from_database(db: &Database, settings: EngineSettings) -> anyhow::Result<Self> {
        let components = Components {
            provider: Arc::new(ProviderClient::from_env()?),
            generations: Arc::new(PgGenerationRepository::new(db.pool.clone())),
            catalog: Arc::new(PgCatalogRepository::new(db.pool.clone())),
            callback_log: Arc::new(PgCallbackLogRepository::new(db.pool.clone())),
            fetcher: Arc::new(HttpArtifactFetcher::from_env()?),
            artifacts: ArtifactStore::filesystem_from_env(),
        };
        Ok(Self::assemble(components, settings))
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/v1/admin/reconcile", post(handlers::admin::reconcile_all))
        .route(
            "/api/v1/admin/generations/:id/reconcile",
            post(handlers::admin::reconcile_one),
        )
        .route("/api/v1/provider/credits", get(handlers::admin::credits))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_admin,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/generations", post(handlers::generations::submit))
        .route(
            "/api/v1/generations/:id",
            get(handlers::generations::get_generation),
        )
        .route(
            "/api/v1/owners/:owner_id/library",
            get(handlers::generations::list_library),
        )
        .route(CALLBACK_PATH, post(handlers::callback::receive))
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CatchPanicLayer::new())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .with_state(state)
}
