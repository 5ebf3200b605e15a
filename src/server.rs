//! # Server Configuration
//!
//! Router, shared state and process lifecycle for the ticketing sync service:
//! the HTTP API, the webhook processor and the background scheduler run under
//! one shutdown token.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::adapters::AdapterRegistry;
use crate::auth::auth_middleware;
use crate::broadcast::StatusBroadcaster;
use crate::config::AppConfig;
use crate::discovery::Discovery;
use crate::engine::EngineContext;
use crate::handlers;
use crate::health_monitor::HealthMonitor;
use crate::reconciler::Reconciler;
use crate::scheduler::TaskScheduler;
use crate::telemetry::trace_context_middleware;
use crate::webhook_processor::{WebhookProcessor, WebhookQueue};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub engine: EngineContext,
    pub reconciler: Reconciler,
    pub discovery: Discovery,
    pub health_monitor: HealthMonitor,
    pub webhook_queue: WebhookQueue,
}

impl AppState {
    pub fn new(engine: EngineContext, webhook_queue: WebhookQueue) -> Self {
        Self {
            config: engine.config.clone(),
            db: (*engine.db).clone(),
            reconciler: Reconciler::new(&engine),
            discovery: Discovery::new(&engine),
            health_monitor: HealthMonitor::new(&engine),
            webhook_queue,
            engine,
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let operator_routes = Router::new()
        .route(
            "/ticketing/setups/{setup_id}/sync",
            post(handlers::ticketing::sync_setup),
        )
        .route(
            "/ticketing/setups/{setup_id}/remote-events",
            get(handlers::ticketing::list_remote_events),
        )
        .route(
            "/ticketing/organizations/{organization_id}/discovery",
            post(handlers::ticketing::run_discovery),
        )
        .route(
            "/ticketing/providers/{provider_id}/health-check",
            post(handlers::ticketing::check_provider_health),
        )
        .route_layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/webhooks/ticketing/{provider_type}/{token}",
            post(handlers::webhooks::receive_webhook),
        )
        .merge(operator_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Starts the API, the webhook processor and the scheduler; returns after a
/// graceful shutdown on Ctrl-C.
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let config = Arc::new(config);
    let registry = Arc::new(AdapterRegistry::from_config(&config)?);
    let engine = EngineContext::new(
        Arc::new(db),
        config.clone(),
        registry,
        Arc::new(StatusBroadcaster::default()),
    );

    let shutdown = CancellationToken::new();
    let (queue, queue_rx) = WebhookQueue::channel();
    let state = AppState::new(engine.clone(), queue.clone());

    let processor = WebhookProcessor::new(&engine);
    let processor_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { processor.run(queue_rx, shutdown).await }
    });

    let scheduler = TaskScheduler::new(&engine, state.reconciler.clone(), queue);
    let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile = %config.profile, "Server listening");

    let signal_token = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
            signal_token.cancel();
        })
        .await;

    shutdown.cancel();
    for (name, task) in [("webhook processor", processor_task), ("scheduler", scheduler_task)] {
        if let Err(err) = task.await {
            error!(task = name, error = ?err, "Background task ended abnormally");
        }
    }

    served?;
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::webhooks::receive_webhook,
        crate::handlers::ticketing::sync_setup,
        crate::handlers::ticketing::list_remote_events,
        crate::handlers::ticketing::run_discovery,
        crate::handlers::ticketing::check_provider_health,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::HealthResponse,
            crate::handlers::webhooks::WebhookAccepted,
            crate::handlers::webhooks::WebhookRejected,
            crate::handlers::ticketing::SyncResponse,
            crate::handlers::ticketing::RemoteEventInfo,
            crate::reconciler::ReconcileReport,
            crate::reconciler::PassOutcome,
            crate::discovery::DiscoveryReport,
            crate::health_monitor::HealthCheckResult,
            crate::health_monitor::CheckOutcome,
            crate::health_monitor::WebhookHealth,
            crate::models::remote_event::SyncStatus,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "root", description = "Service information"),
        (name = "webhooks", description = "Inbound ticketing provider webhooks"),
        (name = "ticketing", description = "Operator endpoints for sync, discovery and health"),
    ),
    info(
        title = "Ticketing Sync API",
        description = "Synchronizes production shows with external ticketing providers",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}
