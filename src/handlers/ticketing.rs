//! # Ticketing Operator Handlers
//!
//! Manual triggers for reconciliation, discovery and provider health checks,
//! plus a read view of the remote event cache.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::discovery::DiscoveryReport;
use crate::error::{ApiError, not_found};
use crate::health_monitor::HealthCheckResult;
use crate::models::remote_event::{Model as RemoteEventModel, SyncStatus};
use crate::reconciler::{ReconcileError, ReconcileReport, SyncTrigger};
use crate::server::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncResponse {
    pub setup_id: Uuid,
    pub reports: Vec<ReconcileReport>,
}

/// Cached view of one listing on a provider
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RemoteEventInfo {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub show_id: Uuid,
    pub external_event_id: Option<String>,
    pub external_url: Option<String>,
    pub remote_status: Option<String>,
    pub sync_status: SyncStatus,
    pub tickets_sold: i32,
    pub tickets_available: Option<i32>,
    pub revenue_cents: i64,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
}

impl From<RemoteEventModel> for RemoteEventInfo {
    fn from(event: RemoteEventModel) -> Self {
        Self {
            id: event.id,
            provider_id: event.provider_id,
            show_id: event.show_id,
            external_event_id: event.external_event_id,
            external_url: event.external_url,
            remote_status: event.remote_status,
            sync_status: event.sync_status,
            tickets_sold: event.tickets_sold,
            tickets_available: event.tickets_available,
            revenue_cents: event.revenue_cents,
            last_synced_at: event.last_synced_at.map(|at| at.with_timezone(&Utc)),
            last_sync_error: event.last_sync_error,
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(error: ReconcileError) -> Self {
        match error {
            ReconcileError::SetupNotFound(_) => not_found("Setup"),
            ReconcileError::ProviderNotFound(_) => not_found("Provider"),
            ReconcileError::ProviderSetupNotFound { .. } => not_found("Provider setup"),
            ReconcileError::ProductionNotFound(_) => not_found("Production"),
            ReconcileError::Closed => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Reconciler is shutting down",
            ),
            ReconcileError::Registry(err) => err.into(),
            ReconcileError::Database(err) => err.into(),
        }
    }
}

/// Reconcile every enabled provider of a setup now
#[utoipa::path(
    post,
    path = "/ticketing/setups/{setup_id}/sync",
    params(("setup_id" = Uuid, Path, description = "Declarative setup id")),
    responses(
        (status = 200, description = "One report per enabled provider", body = SyncResponse),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Setup not found", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "ticketing"
)]
pub async fn sync_setup(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Path(setup_id): Path<Uuid>,
) -> Result<Json<SyncResponse>, ApiError> {
    let reports = state
        .reconciler
        .reconcile_setup(setup_id, SyncTrigger::Manual)
        .await?;
    Ok(Json(SyncResponse { setup_id, reports }))
}

/// Remote events cached for a setup
#[utoipa::path(
    get,
    path = "/ticketing/setups/{setup_id}/remote-events",
    params(("setup_id" = Uuid, Path, description = "Declarative setup id")),
    responses(
        (status = 200, description = "Cached remote events", body = [RemoteEventInfo]),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Setup not found", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "ticketing"
)]
pub async fn list_remote_events(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Path(setup_id): Path<Uuid>,
) -> Result<Json<Vec<RemoteEventInfo>>, ApiError> {
    state
        .engine
        .setups()
        .get_by_id(setup_id)
        .await?
        .ok_or_else(|| not_found("Setup"))?;

    let events = state.engine.remote_events().list_for_setup(setup_id).await?;
    Ok(Json(events.into_iter().map(RemoteEventInfo::from).collect()))
}

/// Run discovery for an organization now
#[utoipa::path(
    post,
    path = "/ticketing/organizations/{organization_id}/discovery",
    params(("organization_id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Discovery report", body = DiscoveryReport),
        (status = 401, description = "Missing or invalid operator token", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "ticketing"
)]
pub async fn run_discovery(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Path(organization_id): Path<Uuid>,
) -> Result<Json<DiscoveryReport>, ApiError> {
    Ok(Json(
        state.discovery.discover_organization(organization_id).await?,
    ))
}

/// Check one provider's credentials now, ignoring the cooldown
#[utoipa::path(
    post,
    path = "/ticketing/providers/{provider_id}/health-check",
    params(("provider_id" = Uuid, Path, description = "Ticketing provider id")),
    responses(
        (status = 200, description = "Health check result", body = HealthCheckResult),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Provider not found", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "ticketing"
)]
pub async fn check_provider_health(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<HealthCheckResult>, ApiError> {
    state
        .health_monitor
        .check_provider(provider_id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("Provider"))
}
