//! Sales synchronization
//!
//! Keeps ticket metrics fresh on live listings. A `sales_update` broadcast and a
//! `tickets_sold` activity are only emitted when the sold count goes up.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::activity_log::ActivityRecorder;
use crate::adapters::{AdapterRegistry, FailureKind, SalesSnapshot};
use crate::broadcast::{EngineMessage, StatusBroadcaster};
use crate::engine::EngineContext;
use crate::models::activity::ActivityKind;
use crate::models::remote_event::Model as RemoteEventModel;
use crate::provider_health::ProviderHealth;
use crate::repositories::{NewActivity, ProviderRepository, RemoteEventRepository};

/// Whether a row synced at `last_synced_at` is still inside the freshness window.
pub fn is_fresh(
    last_synced_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    freshness_seconds: u64,
) -> bool {
    last_synced_at
        .map(|at| now - at < Duration::seconds(freshness_seconds as i64))
        .unwrap_or(false)
}

/// Stores sales snapshots and emits the broadcast/activity pair on increases.
#[derive(Debug, Clone)]
pub struct SalesRecorder {
    remote_events: RemoteEventRepository,
    broadcaster: Arc<StatusBroadcaster>,
    activity: ActivityRecorder,
}

impl SalesRecorder {
    pub fn new(
        remote_events: RemoteEventRepository,
        broadcaster: Arc<StatusBroadcaster>,
        activity: ActivityRecorder,
    ) -> Self {
        Self {
            remote_events,
            broadcaster,
            activity,
        }
    }

    /// Persists `snapshot` for `event`. Returns the updated row and whether a
    /// `sales_update` was broadcast.
    pub async fn apply(
        &self,
        event: &RemoteEventModel,
        snapshot: &SalesSnapshot,
    ) -> anyhow::Result<(RemoteEventModel, bool)> {
        let updated = self
            .remote_events
            .update_sales(event.id, snapshot, Utc::now())
            .await?;

        if snapshot.tickets_sold <= event.tickets_sold {
            return Ok((updated, false));
        }

        let delta = snapshot.tickets_sold - event.tickets_sold;
        counter!("ticketing_sales_broadcasts_total").increment(1);
        self.broadcaster.publish(
            event.production_id,
            EngineMessage::SalesUpdate {
                show_id: event.show_id,
                provider_id: event.provider_id,
                remote_event_id: event.id,
                sold: snapshot.tickets_sold,
                previous_sold: event.tickets_sold,
                available: snapshot.tickets_available,
                revenue_cents: snapshot.revenue_cents,
            },
        );
        self.activity
            .record(
                NewActivity::new(
                    event.production_id,
                    ActivityKind::TicketsSold,
                    format!("{} ticket(s) sold ({} total)", delta, snapshot.tickets_sold),
                )
                .provider(event.provider_id)
                .show(event.show_id)
                .remote_event(event.id)
                .metadata(json!({
                    "delta": delta,
                    "sold": snapshot.tickets_sold,
                    "revenue_cents": snapshot.revenue_cents,
                })),
            )
            .await;

        Ok((updated, true))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SalesSyncReport {
    pub checked: usize,
    pub updated: usize,
    pub broadcasts: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct SalesSync {
    providers: ProviderRepository,
    remote_events: RemoteEventRepository,
    registry: Arc<AdapterRegistry>,
    health: ProviderHealth,
    recorder: SalesRecorder,
    freshness_seconds: u64,
}

impl SalesSync {
    pub fn new(ctx: &EngineContext) -> Self {
        Self {
            providers: ctx.providers(),
            remote_events: ctx.remote_events(),
            registry: ctx.registry.clone(),
            health: ctx.health(),
            recorder: ctx.sales_recorder(),
            freshness_seconds: ctx.config.sync.sales_freshness_seconds,
        }
    }

    /// One batch over every live, synced listing.
    #[instrument(skip(self))]
    pub async fn run(&self) -> anyhow::Result<SalesSyncReport> {
        let now = Utc::now();
        let mut report = SalesSyncReport::default();

        let mut by_provider: BTreeMap<Uuid, Vec<RemoteEventModel>> = BTreeMap::new();
        for event in self.remote_events.list_live_synced().await? {
            by_provider.entry(event.provider_id).or_default().push(event);
        }

        for (provider_id, events) in by_provider {
            let provider = match self.providers.get_by_id(provider_id).await? {
                Some(provider)
                    if provider.is_api_enabled()
                        && provider.credentials_valid
                        && !provider.is_rate_limited_at(now) =>
                {
                    provider
                }
                _ => {
                    debug!(%provider_id, count = events.len(), "Skipping sales for unavailable provider");
                    report.skipped += events.len();
                    continue;
                }
            };

            let adapter = match self.registry.resolve(&provider) {
                Ok(adapter) => adapter,
                Err(err) => {
                    warn!(%provider_id, error = %err, "Cannot resolve adapter for sales sync");
                    report.failed += events.len();
                    continue;
                }
            };

            let total = events.len();
            for (index, event) in events.into_iter().enumerate() {
                let last_synced = event.last_synced_at.map(|t| t.with_timezone(&Utc));
                if is_fresh(last_synced, now, self.freshness_seconds) {
                    report.skipped += 1;
                    continue;
                }

                let Some(external_id) = event.external_event_id.as_deref() else {
                    report.skipped += 1;
                    continue;
                };

                report.checked += 1;
                match adapter.get_sales(external_id).await {
                    Ok(snapshot) => match self.recorder.apply(&event, &snapshot).await {
                        Ok((_, broadcast)) => {
                            report.updated += 1;
                            if broadcast {
                                report.broadcasts += 1;
                            }
                        }
                        Err(err) => {
                            warn!(remote_event_id = %event.id, error = %err, "Failed to store sales snapshot");
                            report.failed += 1;
                        }
                    },
                    Err(err) => {
                        report.failed += 1;
                        warn!(remote_event_id = %event.id, %provider_id, error = %err, "Sales fetch failed");
                        let kind = self.health.record_failure(&provider, &err).await;
                        if matches!(kind, FailureKind::RateLimited { .. } | FailureKind::AuthExpired) {
                            report.skipped += total - index - 1;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            checked = report.checked,
            updated = report.updated,
            broadcasts = report.broadcasts,
            skipped = report.skipped,
            failed = report.failed,
            "Sales sync finished"
        );
        Ok(report)
    }
}
